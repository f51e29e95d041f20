//! Provider and retrieval seams.
//!
//! Providers are opaque: the gateway only sees a completion call that either
//! returns a response with token counts or fails with a [`ProviderError`].

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::failure::ProviderError;
use crate::pricing::PricingTable;
use crate::request_log::RagMetrics;

/// Identity and routing context of an inbound chat request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestContext {
    pub trace_id: String,
    pub org_id: String,
    pub workspace_id: String,
    pub api_key_id: String,
    pub api_key_prefix: String,
    pub path: String,
    pub method: String,
    pub prompt_key: Option<String>,
    pub provider_credential_id: String,
}

/// Retrieval settings resolved elsewhere and passed in as plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagSettings {
    pub top_k: u32,
    pub similarity_threshold: f64,
    pub hybrid: bool,
    pub rerank: bool,
}

/// Ranked context produced by the external retrieval collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RagContext {
    pub context: String,
    pub metrics: RagMetrics,
}

#[derive(Debug, Error)]
#[error("retrieval failed: {0}")]
pub struct RetrievalError(pub String);

/// External RAG collaborator returning ranked context for a query.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        settings: &RagSettings,
    ) -> Result<RagContext, RetrievalError>;
}

/// An inbound chat request, before admission.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub context: RequestContext,
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: Option<u32>,
    pub rag: Option<RagSettings>,
}

/// What a provider actually receives, after degrade and context resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: Option<u32>,
}

/// A successful provider completion.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderResponse {
    pub model: String,
    pub content: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub http_status: u16,
}

/// Token counts and cost resolved from a provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: Decimal,
}

impl ProviderResponse {
    /// Price this response against a rate table.
    ///
    /// Prefers explicit input/output counts; falls back to the 70/30 split
    /// when the provider reported only a total; zero when it reported
    /// nothing.
    pub fn resolve_usage(&self, pricing: &PricingTable) -> ResolvedUsage {
        match (self.input_tokens, self.output_tokens) {
            (Some(input), Some(output)) => ResolvedUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: self.total_tokens.unwrap_or(input + output),
                cost: pricing.cost(&self.model, input as i64, output as i64),
            },
            _ => match self.total_tokens {
                Some(total) => {
                    let (input, output) = PricingTable::split_total_tokens(total as i64);
                    ResolvedUsage {
                        input_tokens: input,
                        output_tokens: output,
                        total_tokens: total,
                        cost: pricing.cost_from_total_tokens(&self.model, total as i64),
                    }
                }
                None => ResolvedUsage {
                    input_tokens: 0,
                    output_tokens: 0,
                    total_tokens: 0,
                    cost: Decimal::ZERO,
                },
            },
        }
    }
}

/// A configured upstream LLM provider.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Stable key identifying the provider ("openai", "anthropic", ...),
    /// used for degrade-map lookups and failure attribution.
    fn provider_key(&self) -> &str;

    async fn complete(&self, call: &ProviderCall) -> Result<ProviderResponse, ProviderError>;
}
