//! The live call site: admission, failover, and accounting around provider
//! calls.

pub mod pipeline;
pub mod provider;

pub use pipeline::{ChatGateway, ChatGatewayBuilder, ChatOutcome};
pub use provider::{
    ChatRequest, ContextRetriever, ProviderCall, ProviderClient, ProviderResponse, RagContext,
    RagSettings, RequestContext, ResolvedUsage, RetrievalError,
};

use serde::Deserialize;
use thiserror::Error;

use crate::budget::{BudgetDecision, BudgetError};
use crate::failure::{GatewayFailure, ProviderError};
use crate::request_log::DEFAULT_QUEUE_CAPACITY;

/// Gateway pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Currency tag recorded with every cost figure.
    pub currency: String,
    /// How many fallback providers may be tried after the primary.
    pub max_failover_attempts: u32,
    /// Bound of the off-path request log queue.
    pub log_queue_capacity: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            currency: "USD".to_string(),
            max_failover_attempts: 1,
            log_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Integration seam for the external circuit breaker.
///
/// Receives every per-provider outcome along with its classification;
/// [`GatewayFailure::counted_as_failure`] says whether the breaker should
/// count the error toward its failure rate. The breaker's own state machine
/// (windows, thresholds, half-open probing) lives outside this crate.
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, provider_key: &str, failure: &GatewayFailure);

    fn on_success(&self, _provider_key: &str) {}
}

/// Errors surfaced by the gateway pipeline.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The budget guardrail refused admission.
    #[error("request blocked: {}", .decision.reason_code())]
    Blocked { decision: BudgetDecision },

    /// All provider attempts failed; carries the last error and its
    /// classification.
    #[error("provider call failed: {source}")]
    Provider {
        #[source]
        source: ProviderError,
        failure: GatewayFailure,
    },

    #[error("invalid gateway configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Budget(#[from] BudgetError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.currency, "USD");
        assert_eq!(config.max_failover_attempts, 1);
        assert_eq!(config.log_queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: GatewayConfig = serde_json::from_str(r#"{"currency":"EUR"}"#).unwrap();
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.max_failover_attempts, 1);
    }
}
