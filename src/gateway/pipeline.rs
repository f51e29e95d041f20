//! The live request pipeline.
//!
//! Order per call: provider-credential hard check, workspace soft-degrade
//! check, request log start, context retrieval, provider chain with
//! classifier-driven failover, pricing, usage metering, terminal log write.
//! The hard check runs first so a block can never be silently overridden by
//! a degrade.

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;

use super::provider::{
    ChatRequest, ContextRetriever, ProviderCall, ProviderClient, ProviderResponse, RagSettings,
    RequestContext,
};
use super::{FailureListener, GatewayConfig, GatewayError};
use crate::budget::{
    BudgetDecision, BudgetGuard, BudgetScope, PolicyStore, StoreFactory, UsageDelta, UsageStore,
    YearMonth,
};
use crate::failure::{GatewayFailure, ProviderError, classify_provider};
use crate::pricing::PricingTable;
use crate::request_log::{
    CallCost, CallUsage, RagMetrics, RequestCompletion, RequestFailure, RequestId,
    RequestLogRecorder, RequestLogStore, RequestLogStoreFactory, RequestLogWriter, RequestStart,
};

/// Result of a successfully completed call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutcome {
    pub request_id: RequestId,
    pub provider: String,
    pub model_requested: String,
    pub model_used: String,
    pub failover: bool,
    pub degraded: bool,
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Decimal,
    /// False when the model had no priced entry: render "cost unavailable",
    /// not $0.00.
    pub cost_known: bool,
    pub latency_ms: u64,
}

/// The admission, failover, and accounting pipeline around provider calls.
pub struct ChatGateway {
    guard: BudgetGuard,
    pricing: Arc<PricingTable>,
    usage: Arc<dyn UsageStore>,
    recorder: RequestLogRecorder,
    log: RequestLogWriter,
    providers: Vec<Arc<dyn ProviderClient>>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    listener: Option<Arc<dyn FailureListener>>,
    config: GatewayConfig,
}

impl std::fmt::Debug for ChatGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatGateway")
            .field("providers", &self.providers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChatGateway {
    pub fn builder() -> ChatGatewayBuilder {
        ChatGatewayBuilder::new()
    }

    pub fn guard(&self) -> &BudgetGuard {
        &self.guard
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Read access to the request log for operational queries.
    pub fn logs(&self) -> &RequestLogRecorder {
        &self.recorder
    }

    /// Wait for queued log writes to land. Intended for shutdown and tests.
    pub async fn flush_logs(&self) {
        self.log.flush().await;
    }

    pub async fn execute(&self, request: ChatRequest) -> Result<ChatOutcome, GatewayError> {
        let ctx = request.context.clone();

        let admission = self
            .guard
            .evaluate_provider_credential(&ctx.provider_credential_id)
            .await?;
        if !admission.allows_call() {
            return Err(GatewayError::Blocked {
                decision: admission,
            });
        }

        let primary_key = self.providers[0].provider_key();
        let degrade = self
            .guard
            .evaluate_workspace_degrade(&ctx.workspace_id, primary_key)
            .await?;

        let mut model = request.model.clone();
        let mut max_output_tokens = request.max_output_tokens;
        let mut rag_settings = request.rag.clone();
        let mut degraded = false;
        if let BudgetDecision::Degrade {
            model_override,
            max_output_tokens: cap,
            disable_rag,
            ..
        } = &degrade
        {
            degraded = true;
            if let Some(replacement) = model_override {
                model = replacement.clone();
            }
            max_output_tokens = Some(max_output_tokens.map_or(*cap, |requested| requested.min(*cap)));
            if *disable_rag {
                rag_settings = None;
            }
        }

        let rag_enabled = rag_settings.is_some() && self.retriever.is_some();
        let request_id = self.log.start(RequestStart {
            trace_id: ctx.trace_id.clone(),
            org_id: ctx.org_id.clone(),
            workspace_id: ctx.workspace_id.clone(),
            api_key_id: ctx.api_key_id.clone(),
            api_key_prefix: ctx.api_key_prefix.clone(),
            path: ctx.path.clone(),
            method: ctx.method.clone(),
            prompt_key: ctx.prompt_key.clone(),
            rag_enabled,
        });

        let started = Instant::now();
        let (prompt, rag_metrics) = self
            .resolve_context(&request.prompt, rag_settings.as_ref())
            .await;
        let call = ProviderCall {
            model: model.clone(),
            prompt,
            max_output_tokens,
        };

        let mut last: Option<(ProviderError, GatewayFailure, String)> = None;
        let mut tried = 0usize;
        let chain_len = (self.config.max_failover_attempts as usize)
            .saturating_add(1)
            .min(self.providers.len());

        for (attempt, provider) in self.providers.iter().take(chain_len).enumerate() {
            tried += 1;
            match provider.complete(&call).await {
                Ok(response) => {
                    if let Some(listener) = &self.listener {
                        listener.on_success(provider.provider_key());
                    }
                    return Ok(self
                        .complete_success(
                            request_id,
                            &ctx,
                            &request.model,
                            provider.provider_key(),
                            response,
                            rag_metrics.clone(),
                            attempt > 0,
                            degraded,
                            started.elapsed().as_millis() as u64,
                        )
                        .await);
                }
                Err(error) => {
                    let failure = classify_provider(&error);
                    if let Some(listener) = &self.listener {
                        listener.on_failure(provider.provider_key(), &failure);
                    }
                    tracing::warn!(
                        provider = provider.provider_key(),
                        code = %failure.error_code,
                        counted = failure.counted_as_failure,
                        failover = failure.failover_eligible,
                        "provider call failed"
                    );
                    let eligible = failure.failover_eligible;
                    last = Some((error, failure, provider.provider_key().to_string()));
                    if !eligible {
                        break;
                    }
                }
            }
        }

        let Some((error, failure, provider_key)) = last else {
            return Err(GatewayError::Config("no providers configured".to_string()));
        };
        let latency_ms = started.elapsed().as_millis() as u64;
        let fail_reason = if failure.failover_eligible {
            "failover exhausted"
        } else {
            "not failover eligible"
        };

        self.log.mark_fail(
            request_id,
            RequestFailure {
                completion: RequestCompletion {
                    usage: Some(CallUsage {
                        provider: provider_key,
                        model_requested: request.model.clone(),
                        model_used: model,
                        failover: tried > 1,
                        input_tokens: 0,
                        output_tokens: 0,
                        total_tokens: 0,
                    }),
                    cost: None,
                    rag: rag_metrics,
                    http_status: error.status_code(),
                    latency_ms,
                },
                error_code: failure.error_code.as_str().to_string(),
                error_message: error.to_string(),
                fail_reason: Some(fail_reason.to_string()),
            },
        );
        // The attempt still counts toward request totals.
        self.meter_usage(&ctx, UsageDelta::new(Decimal::ZERO, 0, 1))
            .await;

        Err(GatewayError::Provider {
            source: error,
            failure,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_success(
        &self,
        request_id: RequestId,
        ctx: &RequestContext,
        model_requested: &str,
        provider_key: &str,
        response: ProviderResponse,
        rag_metrics: Option<RagMetrics>,
        failover: bool,
        degraded: bool,
        latency_ms: u64,
    ) -> ChatOutcome {
        let model_used = if response.model.is_empty() {
            model_requested.to_string()
        } else {
            response.model.clone()
        };
        let usage = response.resolve_usage(&self.pricing);

        self.meter_usage(
            ctx,
            UsageDelta::for_call(usage.cost, usage.total_tokens as i64),
        )
        .await;

        self.log.mark_success(
            request_id,
            RequestCompletion {
                usage: Some(CallUsage {
                    provider: provider_key.to_string(),
                    model_requested: model_requested.to_string(),
                    model_used: model_used.clone(),
                    failover,
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                    total_tokens: usage.total_tokens,
                }),
                cost: Some(CallCost {
                    amount: usage.cost,
                    currency: self.config.currency.clone(),
                    pricing_version: self.pricing.version().to_string(),
                }),
                rag: rag_metrics,
                http_status: Some(response.http_status),
                latency_ms,
            },
        );

        ChatOutcome {
            request_id,
            provider: provider_key.to_string(),
            model_requested: model_requested.to_string(),
            model_used: model_used.clone(),
            failover,
            degraded,
            content: response.content,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: usage.cost,
            cost_known: self.pricing.is_known_model(&model_used),
            latency_ms,
        }
    }

    /// Add usage to every scope on the request context. Metering failures are
    /// logged loudly but never fail the call that already happened.
    async fn meter_usage(&self, ctx: &RequestContext, delta: UsageDelta) {
        let month = YearMonth::current_utc();
        let scopes = [
            BudgetScope::organization(ctx.org_id.clone()),
            BudgetScope::workspace(ctx.workspace_id.clone()),
            BudgetScope::provider_credential(ctx.provider_credential_id.clone()),
        ];
        for scope in scopes {
            if scope.id.is_empty() {
                continue;
            }
            if let Err(err) = self.usage.add_usage(&scope, month, &delta).await {
                tracing::error!(%scope, error = %err, "usage metering failed");
            }
        }
    }

    async fn resolve_context(
        &self,
        prompt: &str,
        settings: Option<&RagSettings>,
    ) -> (String, Option<RagMetrics>) {
        let (Some(retriever), Some(settings)) = (self.retriever.as_ref(), settings) else {
            return (prompt.to_string(), None);
        };
        match retriever.retrieve(prompt, settings).await {
            Ok(rag) => {
                let prompt = if rag.context.is_empty() {
                    prompt.to_string()
                } else {
                    format!("{}\n\n{}", rag.context, prompt)
                };
                (prompt, Some(rag.metrics))
            }
            Err(err) => {
                tracing::warn!(error = %err, "context retrieval failed, continuing without it");
                (prompt.to_string(), None)
            }
        }
    }
}

/// Builder for [`ChatGateway`].
///
/// Stores default to the in-memory backends; the pricing table defaults to
/// the built-in rate set. `build` spawns the log worker and therefore must
/// run inside a tokio runtime.
#[derive(Default)]
pub struct ChatGatewayBuilder {
    policies: Option<Arc<dyn PolicyStore>>,
    usage: Option<Arc<dyn UsageStore>>,
    log_store: Option<Arc<dyn RequestLogStore>>,
    pricing: Option<Arc<PricingTable>>,
    providers: Vec<Arc<dyn ProviderClient>>,
    retriever: Option<Arc<dyn ContextRetriever>>,
    listener: Option<Arc<dyn FailureListener>>,
    config: Option<GatewayConfig>,
}

impl ChatGatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn policy_store(mut self, store: Arc<dyn PolicyStore>) -> Self {
        self.policies = Some(store);
        self
    }

    pub fn usage_store(mut self, store: Arc<dyn UsageStore>) -> Self {
        self.usage = Some(store);
        self
    }

    pub fn log_store(mut self, store: Arc<dyn RequestLogStore>) -> Self {
        self.log_store = Some(store);
        self
    }

    pub fn pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = Some(pricing);
        self
    }

    /// Append a provider to the failover chain; the first is primary.
    pub fn provider(mut self, provider: Arc<dyn ProviderClient>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn failure_listener(mut self, listener: Arc<dyn FailureListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<ChatGateway, GatewayError> {
        if self.providers.is_empty() {
            return Err(GatewayError::Config(
                "at least one provider is required".to_string(),
            ));
        }
        let config = self.config.unwrap_or_default();
        let policies = self.policies.unwrap_or_else(StoreFactory::memory_policies);
        let usage = self.usage.unwrap_or_else(StoreFactory::memory_usage);
        let log_store = self.log_store.unwrap_or_else(RequestLogStoreFactory::memory);
        let recorder = RequestLogRecorder::new(log_store);
        let log = RequestLogWriter::spawn(recorder.clone(), config.log_queue_capacity);

        Ok(ChatGateway {
            guard: BudgetGuard::new(policies, Arc::clone(&usage)),
            pricing: self.pricing.unwrap_or_default(),
            usage,
            recorder,
            log,
            providers: self.providers,
            retriever: self.retriever,
            listener: self.listener,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::failure::ProviderError;
    use crate::gateway::provider::ProviderResponse;

    struct EchoProvider;

    #[async_trait]
    impl ProviderClient for EchoProvider {
        fn provider_key(&self) -> &str {
            "echo"
        }

        async fn complete(&self, call: &ProviderCall) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                model: call.model.clone(),
                content: call.prompt.clone(),
                input_tokens: Some(10),
                output_tokens: Some(10),
                total_tokens: Some(20),
                http_status: 200,
            })
        }
    }

    #[tokio::test]
    async fn test_builder_requires_a_provider() {
        let err = ChatGateway::builder().build().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[tokio::test]
    async fn test_execute_round_trips_with_defaults() {
        let gateway = ChatGateway::builder()
            .provider(Arc::new(EchoProvider))
            .build()
            .unwrap();

        let outcome = gateway
            .execute(ChatRequest {
                context: RequestContext {
                    org_id: "org-1".to_string(),
                    workspace_id: "ws-1".to_string(),
                    provider_credential_id: "cred-1".to_string(),
                    ..Default::default()
                },
                model: "gpt-4o".to_string(),
                prompt: "hello".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(outcome.provider, "echo");
        assert_eq!(outcome.model_used, "gpt-4o");
        assert!(!outcome.failover);
        assert!(!outcome.degraded);
        assert!(outcome.cost_known);
        assert!(outcome.cost > Decimal::ZERO);
    }
}
