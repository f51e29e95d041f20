//! Offline evaluation runner.
//!
//! The second call site of [`classify_provider`]: batch evaluations apply
//! exactly the same failure semantics as the live gateway. Any divergence
//! between the two call sites is a defect, so both delegate to the shared
//! classifier instead of inspecting errors themselves.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use rust_decimal::Decimal;

use crate::failure::{classify_provider, GatewayFailure};
use crate::gateway::{ProviderCall, ProviderClient};
use crate::pricing::PricingTable;

/// One prompt to evaluate.
#[derive(Debug, Clone)]
pub struct EvalCase {
    pub id: String,
    pub model: String,
    pub prompt: String,
    pub max_output_tokens: Option<u32>,
}

/// Result of evaluating one case.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub case_id: String,
    pub model: String,
    pub content: Option<String>,
    pub failure: Option<GatewayFailure>,
    pub error: Option<String>,
    pub cost: Decimal,
    pub cost_known: bool,
    pub attempts: u32,
    pub latency_ms: u64,
}

impl EvalOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct EvalRunnerConfig {
    /// Cases evaluated concurrently.
    pub concurrency: usize,
    /// Retries per case on transient failures.
    pub max_retries: u32,
}

impl Default for EvalRunnerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
        }
    }
}

/// Runs evaluation batches against a single provider.
pub struct EvalRunner {
    provider: Arc<dyn ProviderClient>,
    pricing: Arc<PricingTable>,
    config: EvalRunnerConfig,
}

impl EvalRunner {
    pub fn new(provider: Arc<dyn ProviderClient>, pricing: Arc<PricingTable>) -> Self {
        Self {
            provider,
            pricing,
            config: EvalRunnerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EvalRunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Evaluate every case with bounded concurrency. Failures are reported
    /// per case, never propagated; a batch always completes.
    pub async fn run(&self, cases: Vec<EvalCase>) -> Vec<EvalOutcome> {
        futures::stream::iter(cases.into_iter().map(|case| self.run_case(case)))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await
    }

    async fn run_case(&self, case: EvalCase) -> EvalOutcome {
        let started = Instant::now();
        let call = ProviderCall {
            model: case.model.clone(),
            prompt: case.prompt.clone(),
            max_output_tokens: case.max_output_tokens,
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match self.provider.complete(&call).await {
                Ok(response) => {
                    let usage = response.resolve_usage(&self.pricing);
                    return EvalOutcome {
                        case_id: case.id,
                        cost_known: self.pricing.is_known_model(&response.model),
                        model: response.model,
                        content: Some(response.content),
                        failure: None,
                        error: None,
                        cost: usage.cost,
                        attempts,
                        latency_ms: started.elapsed().as_millis() as u64,
                    };
                }
                Err(error) => {
                    let failure = classify_provider(&error);
                    // Only genuine infra degradation is worth retrying;
                    // client errors and config mismatches recur identically.
                    let transient = failure.counted_as_failure && failure.failover_eligible;
                    if transient && attempts <= self.config.max_retries {
                        tracing::debug!(
                            case = %case.id,
                            code = %failure.error_code,
                            attempt = attempts,
                            "transient eval failure, retrying"
                        );
                        continue;
                    }
                    return EvalOutcome {
                        case_id: case.id,
                        model: case.model,
                        content: None,
                        failure: Some(failure),
                        error: Some(error.to_string()),
                        cost: Decimal::ZERO,
                        cost_known: false,
                        attempts,
                        latency_ms: started.elapsed().as_millis() as u64,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::failure::{FailureCode, ProviderError};
    use crate::gateway::ProviderResponse;

    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl ProviderClient for ScriptedProvider {
        fn provider_key(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, call: &ProviderCall) -> Result<ProviderResponse, ProviderError> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Ok(ProviderResponse {
                        model: call.model.clone(),
                        content: "ok".to_string(),
                        input_tokens: Some(100),
                        output_tokens: Some(50),
                        total_tokens: Some(150),
                        http_status: 200,
                    })
                })
        }
    }

    fn case(id: &str) -> EvalCase {
        EvalCase {
            id: id.to_string(),
            model: "gpt-4o".to_string(),
            prompt: "prompt".to_string(),
            max_output_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Api {
                status: 503,
                message: "unavailable".to_string(),
                error_type: None,
            }),
            Err(ProviderError::Timeout(Duration::from_secs(30))),
        ]));
        let runner = EvalRunner::new(provider, Arc::new(PricingTable::default()));

        let outcomes = runner.run(vec![case("case-1")]).await;
        assert_eq!(outcomes.len(), 1);
        let outcome = &outcomes[0];
        assert!(outcome.succeeded());
        assert_eq!(outcome.attempts, 3);
        assert!(outcome.cost > Decimal::ZERO);
        assert!(outcome.cost_known);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::Api {
            status: 400,
            message: "bad request".to_string(),
            error_type: None,
        })]));
        let runner = EvalRunner::new(provider, Arc::new(PricingTable::default()));

        let outcomes = runner.run(vec![case("case-1")]).await;
        let outcome = &outcomes[0];
        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 1);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.error_code, FailureCode::ClientError);
        assert!(!failure.counted_as_failure);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let always_down: Vec<_> = (0..10)
            .map(|_| {
                Err(ProviderError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                    error_type: None,
                })
            })
            .collect();
        let provider = Arc::new(ScriptedProvider::new(always_down));
        let runner = EvalRunner::new(provider, Arc::new(PricingTable::default()))
            .with_config(EvalRunnerConfig {
                concurrency: 1,
                max_retries: 1,
            });

        let outcomes = runner.run(vec![case("case-1")]).await;
        let outcome = &outcomes[0];
        assert!(!outcome.succeeded());
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.failure.unwrap().error_code, FailureCode::Upstream);
    }
}
