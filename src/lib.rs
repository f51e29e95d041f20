//! # promptgate
//!
//! Multi-tenant admission, failover, and cost accounting core for LLM
//! gateways.
//!
//! The crate covers the request-time pipeline around provider calls: whether
//! a call may proceed at all under a monthly budget (hard block on provider
//! credentials, soft degrade on workspaces), how provider failures are
//! classified for retry/failover and circuit breaking, how token usage turns
//! into a deterministic cost figure, and how every call attempt is recorded
//! in an auditable terminal-state log.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use promptgate::{ChatGateway, ChatRequest, RequestContext};
//! # use promptgate::{ProviderCall, ProviderClient, ProviderError, ProviderResponse};
//! # struct MyProvider;
//! # #[async_trait::async_trait]
//! # impl ProviderClient for MyProvider {
//! #     fn provider_key(&self) -> &str { "openai" }
//! #     async fn complete(&self, _: &ProviderCall) -> Result<ProviderResponse, ProviderError> {
//! #         Ok(ProviderResponse::default())
//! #     }
//! # }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), promptgate::GatewayError> {
//!     let gateway = ChatGateway::builder()
//!         .provider(Arc::new(MyProvider))
//!         .build()?;
//!
//!     let outcome = gateway
//!         .execute(ChatRequest {
//!             context: RequestContext {
//!                 org_id: "org-1".into(),
//!                 workspace_id: "ws-1".into(),
//!                 provider_credential_id: "cred-1".into(),
//!                 ..Default::default()
//!             },
//!             model: "gpt-4o".into(),
//!             prompt: "Summarize the incident report".into(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("{} (${})", outcome.content, outcome.cost);
//!     Ok(())
//! }
//! ```
//!
//! Budget decisions are advisory at the instant they are made: usage lands
//! after call completion, so concurrently in-flight requests near a limit can
//! transiently overshoot it. See [`budget::guardrail`] for why this race is
//! accepted rather than locked away.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod budget;
pub mod eval;
pub mod failure;
pub mod gateway;
pub mod prelude;
pub mod pricing;
pub mod request_log;

// Re-exports for convenience
pub use budget::{
    BlockReason, BudgetDecision, BudgetError, BudgetGuard, BudgetPolicy, BudgetScope,
    DegradeModelMap, MemoryPolicyStore, MemoryUsageStore, MonthlyUsage, PolicyResolver,
    PolicyStore, PolicyUpdate, ScopeKind, SoftLimitAction, StoreFactory, UsageDelta, UsageStore,
    YearMonth,
};
#[cfg(feature = "postgres")]
pub use budget::{PostgresPolicyStore, PostgresUsageStore};
pub use eval::{EvalCase, EvalOutcome, EvalRunner, EvalRunnerConfig};
pub use failure::{FailureCode, GatewayFailure, ProviderError, classify_provider};
pub use gateway::{
    ChatGateway, ChatGatewayBuilder, ChatOutcome, ChatRequest, ContextRetriever, FailureListener,
    GatewayConfig, GatewayError, ProviderCall, ProviderClient, ProviderResponse, RagContext,
    RagSettings, RequestContext, ResolvedUsage, RetrievalError,
};
pub use pricing::{DEFAULT_PRICING_VERSION, ModelRate, PricingTable, PricingTableBuilder};
#[cfg(feature = "postgres")]
pub use request_log::PostgresRequestLogStore;
pub use request_log::{
    CallCost, CallUsage, MemoryRequestLogStore, RagMetrics, RequestCompletion, RequestFailure,
    RequestId, RequestLogEntry, RequestLogError, RequestLogFilter, RequestLogRecorder,
    RequestLogStore, RequestLogStoreFactory, RequestLogWriter, RequestStart, RequestStatus,
};
