//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust
//! use promptgate::prelude::*;
//! ```

// Gateway
pub use crate::gateway::{
    ChatGateway, ChatRequest, GatewayConfig, GatewayError, ProviderCall, ProviderClient,
    ProviderResponse, RequestContext,
};

// Budget
pub use crate::budget::{
    BudgetDecision, BudgetGuard, BudgetPolicy, BudgetScope, PolicyUpdate, ScopeKind, UsageDelta,
    YearMonth,
};

// Failure classification
pub use crate::failure::{FailureCode, GatewayFailure, ProviderError, classify_provider};

// Pricing
pub use crate::pricing::{PricingTable, PricingTableBuilder};

// Request log
pub use crate::request_log::{RequestId, RequestLogEntry, RequestLogFilter, RequestStatus};
