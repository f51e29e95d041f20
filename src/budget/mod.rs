//! Monthly budget policies, usage metering, and admission decisions.

pub mod guardrail;
pub mod policy;
pub mod scope;
pub mod store;
#[cfg(feature = "postgres")]
pub mod store_postgres;
pub mod usage;

pub use guardrail::{BlockReason, BudgetDecision, BudgetGuard};
pub use policy::{BudgetPolicy, DegradeModelMap, PolicyResolver, PolicyUpdate, SoftLimitAction};
pub use scope::{BudgetScope, ScopeKind, YearMonth};
pub use store::{MemoryPolicyStore, MemoryUsageStore, PolicyStore, StoreFactory, UsageStore};
#[cfg(feature = "postgres")]
pub use store_postgres::{PostgresPolicyStore, PostgresUsageStore};
pub use usage::{MonthlyUsage, UsageDelta};

use thiserror::Error;

/// Errors from budget stores and resolvers.
#[derive(Error, Debug)]
pub enum BudgetError {
    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BudgetResult<T> = Result<T, BudgetError>;
