//! Per-scope, per-month usage accumulators.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::scope::{BudgetScope, YearMonth};

/// Increment applied to a monthly usage row after a call completes.
///
/// Negative inputs are normalized to zero at construction: the ledger only
/// ever adds, never subtracts, so the accumulators stay monotonically
/// non-decreasing within a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageDelta {
    cost: Decimal,
    tokens: u64,
    requests: u64,
}

impl UsageDelta {
    pub fn new(cost: Decimal, tokens: i64, requests: i64) -> Self {
        Self {
            cost: cost.max(Decimal::ZERO),
            tokens: tokens.max(0) as u64,
            requests: requests.max(0) as u64,
        }
    }

    /// Delta for a single completed call.
    pub fn for_call(cost: Decimal, tokens: i64) -> Self {
        Self::new(cost, tokens, 1)
    }

    pub fn cost(&self) -> Decimal {
        self.cost
    }

    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }
}

/// Accumulated spend for one (scope, UTC calendar month) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyUsage {
    pub scope: BudgetScope,
    pub month: YearMonth,
    pub cost: Decimal,
    pub total_tokens: u64,
    pub request_count: u64,
}

impl MonthlyUsage {
    pub fn zero(scope: BudgetScope, month: YearMonth) -> Self {
        Self {
            scope,
            month,
            cost: Decimal::ZERO,
            total_tokens: 0,
            request_count: 0,
        }
    }

    pub fn apply(&mut self, delta: &UsageDelta) {
        self.cost += delta.cost();
        self.total_tokens = self.total_tokens.saturating_add(delta.tokens());
        self.request_count = self.request_count.saturating_add(delta.requests());
    }
}
