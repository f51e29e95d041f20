//! Budget persistence backends.
//!
//! The usage store's `add_usage` is the one shared-mutable-state operation in
//! the budget core and must behave as an atomic upsert-and-increment; the
//! in-memory backend gets this from `DashMap`'s per-shard entry locking.

use std::sync::Arc;

use dashmap::DashMap;

use super::policy::BudgetPolicy;
use super::scope::{BudgetScope, YearMonth};
use super::usage::{MonthlyUsage, UsageDelta};
use super::BudgetResult;

/// Trait for budget policy persistence backends.
#[async_trait::async_trait]
pub trait PolicyStore: Send + Sync {
    fn name(&self) -> &str;

    async fn find(&self, scope: &BudgetScope) -> BudgetResult<Option<BudgetPolicy>>;

    async fn upsert(&self, policy: &BudgetPolicy) -> BudgetResult<()>;
}

/// Trait for monthly usage persistence backends.
///
/// Implementations must make `add_usage` atomic at the storage layer (row
/// lock, compare-and-add, or transactional increment) — never read-add-write
/// from the application side, which loses updates under concurrent requests
/// for the same scope and month.
#[async_trait::async_trait]
pub trait UsageStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create the month row if absent (zero-initialized), add the delta, and
    /// return the new totals.
    async fn add_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
        delta: &UsageDelta,
    ) -> BudgetResult<MonthlyUsage>;

    async fn find_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
    ) -> BudgetResult<Option<MonthlyUsage>>;
}

/// In-memory policy store (for testing and single-instance deployments).
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    policies: DashMap<BudgetScope, BudgetPolicy>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.policies.len()
    }
}

#[async_trait::async_trait]
impl PolicyStore for MemoryPolicyStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn find(&self, scope: &BudgetScope) -> BudgetResult<Option<BudgetPolicy>> {
        Ok(self.policies.get(scope).map(|p| p.value().clone()))
    }

    async fn upsert(&self, policy: &BudgetPolicy) -> BudgetResult<()> {
        self.policies.insert(policy.scope.clone(), policy.clone());
        Ok(())
    }
}

/// In-memory usage store.
#[derive(Debug, Default)]
pub struct MemoryUsageStore {
    rows: DashMap<(BudgetScope, YearMonth), MonthlyUsage>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn clear(&self) {
        self.rows.clear();
    }
}

#[async_trait::async_trait]
impl UsageStore for MemoryUsageStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn add_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
        delta: &UsageDelta,
    ) -> BudgetResult<MonthlyUsage> {
        // The entry guard holds the shard lock, so upsert-and-increment is
        // atomic with respect to concurrent callers of the same key.
        let mut row = self
            .rows
            .entry((scope.clone(), month))
            .or_insert_with(|| MonthlyUsage::zero(scope.clone(), month));
        row.apply(delta);
        Ok(row.value().clone())
    }

    async fn find_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
    ) -> BudgetResult<Option<MonthlyUsage>> {
        Ok(self
            .rows
            .get(&(scope.clone(), month))
            .map(|r| r.value().clone()))
    }
}

/// Store factory for creating backends.
pub struct StoreFactory;

impl StoreFactory {
    pub fn memory_policies() -> Arc<dyn PolicyStore> {
        Arc::new(MemoryPolicyStore::new())
    }

    pub fn memory_usage() -> Arc<dyn UsageStore> {
        Arc::new(MemoryUsageStore::new())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_find_usage_absent_is_none() {
        tokio_test::block_on(async {
            let store = MemoryUsageStore::new();
            let found = store
                .find_usage(&BudgetScope::workspace("ws-1"), YearMonth::new(2026, 8))
                .await
                .unwrap();
            assert!(found.is_none());
        });
    }

    #[tokio::test]
    async fn test_add_usage_creates_then_increments() {
        let store = MemoryUsageStore::new();
        let scope = BudgetScope::provider_credential("cred-1");
        let month = YearMonth::new(2026, 8);

        let first = store
            .add_usage(&scope, month, &UsageDelta::for_call(dec!(0.10), 100))
            .await
            .unwrap();
        assert_eq!(first.cost, dec!(0.10));
        assert_eq!(first.request_count, 1);

        let second = store
            .add_usage(&scope, month, &UsageDelta::for_call(dec!(0.15), 50))
            .await
            .unwrap();
        assert_eq!(second.cost, dec!(0.25));
        assert_eq!(second.total_tokens, 150);
        assert_eq!(second.request_count, 2);
        assert_eq!(store.count(), 1);
    }

    #[tokio::test]
    async fn test_months_get_separate_rows() {
        let store = MemoryUsageStore::new();
        let scope = BudgetScope::workspace("ws-1");

        store
            .add_usage(&scope, YearMonth::new(2026, 7), &UsageDelta::for_call(dec!(1), 10))
            .await
            .unwrap();
        store
            .add_usage(&scope, YearMonth::new(2026, 8), &UsageDelta::for_call(dec!(2), 20))
            .await
            .unwrap();

        assert_eq!(store.count(), 2);
        let august = store
            .find_usage(&scope, YearMonth::new(2026, 8))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(august.cost, dec!(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let store = Arc::new(MemoryUsageStore::new());
        let scope = BudgetScope::provider_credential("cred-hot");
        let month = YearMonth::new(2026, 8);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let scope = scope.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    store
                        .add_usage(&scope, month, &UsageDelta::for_call(dec!(0.01), 10))
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let total = store.find_usage(&scope, month).await.unwrap().unwrap();
        assert_eq!(total.cost, dec!(8.00));
        assert_eq!(total.total_tokens, 8000);
        assert_eq!(total.request_count, 800);
        assert!(total.cost >= Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_policy_store_upsert_replaces() {
        let store = MemoryPolicyStore::new();
        let scope = BudgetScope::workspace("ws-1");

        let mut policy = BudgetPolicy::default_for(scope.clone());
        store.upsert(&policy).await.unwrap();

        policy.month_limit = Some(dec!(25));
        store.upsert(&policy).await.unwrap();

        assert_eq!(store.count(), 1);
        let found = store.find(&scope).await.unwrap().unwrap();
        assert_eq!(found.month_limit, Some(dec!(25)));
    }
}
