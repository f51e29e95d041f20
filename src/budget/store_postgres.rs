//! PostgreSQL budget persistence backends.
//!
//! Enable with the `postgres` feature flag. The usage increment is pushed
//! down to the database as an `ON CONFLICT .. DO UPDATE` compare-and-add, so
//! concurrent requests for the same scope and month never lose updates.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use super::policy::BudgetPolicy;
use super::scope::{BudgetScope, YearMonth};
use super::store::{PolicyStore, UsageStore};
use super::usage::{MonthlyUsage, UsageDelta};
use super::{BudgetError, BudgetResult};

fn storage_error(err: sqlx::Error) -> BudgetError {
    BudgetError::Storage {
        message: err.to_string(),
    }
}

/// PostgreSQL policy store.
pub struct PostgresPolicyStore {
    pool: Arc<PgPool>,
    table_name: String,
}

impl PostgresPolicyStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "budget_policies".to_string(),
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                scope_kind VARCHAR(32) NOT NULL,
                scope_id VARCHAR(255) NOT NULL,
                data JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (scope_kind, scope_id)
            );
            "#,
            t = self.table_name
        );
        sqlx::query(&query).execute(&*self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PolicyStore for PostgresPolicyStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn find(&self, scope: &BudgetScope) -> BudgetResult<Option<BudgetPolicy>> {
        let query = format!(
            "SELECT data FROM {t} WHERE scope_kind = $1 AND scope_id = $2",
            t = self.table_name
        );
        let row = sqlx::query(&query)
            .bind(scope.kind.as_str())
            .bind(&scope.id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;

        match row {
            Some(row) => {
                let data: serde_json::Value = row.get("data");
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn upsert(&self, policy: &BudgetPolicy) -> BudgetResult<()> {
        let data = serde_json::to_value(policy)?;
        let query = format!(
            r#"
            INSERT INTO {t} (scope_kind, scope_id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope_kind, scope_id) DO UPDATE SET
                data = $3,
                updated_at = NOW()
            "#,
            t = self.table_name
        );
        sqlx::query(&query)
            .bind(policy.scope.kind.as_str())
            .bind(&policy.scope.id)
            .bind(&data)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

/// PostgreSQL usage store with native atomic increments.
pub struct PostgresUsageStore {
    pool: Arc<PgPool>,
    table_name: String,
}

impl PostgresUsageStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "budget_usage".to_string(),
        }
    }

    pub fn with_table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = name.into();
        self
    }

    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        let query = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                scope_kind VARCHAR(32) NOT NULL,
                scope_id VARCHAR(255) NOT NULL,
                month CHAR(7) NOT NULL,
                cost NUMERIC(20, 8) NOT NULL DEFAULT 0,
                total_tokens BIGINT NOT NULL DEFAULT 0,
                request_count BIGINT NOT NULL DEFAULT 0,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (scope_kind, scope_id, month)
            );
            "#,
            t = self.table_name
        );
        sqlx::query(&query).execute(&*self.pool).await?;
        Ok(())
    }

    fn row_to_usage(scope: &BudgetScope, month: YearMonth, row: &sqlx::postgres::PgRow) -> MonthlyUsage {
        let tokens: i64 = row.get("total_tokens");
        let requests: i64 = row.get("request_count");
        MonthlyUsage {
            scope: scope.clone(),
            month,
            cost: row.get::<Decimal, _>("cost"),
            total_tokens: tokens.max(0) as u64,
            request_count: requests.max(0) as u64,
        }
    }
}

#[async_trait]
impl UsageStore for PostgresUsageStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn add_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
        delta: &UsageDelta,
    ) -> BudgetResult<MonthlyUsage> {
        let query = format!(
            r#"
            INSERT INTO {t} (scope_kind, scope_id, month, cost, total_tokens, request_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (scope_kind, scope_id, month) DO UPDATE SET
                cost = {t}.cost + EXCLUDED.cost,
                total_tokens = {t}.total_tokens + EXCLUDED.total_tokens,
                request_count = {t}.request_count + EXCLUDED.request_count,
                updated_at = NOW()
            RETURNING cost, total_tokens, request_count
            "#,
            t = self.table_name
        );
        let row = sqlx::query(&query)
            .bind(scope.kind.as_str())
            .bind(&scope.id)
            .bind(month.to_string())
            .bind(delta.cost())
            .bind(delta.tokens() as i64)
            .bind(delta.requests() as i64)
            .fetch_one(&*self.pool)
            .await
            .map_err(storage_error)?;

        Ok(Self::row_to_usage(scope, month, &row))
    }

    async fn find_usage(
        &self,
        scope: &BudgetScope,
        month: YearMonth,
    ) -> BudgetResult<Option<MonthlyUsage>> {
        let query = format!(
            r#"
            SELECT cost, total_tokens, request_count
            FROM {t}
            WHERE scope_kind = $1 AND scope_id = $2 AND month = $3
            "#,
            t = self.table_name
        );
        let row = sqlx::query(&query)
            .bind(scope.kind.as_str())
            .bind(&scope.id)
            .bind(month.to_string())
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage_error)?;

        Ok(row.map(|row| Self::row_to_usage(scope, month, &row)))
    }
}
