//! PostgreSQL request log backend.
//!
//! Enable with the `postgres` feature flag. The full row is stored as JSONB
//! with the searchable columns broken out and indexed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{PgPool, QueryBuilder, Row};

use super::entry::{RequestId, RequestLogEntry, RequestLogFilter};
use super::store::RequestLogStore;
use super::{RequestLogError, RequestLogResult};

fn storage_error(err: sqlx::Error) -> RequestLogError {
    RequestLogError::Storage {
        message: err.to_string(),
    }
}

/// PostgreSQL request log store.
pub struct PostgresRequestLogStore {
    pool: Arc<PgPool>,
    table_name: String,
}

impl PostgresRequestLogStore {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::with_pool(Arc::new(pool)))
    }

    pub fn with_pool(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            table_name: "request_logs".to_string(),
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
                id UUID PRIMARY KEY,
                status VARCHAR(16) NOT NULL,
                provider VARCHAR(64),
                model VARCHAR(128),
                error_code VARCHAR(64),
                rag_enabled BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                data JSONB NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_{t}_created ON {t} (created_at);
            CREATE INDEX IF NOT EXISTS idx_{t}_status ON {t} (status);
            CREATE INDEX IF NOT EXISTS idx_{t}_provider ON {t} (provider);
            "#,
            t = self.table_name
        );
        sqlx::query(&query).execute(&*self.pool).await?;
        Ok(())
    }

    async fn write(&self, entry: &RequestLogEntry) -> RequestLogResult<()> {
        let data = serde_json::to_value(entry)?;
        let query = format!(
            r#"
            INSERT INTO {t} (id, status, provider, model, error_code, rag_enabled, created_at, data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                status = $2,
                provider = $3,
                model = $4,
                error_code = $5,
                rag_enabled = $6,
                data = $8
            "#,
            t = self.table_name
        );
        sqlx::query(&query)
            .bind(entry.id.as_uuid())
            .bind(entry.status.as_str())
            .bind(entry.usage.as_ref().map(|u| u.provider.clone()))
            .bind(entry.usage.as_ref().map(|u| u.model_used.clone()))
            .bind(entry.error_code.clone())
            .bind(entry.rag_enabled)
            .bind(entry.created_at)
            .bind(&data)
            .execute(&*self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}

#[async_trait]
impl RequestLogStore for PostgresRequestLogStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn insert(&self, entry: &RequestLogEntry) -> RequestLogResult<()> {
        self.write(entry).await
    }

    async fn load(&self, id: RequestId) -> RequestLogResult<Option<RequestLogEntry>> {
        let query = format!("SELECT data FROM {t} WHERE id = $1", t = self.table_name);
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
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

    async fn save(&self, entry: &RequestLogEntry) -> RequestLogResult<()> {
        self.write(entry).await
    }

    async fn search(&self, filter: &RequestLogFilter) -> RequestLogResult<Vec<RequestLogEntry>> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT data FROM {t} WHERE TRUE", t = self.table_name));
        if let Some(from) = filter.from {
            builder.push(" AND created_at >= ").push_bind(from);
        }
        if let Some(to) = filter.to {
            builder.push(" AND created_at <= ").push_bind(to);
        }
        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }
        if let Some(provider) = &filter.provider {
            builder.push(" AND provider = ").push_bind(provider.clone());
        }
        if let Some(model) = &filter.model {
            builder.push(" AND model = ").push_bind(model.clone());
        }
        if let Some(rag_enabled) = filter.rag_enabled {
            builder.push(" AND rag_enabled = ").push_bind(rag_enabled);
        }
        if let Some(error_code) = &filter.error_code {
            builder.push(" AND error_code = ").push_bind(error_code.clone());
        }
        builder.push(" ORDER BY created_at ASC");

        let rows = builder
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(storage_error)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let data: serde_json::Value = row.get("data");
            entries.push(serde_json::from_value(data)?);
        }
        Ok(entries)
    }
}
