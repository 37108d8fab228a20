//! Destination store
//!
//! The destination is the PostgreSQL database where synchronized tables are
//! mirrored and virtual tables are materialized as physical tables.

use async_trait::async_trait;
use deadpool_postgres::{Config as PoolSettings, Pool, PoolConfig, Runtime};
use log::debug;
use serde_json::Value;
use tablemap_core::models::Document;
use tokio_postgres::NoTls;

use crate::config::DestinationConfig;
use crate::error::{to_destination_error, Result, SyncError};

/// SQL-executing interface of the destination
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Execute one statement, returning the number of affected rows
    async fn execute(&self, sql: &str) -> Result<u64>;

    /// Execute `statements` in order inside one transaction
    async fn execute_batch(&self, statements: &[String]) -> Result<()>;

    /// Rows produced by a read-only `SELECT`
    async fn query(&self, select: &str) -> Result<Vec<Document>>;
}

/// `SELECT` returning every row of `select` as one JSON object
pub fn json_rows_sql(select: &str) -> String {
    format!("SELECT row_to_json(q) FROM ({}) q", select)
}

/// PostgreSQL destination backed by a connection pool
pub struct PostgresDestination {
    pool: Pool,
}

impl std::fmt::Debug for PostgresDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDestination")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl PostgresDestination {
    /// Create the pool; connections are opened on demand
    pub fn new(config: &DestinationConfig) -> Result<Self> {
        let mut settings = PoolSettings::new();
        settings.host = Some(config.host.clone());
        settings.port = Some(config.port);
        settings.user = Some(config.user.clone());
        settings.password = Some(config.password.clone());
        settings.dbname = Some(config.dbname.clone());
        settings.pool = Some(PoolConfig::new(config.pool_size.max(1)));

        let pool = settings
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| SyncError::Config(format!("Failed to create destination pool: {}", e)))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DestinationStore for PostgresDestination {
    async fn execute(&self, sql: &str) -> Result<u64> {
        let client = self.pool.get().await.map_err(to_destination_error)?;
        debug!("Executing {}", sql);
        client.execute(sql, &[]).await.map_err(to_destination_error)
    }

    async fn execute_batch(&self, statements: &[String]) -> Result<()> {
        let mut client = self.pool.get().await.map_err(to_destination_error)?;
        let transaction = client.transaction().await.map_err(to_destination_error)?;

        for sql in statements {
            debug!("Executing {}", sql);
            transaction.batch_execute(sql).await.map_err(to_destination_error)?;
        }

        transaction.commit().await.map_err(to_destination_error)
    }

    async fn query(&self, select: &str) -> Result<Vec<Document>> {
        let client = self.pool.get().await.map_err(to_destination_error)?;
        let rows = client
            .query(json_rows_sql(select).as_str(), &[])
            .await
            .map_err(to_destination_error)?;

        rows.iter()
            .map(|row| match row.try_get::<_, Value>(0).map_err(to_destination_error)? {
                Value::Object(document) => Ok(document),
                other => Err(SyncError::Destination(format!("Expected a JSON object, got {}", other))),
            })
            .collect()
    }
}
