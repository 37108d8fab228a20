//! Error types for the synchronization service
//!
//! This module provides error types for upstream fetches, destination writes
//! and configuration loading.

use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tablemap_core::CoreError;

/// Result type for the synchronization service
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type for the synchronization service
#[derive(Debug, Error)]
pub enum SyncError {
    /// Catalog, row store or validation error
    #[error(transparent)]
    Core(#[from] CoreError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream source error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Destination store error
    #[error("Destination error: {0}")]
    Destination(String),

    /// Generated SQL rejected before execution
    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    /// An operation did not finish in time
    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),

    /// A background task failed
    #[error("Task error: {0}")]
    Task(String),
}

/// Convert an upstream driver error
pub fn to_upstream_error<E: ToString>(err: E) -> SyncError {
    SyncError::Upstream(err.to_string())
}

/// Convert a destination driver error
pub fn to_destination_error<E: ToString>(err: E) -> SyncError {
    SyncError::Destination(err.to_string())
}

/// Convert a configuration error
pub fn to_config_error<E: ToString>(err: E) -> SyncError {
    SyncError::Config(err.to_string())
}

/// Run `fut`, failing with [`SyncError::Timeout`] after `limit`
pub async fn timed<T, F>(limit: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(what.to_string(), limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timed_reports_what_timed_out() {
        let err = timed(Duration::from_millis(10), "fetch of clients", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(matches!(err, SyncError::Timeout(ref what, _) if what == "fetch of clients"));
    }

    #[tokio::test]
    async fn test_timed_passes_result_through() {
        let value = timed(Duration::from_secs(1), "noop", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_core_errors_are_transparent() {
        let err: SyncError = CoreError::TableNotFound(uuid::Uuid::nil()).into();
        assert_eq!(
            err.to_string(),
            "Table not found: 00000000-0000-0000-0000-000000000000"
        );
    }
}
