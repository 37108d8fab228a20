//! Preview of unsaved virtual tables

use std::time::Duration;
use log::debug;
use serde::Serialize;
use tablemap_core::models::Document;
use tablemap_core::GeneratedSql;

use crate::destination::DestinationStore;
use crate::error::timed;
use crate::materializer::validate_select;

/// Result of a preview
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PreviewResult {
    /// Rows produced by the generated SQL
    Details {
        /// Generated SQL; absent when there is nothing to select
        sql: Option<String>,
        /// Rows, empty without a destination
        details: Vec<Document>,
    },

    /// Generation or execution failed
    Error {
        /// SQL generated before the failure
        sql: Option<String>,
        /// What went wrong
        error: String,
    },
}

/// Preview `generated`, running it on `destination` when there is one
pub async fn preview(
    generated: GeneratedSql,
    destination: Option<&dyn DestinationStore>,
    timeout: Duration,
) -> PreviewResult {
    let sql = match generated {
        GeneratedSql::Statement { sql } => sql,
        GeneratedSql::NoSql => {
            return PreviewResult::Details {
                sql: None,
                details: Vec::new(),
            }
        }
        GeneratedSql::Failed { sql, error } => {
            return PreviewResult::Error {
                sql: Some(sql),
                error,
            }
        }
    };

    let Some(destination) = destination else {
        debug!("No destination, previewing SQL only");
        return PreviewResult::Details {
            sql: Some(sql),
            details: Vec::new(),
        };
    };

    let rows = match validate_select(&sql) {
        Ok(()) => timed(timeout, "preview", destination.query(&sql)).await,
        Err(e) => Err(e),
    };

    match rows {
        Ok(details) => PreviewResult::Details {
            sql: Some(sql),
            details,
        },
        Err(e) => PreviewResult::Error {
            sql: Some(sql),
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::MockDestinationStore;
    use crate::error::SyncError;
    use serde_json::json;

    fn statement(sql: &str) -> GeneratedSql {
        GeneratedSql::Statement { sql: sql.to_string() }
    }

    #[tokio::test]
    async fn test_preview_without_destination_returns_sql() {
        let result = preview(statement("SELECT A.id FROM A LIMIT 5"), None, Duration::from_secs(1)).await;

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"sql": "SELECT A.id FROM A LIMIT 5", "details": []})
        );
    }

    #[tokio::test]
    async fn test_preview_of_nothing() {
        let result = preview(GeneratedSql::NoSql, None, Duration::from_secs(1)).await;

        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"sql": null, "details": []}));
    }

    #[tokio::test]
    async fn test_failed_generation_keeps_partial_sql() {
        let generated = GeneratedSql::Failed {
            sql: "SELECT A.id".to_string(),
            error: "Table not found".to_string(),
        };

        let result = preview(generated, None, Duration::from_secs(1)).await;

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"sql": "SELECT A.id", "error": "Table not found"})
        );
    }

    #[tokio::test]
    async fn test_preview_runs_on_destination() {
        let mut destination = MockDestinationStore::new();
        destination
            .expect_query()
            .withf(|sql| sql == "SELECT A.id FROM A LIMIT 5")
            .returning(|_| Ok(vec![json!({"id": 1}).as_object().cloned().unwrap()]));

        let result = preview(
            statement("SELECT A.id FROM A LIMIT 5"),
            Some(&destination),
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(
            result,
            PreviewResult::Details {
                sql: Some("SELECT A.id FROM A LIMIT 5".to_string()),
                details: vec![json!({"id": 1}).as_object().cloned().unwrap()],
            }
        );
    }

    #[tokio::test]
    async fn test_destination_errors_are_reported() {
        let mut destination = MockDestinationStore::new();
        destination
            .expect_query()
            .returning(|_| Err(SyncError::Destination("relation \"a\" does not exist".to_string())));

        let result = preview(statement("SELECT A.id FROM A"), Some(&destination), Duration::from_secs(1)).await;

        assert!(matches!(result, PreviewResult::Error { ref error, .. } if error.contains("does not exist")));
    }
}
