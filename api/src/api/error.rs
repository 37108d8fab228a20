//! Error responses

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tablemap_core::models::PropertyConflict;
use tablemap_core::CoreError;
use thiserror::Error;

/// Error returned by a handler, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    /// The addressed resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// The request was rejected
    #[error("{0}")]
    BadRequest(String),

    /// A data group reuses properties owned by other groups of its table
    #[error("{message}")]
    PropertyConflicts {
        message: String,
        conflicts: Vec<PropertyConflict>,
    },

    /// Storage or persistence failure
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status of the error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::PropertyConflicts { .. } => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TableNotFound(_) | CoreError::RelationNotFound(_) | CoreError::DataGroupNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            CoreError::DataGroupOverlap { ref conflicts, .. } => ApiError::PropertyConflicts {
                message: err.to_string(),
                conflicts: conflicts.clone(),
            },
            CoreError::StorageError(_)
            | CoreError::SqliteError(_)
            | CoreError::JsonError(_)
            | CoreError::IoError(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(message) = &self {
            tracing::error!("Request failed: {}", message);
        }
        let body = match &self {
            ApiError::PropertyConflicts { conflicts, .. } => {
                let data: Vec<_> = conflicts
                    .iter()
                    .map(|c| {
                        json!({
                            "property": c.property,
                            "data_group": c.data_group,
                            "description": c.description,
                        })
                    })
                    .collect();
                json!({ "error": self.to_string(), "data": data })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (self.status(), Json(body)).into_response()
    }
}
