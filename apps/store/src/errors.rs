#![allow(dead_code)]

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::schema::validator::ValidationReport;

/// Failures surfaced by a `DocumentStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Document rejected by '{collection}' validator: {report}")]
    ValidationRejected {
        collection: String,
        report: ValidationReport,
    },

    #[error("Collection '{collection}' already exists with a different validator")]
    CollectionAlreadyExists { collection: String },

    #[error("Index '{index}' on '{collection}' conflicts with an existing index")]
    IndexConflict { collection: String, index: String },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("Store error: {0}")]
    Store(String),
}

impl StoreError {
    /// Connectivity failures are worth retrying; everything else is deterministic.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::StoreUnavailable(_))
    }
}

/// Gateway error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Upstream(msg) => {
                tracing::error!("Upstream error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "The backend service could not be reached".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
