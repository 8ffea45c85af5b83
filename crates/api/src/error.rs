use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use siphon_engine::{OrchestratorError, StoreError};

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A lifecycle or persistence error from the execution engine.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound {
        entity: &'static str,
        id: siphon_core::types::DbId,
    },
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Orchestrator(e) => match e {
                OrchestratorError::InvalidTransition { .. } => {
                    (StatusCode::CONFLICT, "INVALID_TRANSITION", e.to_string())
                }
                OrchestratorError::InvalidConcurrency(_) => {
                    (StatusCode::BAD_REQUEST, "INVALID_CONCURRENCY", e.to_string())
                }
                OrchestratorError::Store(StoreError::NotFound { .. }) => {
                    (StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
                }
                other => {
                    tracing::error!(error = %other, "Orchestrator error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Database(e) => {
                tracing::error!(error = %e, "Database error in handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal error occurred".to_string(),
                )
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            AppError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
        };

        let body = axum::Json(json!({
            "error": { "code": code, "message": message }
        }));
        (status, body).into_response()
    }
}
