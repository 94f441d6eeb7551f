// =============================================================================
// ERROR MODULE
// =============================================================================
// Custom error types and their HTTP responses.
//
// The engine distinguishes two failure families: a referenced entity is
// absent (NotFound aborts the whole operation before any write), and a
// status change the transition table does not allow (InvalidTransition).
// Everything the engine instead treats as a silent skip — consuming from an
// empty item, replenishing against a deleted item, a duplicate maintenance
// candidate — is NOT an error and never appears here.
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use uuid::Uuid;

use crate::models::ErrorResponse;

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
#[derive(Debug, Error)]
pub enum AppError {
    /// Database query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// The requested status change is not in the transition table
    #[error("{entity} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },

    /// Invalid request data (caught before the engine runs)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
// Implementing IntoResponse lets handlers return Result<_, AppError>
// directly; axum converts failures into proper HTTP responses.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            // 404 Not Found: referenced entity doesn't exist
            AppError::NotFound { .. } => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string())
            }

            // 409 Conflict: the lifecycle does not allow this move
            AppError::InvalidTransition { .. } => (
                StatusCode::CONFLICT,
                "INVALID_TRANSITION",
                self.to_string(),
            ),

            // 400 Bad Request: client sent invalid data
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            // 500: don't leak query details to API consumers
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),

            AppError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg.clone())
            }
        };

        tracing::error!(
            error_code = error_code,
            message = %message,
            "Request failed"
        );

        let body = ErrorResponse::new(error_code, message);

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// RESULT TYPE ALIAS
// =============================================================================
pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
