//! Service error taxonomy
//!
//! Four classes of failure, each with a distinct HTTP mapping:
//! input errors (4xx, never retried automatically), precondition /
//! ordering violations (409, state untouched), collaborator faults
//! (502, step retriable), and internal faults (500).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

pub type VerifyResult<T> = std::result::Result<T, VerifyError>;

#[derive(Error, Debug)]
pub enum VerifyError {
    /// Malformed, expired or wrong-purpose token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Malformed request data (missing upload, bad field)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Step invoked out of order, or finalize with incomplete steps
    #[error("Ordering violation: {0}")]
    OrderingViolation(String),

    /// Session already in a terminal state
    #[error("Session is terminal: {0}")]
    TerminalState(String),

    /// Session or related record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Session deadline has passed
    #[error("Session expired")]
    SessionExpired,

    /// External recognition collaborator I/O or infrastructure fault;
    /// the step is safely retriable
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for VerifyError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            VerifyError::InvalidToken(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            VerifyError::InvalidInput(m) => (StatusCode::BAD_REQUEST, m.clone()),
            VerifyError::OrderingViolation(m) => (StatusCode::CONFLICT, m.clone()),
            VerifyError::TerminalState(m) => (StatusCode::CONFLICT, m.clone()),
            VerifyError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            VerifyError::SessionExpired => {
                (StatusCode::GONE, "Verification session has expired".to_string())
            }
            VerifyError::Collaborator(m) => (StatusCode::BAD_GATEWAY, m.clone()),
            VerifyError::Database(e) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", e))
            }
            VerifyError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
        };

        let body = Json(json!({
            "success": false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let cases = [
            (VerifyError::InvalidToken("t".into()), StatusCode::UNAUTHORIZED),
            (VerifyError::InvalidInput("i".into()), StatusCode::BAD_REQUEST),
            (VerifyError::OrderingViolation("o".into()), StatusCode::CONFLICT),
            (VerifyError::TerminalState("c".into()), StatusCode::CONFLICT),
            (VerifyError::SessionExpired, StatusCode::GONE),
            (VerifyError::Collaborator("x".into()), StatusCode::BAD_GATEWAY),
            (VerifyError::Internal("z".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
