//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use registration_core::Error as LedgerError;
use thiserror::Error;

/// API errors
#[derive(Error, Debug)]
pub enum ApiError {
    /// Resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// Request conflicts with existing state
    #[error("{0}")]
    Conflict(String),

    /// Malformed or invalid request
    #[error("{0}")]
    BadRequest(String),

    /// Caller identity missing or unknown
    #[error("{0}")]
    Unauthorized(String),

    /// Caller lacks the required role
    #[error("{0}")]
    Forbidden(String),

    /// Anything else; details are logged, not returned
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DuplicateRegistration { .. } => {
                ApiError::Conflict("Already registered for this event".to_string())
            }
            LedgerError::CredentialNotFound => ApiError::NotFound("Invalid QR code".to_string()),
            LedgerError::AlreadyVerified { verified_at } => ApiError::Conflict(format!(
                "QR code already used at {}",
                verified_at.to_rfc3339()
            )),
            LedgerError::EmailAlreadyRegistered(_) => {
                ApiError::Conflict("Email already registered".to_string())
            }
            LedgerError::UserNotFound(_) => ApiError::NotFound("User not found".to_string()),
            LedgerError::EventNotFound(_) => ApiError::NotFound("Event not found".to_string()),
            LedgerError::InvalidInput(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(serde_json::json!({
                "error": message,
                "timestamp": Utc::now(),
            })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registration_core::{Constraint, EventId, UserId};

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                LedgerError::DuplicateRegistration {
                    user_id: UserId::new(1),
                    event_id: EventId::new(2),
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::CredentialNotFound, StatusCode::NOT_FOUND),
            (
                LedgerError::AlreadyVerified {
                    verified_at: Utc::now(),
                },
                StatusCode::CONFLICT,
            ),
            (LedgerError::UserNotFound(UserId::new(1)), StatusCode::NOT_FOUND),
            (LedgerError::EventNotFound(EventId::new(1)), StatusCode::NOT_FOUND),
            (
                LedgerError::InvalidInput("bad".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                LedgerError::Conflict(Constraint::Token),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                LedgerError::Storage("disk".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_caller_errors() {
        assert_eq!(
            ApiError::Unauthorized("Not authenticated".to_string()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("Not enough permissions".to_string()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Forbidden("Not enough permissions".to_string()).to_string(),
            "Not enough permissions"
        );
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let response = ApiError::Internal("rocksdb exploded".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
