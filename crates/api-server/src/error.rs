//! API error envelope
//!
//! Every failure leaves the server as
//! `{error, code, timestamp, request_id}` with the HTTP status derived from
//! the code. Store-level absence and cache-validity states never surface as
//! errors; they are normal response fields on the stats payload.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use trustline_core::UrlError;
use trustline_db::DbError;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCode {
    ValidationError,
    AuthError,
    RateLimitError,
    Conflict,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::AuthError => "AuthError",
            ErrorCode::RateLimitError => "RateLimitError",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::DatabaseError => "DatabaseError",
            ErrorCode::InternalError => "InternalError",
        }
    }

    /// 400/401/429/409/500/500. 406 is deliberately absent from this map:
    /// cache misses and invalid entries are response fields, not statuses.
    fn status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::AuthError => StatusCode::UNAUTHORIZED,
            ErrorCode::RateLimitError => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    error: String,
    code: &'static str,
    timestamp: String,
    request_id: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::new(
            ErrorCode::RateLimitError,
            format!("Too many requests, retry in {retry_after_secs}s"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<DbError> for ApiError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::Cooldown => {
                Self::conflict("You already rated this URL in the last 24 hours")
            }
            other => Self::new(ErrorCode::DatabaseError, other.to_string()),
        }
    }
}

impl From<UrlError> for ApiError {
    fn from(error: UrlError) -> Self {
        Self::validation(error.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.code.status(),
            Json(ErrorEnvelope {
                error: self.message,
                code: self.code.as_str(),
                timestamp: Utc::now().to_rfc3339(),
                request_id: self.request_id,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_expected_statuses() {
        assert_eq!(ErrorCode::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::AuthError.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorCode::RateLimitError.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ErrorCode::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::DatabaseError.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        // No code ever produces 406
        for code in [
            ErrorCode::ValidationError,
            ErrorCode::AuthError,
            ErrorCode::RateLimitError,
            ErrorCode::Conflict,
            ErrorCode::DatabaseError,
            ErrorCode::InternalError,
        ] {
            assert_ne!(code.status(), StatusCode::NOT_ACCEPTABLE);
        }
    }

    #[test]
    fn cooldown_maps_to_conflict() {
        let error: ApiError = DbError::Cooldown.into();
        assert_eq!(error.code, ErrorCode::Conflict);
    }

    #[test]
    fn invalid_url_maps_to_validation() {
        let error: ApiError = UrlError::InvalidUrl("ftp://x".to_string()).into();
        assert_eq!(error.code, ErrorCode::ValidationError);
    }

    #[test]
    fn each_error_gets_a_fresh_request_id() {
        let a = ApiError::internal("boom");
        let b = ApiError::internal("boom");
        assert_ne!(a.request_id, b.request_id);
    }
}
