//! Error taxonomy for the authentication core.
//!
//! The variants map onto a deliberately small set of HTTP responses:
//! credential, token and session failures all collapse into uniform 401
//! bodies so a caller cannot distinguish "unknown user" from "wrong
//! password" or "revoked" from "expired". The precise cause is only ever
//! written to the log.

use axum::{
    Json,
    http::{StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Wrong username/password or unknown/disabled account.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Malformed, unsigned or wrongly-signed access credential.
    #[error("access credential invalid")]
    TokenInvalid,
    /// Structurally valid access credential past its expiry.
    #[error("access credential expired")]
    TokenExpired,
    /// Refresh secret matches no active session (unknown, revoked or expired).
    #[error("session inactive")]
    SessionInactive,
    /// Reset token matches no active record (unknown, used or expired).
    #[error("reset token inactive")]
    ResetTokenInactive,
    /// Username or email already taken at registration.
    #[error("{0} already exists")]
    DuplicateIdentity(&'static str),
    /// Password rejected by the strength policy.
    #[error("password too weak")]
    WeakPassword,
    /// Fixed-window limit exceeded on a guarded endpoint.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },
    /// Secret hash collided with an existing record. Cryptographically
    /// negligible with the secret generation in use; treated as fatal.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Unexpected infrastructure failure (signing, missing owner row).
    #[error("internal error: {0}")]
    Internal(String),
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "invalid_credentials")
    pub error: String,
    /// Human-readable description, intentionally generic for auth failures
    pub message: String,
    /// Seconds to wait before retrying, only set on rate-limit rejections
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
}

impl ErrorBody {
    fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            retry_after_seconds: None,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new(
                    "invalid_credentials",
                    "Invalid username or password",
                )),
            )
                .into_response(),
            // Expired and malformed tokens are indistinguishable to callers.
            AuthError::TokenInvalid | AuthError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new("invalid_token", "Invalid or expired credential")),
            )
                .into_response(),
            AuthError::SessionInactive => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorBody::new(
                    "session_inactive",
                    "Invalid or expired refresh token",
                )),
            )
                .into_response(),
            // Never issued, already used and expired all read the same.
            AuthError::ResetTokenInactive => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(
                    "reset_token_inactive",
                    "Invalid or expired token",
                )),
            )
                .into_response(),
            AuthError::DuplicateIdentity(field) => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new(
                    "duplicate_identity",
                    &format!("{field} already exists"),
                )),
            )
                .into_response(),
            AuthError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                Json(ErrorBody::new("weak_password", "Password too weak")),
            )
                .into_response(),
            AuthError::RateLimited { retry_after_secs } => {
                let retry = *retry_after_secs;
                let body = ErrorBody {
                    error: "too_many_requests".to_string(),
                    message: "Rate limit exceeded".to_string(),
                    retry_after_seconds: Some(retry),
                };
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    [(RETRY_AFTER, retry.to_string())],
                    Json(body),
                )
                    .into_response()
            }
            AuthError::IntegrityViolation(detail) => {
                tracing::error!(
                    name = "error.integrity_violation",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    detail = %detail,
                    message = "Aborting operation on integrity violation"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("server_error", "Unexpected error")),
                )
                    .into_response()
            }
            AuthError::Internal(detail) => {
                tracing::error!(
                    name = "error.internal",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    detail = %detail,
                    message = "Internal error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("server_error", "Unexpected error")),
                )
                    .into_response()
            }
            AuthError::Database(e) => {
                tracing::error!(
                    name = "error.database",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = ?e,
                    message = "Database error"
                );
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorBody::new("server_error", "Unexpected error")),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_status_codes() {
        let response = AuthError::InvalidCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::TokenInvalid.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::TokenExpired.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::SessionInactive.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = AuthError::ResetTokenInactive.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::DuplicateIdentity("username").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::WeakPassword.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = AuthError::IntegrityViolation("collision".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_sets_retry_after_header() {
        let response = AuthError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(RETRY_AFTER).unwrap().to_str().unwrap(),
            "42"
        );
    }

    #[test]
    fn test_expired_and_invalid_tokens_share_a_body() {
        // Callers must not be able to tell the two failure modes apart.
        let invalid = AuthError::TokenInvalid.into_response();
        let expired = AuthError::TokenExpired.into_response();
        assert_eq!(invalid.status(), expired.status());
    }
}
