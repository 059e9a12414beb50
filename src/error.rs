//! Authentication Error Types
//!
//! Centralized error handling for every authentication operation. Each
//! branch of the auth flows has its own variant so the delivery layer can
//! answer with a precise status; only unexpected store failures collapse
//! into `Database`/`Internal`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Authentication errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    // Validation
    #[error("Invalid Pakistani phone number format (expected: +923xxxxxxxxx)")]
    InvalidPhoneFormat,

    #[error("Invalid role")]
    InvalidRole,

    #[error("Validation error: {0}")]
    Validation(String),

    // Conflict
    /// Carries the colliding field: `"email"` or `"phone"`.
    #[error("User with this {0} already exists")]
    AlreadyExists(&'static str),

    // Authentication
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Invalid OTP code")]
    InvalidOtp,

    #[error("OTP not found or expired")]
    OtpNotFound,

    #[error("Authentication required")]
    Unauthorized,

    // Account state
    #[error("User email not verified")]
    UserNotVerified,

    #[error("User account is inactive")]
    UserInactive,

    #[error("User is already verified")]
    AlreadyVerified,

    #[error("OTP already sent, please wait before requesting again")]
    OtpAlreadySent,

    #[error("Forbidden: insufficient permissions")]
    Forbidden,

    #[error("User not found")]
    UserNotFound,

    #[error("Rate limit exceeded, please try again later")]
    RateLimited,

    // Internal
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error")]
    Internal,
}

impl AuthError {
    /// HTTP status and stable machine-readable code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AuthError::InvalidPhoneFormat => (StatusCode::BAD_REQUEST, "invalid_phone_format"),
            AuthError::InvalidRole => (StatusCode::BAD_REQUEST, "invalid_role"),
            AuthError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AuthError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
            AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "invalid_credentials"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "expired_token"),
            AuthError::RevokedToken => (StatusCode::UNAUTHORIZED, "revoked_token"),
            AuthError::InvalidOtp => (StatusCode::UNAUTHORIZED, "invalid_otp"),
            AuthError::OtpNotFound => (StatusCode::NOT_FOUND, "otp_not_found"),
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AuthError::UserNotVerified => (StatusCode::FORBIDDEN, "user_not_verified"),
            AuthError::UserInactive => (StatusCode::FORBIDDEN, "user_inactive"),
            AuthError::AlreadyVerified => (StatusCode::BAD_REQUEST, "already_verified"),
            AuthError::OtpAlreadySent => (StatusCode::TOO_MANY_REQUESTS, "otp_already_sent"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "forbidden"),
            AuthError::UserNotFound => (StatusCode::NOT_FOUND, "user_not_found"),
            AuthError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            AuthError::Database(_) | AuthError::Config(_) | AuthError::Internal => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        // Internal details stay in the logs
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        (
            status,
            Json(serde_json::json!({
                "error": error_code,
                "message": message
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {:?}", err);
        AuthError::Database(err.to_string())
    }
}

impl From<argon2::password_hash::Error> for AuthError {
    fn from(err: argon2::password_hash::Error) -> Self {
        tracing::error!("Password hashing error: {:?}", err);
        AuthError::Internal
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        tracing::debug!("JWT error: {:?}", err);
        AuthError::InvalidToken
    }
}

impl From<validator::ValidationErrors> for AuthError {
    fn from(err: validator::ValidationErrors) -> Self {
        AuthError::Validation(err.to_string())
    }
}
