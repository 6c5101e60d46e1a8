//! Auth Error Types
//!
//! Auth-specific error variants with stable machine-readable codes. They
//! convert into the unified `kernel::error::AppError` at the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use kernel::error::{app_error::AppError, kind::ErrorKind};
use platform::password::{PasswordHashError, PasswordPolicyError};
use platform::token::TokenError;
use thiserror::Error;

/// Auth-specific result type alias
pub type AuthResult<T> = Result<T, AuthError>;

/// Auth-specific error variants
#[derive(Debug, Error)]
pub enum AuthError {
    /// Store rejected a second user with the same email
    #[error("Email already exists")]
    DuplicateEmail,

    /// Store rejected a second user with the same external id
    #[error("External id already exists")]
    DuplicateExternalId,

    /// Registration or external login hit an email owned by another user
    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token rejected: {0}")]
    Token(#[from] TokenError),

    /// Identity provider unreachable, timed out, or not configured
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Identity provider answered without the fields we need
    #[error("Identity provider response invalid: {0}")]
    ProviderResponseInvalid(String),

    /// OAuth state missing, forged, or expired
    #[error("Invalid or expired login state")]
    InvalidState,

    #[error("Not found")]
    NotFound,

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Admin key missing or wrong
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Get the ErrorKind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::DuplicateEmail | AuthError::DuplicateExternalId => ErrorKind::Conflict,
            AuthError::EmailTaken | AuthError::InvalidState | AuthError::Validation(_) => {
                ErrorKind::BadRequest
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized => ErrorKind::Unauthorized,
            AuthError::Token(TokenError::Encoding(_)) => ErrorKind::InternalServerError,
            AuthError::Token(_) => ErrorKind::Unauthorized,
            AuthError::ProviderUnavailable(_) | AuthError::StorageUnavailable(_) => {
                ErrorKind::ServiceUnavailable
            }
            AuthError::ProviderResponseInvalid(_) => ErrorKind::BadGateway,
            AuthError::NotFound => ErrorKind::NotFound,
            AuthError::Internal(_) => ErrorKind::InternalServerError,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::DuplicateEmail => "DUPLICATE_EMAIL",
            AuthError::DuplicateExternalId => "DUPLICATE_EXTERNAL_ID",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Token(TokenError::Expired) => "TOKEN_EXPIRED",
            AuthError::Token(TokenError::SignatureInvalid) => "TOKEN_SIGNATURE_INVALID",
            AuthError::Token(TokenError::Malformed) => "TOKEN_MALFORMED",
            AuthError::Token(TokenError::Encoding(_)) => "INTERNAL",
            AuthError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AuthError::ProviderResponseInvalid(_) => "PROVIDER_RESPONSE_INVALID",
            AuthError::InvalidState => "INVALID_STATE",
            AuthError::NotFound => "NOT_FOUND",
            AuthError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            AuthError::Validation(_) => "VALIDATION_FAILED",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Internal(_) => "INTERNAL",
        }
    }

    /// Message safe to show to clients; details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::EmailTaken | AuthError::DuplicateEmail => {
                "Email already registered".to_string()
            }
            AuthError::DuplicateExternalId => "Account already linked".to_string(),
            AuthError::InvalidCredentials => "Incorrect email or password".to_string(),
            AuthError::Token(TokenError::Expired) => "Token has expired".to_string(),
            AuthError::Token(TokenError::Encoding(_)) => "Internal server error".to_string(),
            AuthError::Token(_) => "Could not validate credentials".to_string(),
            AuthError::ProviderUnavailable(_) => {
                "Identity provider is unavailable".to_string()
            }
            AuthError::ProviderResponseInvalid(_) => {
                "Identity provider returned an invalid response".to_string()
            }
            AuthError::InvalidState => "Invalid or expired login state".to_string(),
            AuthError::NotFound => "Not found".to_string(),
            AuthError::StorageUnavailable(_) => "Service temporarily unavailable".to_string(),
            AuthError::Validation(msg) => msg.clone(),
            AuthError::Unauthorized => "Unauthorized".to_string(),
            AuthError::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Convert to AppError
    pub fn to_app_error(&self) -> AppError {
        AppError::new(self.kind(), self.public_message()).with_code(self.code())
    }

    /// Log the error with appropriate level
    pub(crate) fn log(&self) {
        match self {
            AuthError::StorageUnavailable(detail) => {
                tracing::error!(detail = %detail, "Auth storage unavailable");
            }
            AuthError::Internal(detail) | AuthError::Token(TokenError::Encoding(detail)) => {
                tracing::error!(detail = %detail, "Auth internal error");
            }
            AuthError::ProviderUnavailable(detail) | AuthError::ProviderResponseInvalid(detail) => {
                tracing::warn!(detail = %detail, code = self.code(), "Identity provider failure");
            }
            AuthError::InvalidCredentials | AuthError::Unauthorized | AuthError::InvalidState => {
                tracing::warn!(code = self.code(), "Rejected credentials");
            }
            _ => {
                tracing::debug!(error = %self, "Auth error");
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        self.log();
        self.to_app_error().into_response()
    }
}

impl From<PasswordPolicyError> for AuthError {
    fn from(err: PasswordPolicyError) -> Self {
        AuthError::Validation(err.to_string())
    }
}

impl From<PasswordHashError> for AuthError {
    fn from(err: PasswordHashError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
