use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{auth::google::GoogleError, email::EmailError};

/// Coarse failure classes surfaced to the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Conflict,
    NotFound,
    Expired,
    AlreadyDone,
    Unauthorized,
    Dependency,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict | ErrorKind::AlreadyDone => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Expired | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Dependency => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors raised by a [`crate::auth::repo::UserStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A live user already owns this email.
    #[error("email already registered")]
    Conflict,

    /// The row to update no longer exists or was soft-deleted.
    #[error("user not found")]
    NotFound,

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict,
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(e),
        }
    }
}

/// Account lifecycle failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email")]
    InvalidEmail,

    #[error("invalid password")]
    InvalidPassword,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("user not found")]
    UserNotFound,

    #[error("verification token has expired")]
    VerificationTokenExpired,

    #[error("user already verified")]
    UserAlreadyVerified,

    #[error("no password set for this account")]
    NoPasswordSet,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("reset token has expired")]
    ResetTokenExpired,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("failed to send email: {0}")]
    Notification(#[from] EmailError),

    #[error("oauth provider error: {0}")]
    OAuth(#[from] GoogleError),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AuthError::UserAlreadyExists,
            StoreError::NotFound => AuthError::UserNotFound,
            other => AuthError::Storage(other),
        }
    }
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidEmail | AuthError::InvalidPassword => ErrorKind::InvalidInput,
            AuthError::UserAlreadyExists => ErrorKind::Conflict,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::VerificationTokenExpired | AuthError::ResetTokenExpired => {
                ErrorKind::Expired
            }
            AuthError::UserAlreadyVerified => ErrorKind::AlreadyDone,
            AuthError::NoPasswordSet
            | AuthError::InvalidCredentials
            | AuthError::TokenExpired
            | AuthError::InvalidSignature => ErrorKind::Unauthorized,
            AuthError::Notification(_)
            | AuthError::OAuth(_)
            | AuthError::Storage(_)
            | AuthError::Internal(_) => ErrorKind::Dependency,
        }
    }

    /// Collapses every password-login failure into one indistinguishable error,
    /// so callers cannot probe which emails are registered.
    pub fn into_login_failure(self) -> Self {
        match self {
            AuthError::UserNotFound | AuthError::NoPasswordSet | AuthError::InvalidCredentials => {
                AuthError::InvalidCredentials
            }
            other => other,
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::Notification(_) => "Failed to send email".into(),
            AuthError::OAuth(GoogleError::Disabled) => "Google login is not configured".into(),
            AuthError::OAuth(_) => "Failed to sign in with Google".into(),
            AuthError::Storage(_) | AuthError::Internal(_) => "Internal server error".into(),
            AuthError::InvalidCredentials => "Invalid credentials".into(),
            AuthError::TokenExpired | AuthError::InvalidSignature => {
                "Invalid or expired token".into()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        if kind == ErrorKind::Dependency {
            error!(error = %self, "request failed");
        }
        let status = match &self {
            AuthError::OAuth(GoogleError::Disabled) => StatusCode::SERVICE_UNAVAILABLE,
            _ => kind.status(),
        };
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
