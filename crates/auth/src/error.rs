//! Error taxonomy exposed to collaborators.

use thiserror::Error;

use learnhub_core::DomainError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Errors returned by the identity/auth core.
///
/// Lockout, inactive and unverified accounts all surface as the single
/// `AuthenticationFailure`; unknown, expired and already-consumed token secrets
/// all surface as `TokenInvalid`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Malformed or disallowed input (e.g. a privileged role at registration).
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unable to authenticate with provided credentials")]
    AuthenticationFailure,

    #[error("invalid token specified")]
    TokenInvalid,

    /// Unknown identity reference.
    #[error("not found")]
    NotFound,

    /// Duplicate unique key (e.g. e-mail already registered).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The authorization decider denied the requested capability.
    #[error("forbidden")]
    Forbidden,

    /// Storage or hashing backend failure. Never carries credentials.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl AuthError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Stable machine-readable code (used by the HTTP layer).
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation_error",
            AuthError::AuthenticationFailure => "authentication_failed",
            AuthError::TokenInvalid => "token_invalid",
            AuthError::NotFound => "not_found",
            AuthError::Conflict(_) => "conflict",
            AuthError::Forbidden => "forbidden",
            AuthError::Unavailable(_) => "unavailable",
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(value: DomainError) -> Self {
        AuthError::Validation(value.message().to_string())
    }
}
