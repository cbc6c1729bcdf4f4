//! Errors raised while constructing domain values.

use thiserror::Error;

/// Failure to build a well-formed value from raw input.
///
/// Everything here is caller error: a malformed address, an unknown role tag,
/// an id that is not a UUID. Storage and credential failures live in the auth
/// and infra crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// The human-readable part, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_strips_prefix() {
        let err = DomainError::validation("invalid email format");
        assert_eq!(err.message(), "invalid email format");
        assert_eq!(err.to_string(), "validation failed: invalid email format");
    }
}
