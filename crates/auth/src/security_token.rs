//! Single-use verification / password-reset tokens.
//!
//! This module holds the token model, secret generation and the TTL rule.
//! Persistence (supersede-on-issue, delete-on-consume) lives in the credential
//! store; the store-backed issuer in `learnhub-infra` composes the two.

use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use learnhub_core::{DomainError, Entity, IdentityId, SecurityTokenId};

use crate::AuthError;

/// Purpose of a security token.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    AccountVerification,
    PasswordReset,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::AccountVerification => "ACCOUNT_VERIFICATION",
            TokenKind::PasswordReset => "PASSWORD_RESET",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCOUNT_VERIFICATION" => Ok(TokenKind::AccountVerification),
            "PASSWORD_RESET" => Ok(TokenKind::PasswordReset),
            other => Err(DomainError::validation(format!("unknown token kind '{other}'"))),
        }
    }
}

/// Opaque high-entropy secret handed to the identity owner.
///
/// `Debug` is redacted; use `expose()` only where the secret must leave the
/// process (notification payload, response to the owner).
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct TokenSecret(String);

impl TokenSecret {
    /// Random bytes per secret (384 bits).
    pub const ENTROPY_BYTES: usize = 48;

    pub fn generate() -> Result<Self, AuthError> {
        let mut bytes = [0u8; Self::ENTROPY_BYTES];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| AuthError::unavailable(format!("entropy source: {e}")))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(bytes)))
    }

    /// Wrap a secret received from a caller or loaded from storage.
    pub fn from_string(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("TokenSecret(<redacted>)")
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SecurityTokenError {
    /// Unknown secret, wrong kind, or already consumed / superseded.
    #[error("invalid token")]
    Invalid,

    #[error("token has expired")]
    Expired,
}

impl From<SecurityTokenError> for AuthError {
    fn from(_: SecurityTokenError) -> Self {
        // Callers must not learn whether a secret ever existed.
        AuthError::TokenInvalid
    }
}

/// A live (unconsumed) security token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    pub id: SecurityTokenId,
    pub identity_id: IdentityId,
    pub kind: TokenKind,
    pub secret: TokenSecret,
    pub created_at: DateTime<Utc>,
}

impl SecurityToken {
    /// `now - created_at >= ttl` ⇒ expired.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at >= ttl
    }

    pub fn check_live(&self, now: DateTime<Utc>, ttl: Duration) -> Result<(), SecurityTokenError> {
        if self.is_expired(now, ttl) {
            Err(SecurityTokenError::Expired)
        } else {
            Ok(())
        }
    }
}

impl Entity for SecurityToken {
    type Id = SecurityTokenId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
