//! Store-backed issuance, validation and consumption of security tokens.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use learnhub_auth::{AuthError, Identity, SecurityToken, SecurityTokenError, TokenKind, TokenSecret};

use crate::store::{CredentialStore, StoreError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IssuerError {
    #[error(transparent)]
    Token(#[from] SecurityTokenError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<IssuerError> for AuthError {
    fn from(value: IssuerError) -> Self {
        match value {
            IssuerError::Token(e) => e.into(),
            IssuerError::Store(e) => e.into(),
        }
    }
}

/// A live token together with its owner, as loaded by `validate`.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub token: SecurityToken,
    pub identity: Identity,
}

#[derive(Debug)]
pub struct SecurityTokenIssuer<S: ?Sized> {
    store: Arc<S>,
    ttl: Duration,
}

impl<S: ?Sized> Clone for SecurityTokenIssuer<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ttl: self.ttl,
        }
    }
}

impl<S> SecurityTokenIssuer<S>
where
    S: CredentialStore + ?Sized,
{
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Generate a fresh secret and make it the only live token for `(identity, kind)`.
    pub async fn issue(
        &self,
        identity: &Identity,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<SecurityToken, AuthError> {
        let secret = TokenSecret::generate()?;
        Ok(self.store.upsert_token(identity.id, kind, secret, now).await?)
    }

    /// Look a secret up and check it is still within its TTL.
    ///
    /// Unknown secrets, secrets of another kind and tokens whose owner is gone
    /// are all `Invalid`.
    pub async fn validate(
        &self,
        secret: &TokenSecret,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<ValidatedToken, IssuerError> {
        let token = match self.store.get_token(secret, kind).await {
            Ok(token) => token,
            Err(StoreError::NotFound) => return Err(SecurityTokenError::Invalid.into()),
            Err(e) => return Err(e.into()),
        };
        token.check_live(now, self.ttl)?;

        let identity = match self.store.get_identity(token.identity_id).await {
            Ok(identity) => identity,
            Err(StoreError::NotFound) => return Err(SecurityTokenError::Invalid.into()),
            Err(e) => return Err(e.into()),
        };
        Ok(ValidatedToken { token, identity })
    }

    /// Delete the token. Losing a race with another consumer (or a
    /// superseding issue) is `Invalid`.
    pub async fn consume(&self, token: &SecurityToken) -> Result<(), IssuerError> {
        if self.store.delete_token(token.id).await? {
            Ok(())
        } else {
            Err(SecurityTokenError::Invalid.into())
        }
    }
}
