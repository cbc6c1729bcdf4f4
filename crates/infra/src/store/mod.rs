//! Credential store: the only shared mutable state of the auth core.
//!
//! Every mutation is atomic per record. `apply_attempt` is a compare-and-set:
//! the lockout mutation lands only if the record still matches the snapshot
//! the guard evaluated (see [`attempt_is_current`]), checked in the same
//! store operation as the write. Implementations must give each
//! `upsert_token` a fresh token id, so that consuming a superseded token by
//! id fails.
//!
//! [`attempt_is_current`]: learnhub_auth::attempt_is_current

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use learnhub_auth::{
    AttemptMutation, AuthError, Email, Identity, IdentityPatch, NewIdentity, Role, SecurityToken,
    TokenKind, TokenSecret,
};
use learnhub_core::{IdentityId, SecurityTokenId};

pub mod in_memory;
pub mod postgres;

pub use in_memory::InMemoryCredentialStore;
pub use postgres::PostgresCredentialStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Conflict(msg) => AuthError::Conflict(msg),
            StoreError::Backend(msg) => AuthError::Unavailable(msg),
        }
    }
}

/// Result of a conditional [`CredentialStore::apply_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The mutation was written; carries the committed record.
    Applied(Identity),
    /// The record moved on since the snapshot; nothing was written. Carries
    /// the current record so the caller can evaluate again.
    Stale(Identity),
}

/// Which identities a listing returns.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IdentityFilter {
    All,
    WithRole(Role),
    Only(IdentityId),
}

impl IdentityFilter {
    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            IdentityFilter::All => true,
            IdentityFilter::WithRole(role) => identity.roles.contains(*role),
            IdentityFilter::Only(id) => identity.id == *id,
        }
    }
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fails with `Conflict` if the e-mail is already registered.
    async fn insert_identity(&self, new: NewIdentity) -> Result<Identity, StoreError>;

    async fn get_identity(&self, id: IdentityId) -> Result<Identity, StoreError>;

    async fn get_identity_by_email(&self, email: &Email) -> Result<Identity, StoreError>;

    /// Apply a partial update and return the committed record.
    async fn update_identity(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
        at: DateTime<Utc>,
    ) -> Result<Identity, StoreError>;

    /// Apply the lockout guard's mutation if the record is still active,
    /// unlocked and at `seen_failed_attempts` failures; otherwise leave it
    /// untouched and report `Stale`.
    async fn apply_attempt(
        &self,
        id: IdentityId,
        mutation: AttemptMutation,
        seen_failed_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, StoreError>;

    /// Delete an identity together with all of its security tokens.
    async fn delete_identity(&self, id: IdentityId) -> Result<(), StoreError>;

    /// Ordered by creation time.
    async fn list_identities(&self, filter: IdentityFilter) -> Result<Vec<Identity>, StoreError>;

    /// Store `secret` as the only live token for `(identity_id, kind)`,
    /// replacing any earlier one.
    async fn upsert_token(
        &self,
        identity_id: IdentityId,
        kind: TokenKind,
        secret: TokenSecret,
        created_at: DateTime<Utc>,
    ) -> Result<SecurityToken, StoreError>;

    async fn get_token(&self, secret: &TokenSecret, kind: TokenKind) -> Result<SecurityToken, StoreError>;

    /// `true` if this call removed the token; `false` if it was already gone.
    async fn delete_token(&self, id: SecurityTokenId) -> Result<bool, StoreError>;
}

#[async_trait::async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn insert_identity(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        (**self).insert_identity(new).await
    }

    async fn get_identity(&self, id: IdentityId) -> Result<Identity, StoreError> {
        (**self).get_identity(id).await
    }

    async fn get_identity_by_email(&self, email: &Email) -> Result<Identity, StoreError> {
        (**self).get_identity_by_email(email).await
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
        at: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        (**self).update_identity(id, patch, at).await
    }

    async fn apply_attempt(
        &self,
        id: IdentityId,
        mutation: AttemptMutation,
        seen_failed_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, StoreError> {
        (**self).apply_attempt(id, mutation, seen_failed_attempts, at).await
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<(), StoreError> {
        (**self).delete_identity(id).await
    }

    async fn list_identities(&self, filter: IdentityFilter) -> Result<Vec<Identity>, StoreError> {
        (**self).list_identities(filter).await
    }

    async fn upsert_token(
        &self,
        identity_id: IdentityId,
        kind: TokenKind,
        secret: TokenSecret,
        created_at: DateTime<Utc>,
    ) -> Result<SecurityToken, StoreError> {
        (**self).upsert_token(identity_id, kind, secret, created_at).await
    }

    async fn get_token(&self, secret: &TokenSecret, kind: TokenKind) -> Result<SecurityToken, StoreError> {
        (**self).get_token(secret, kind).await
    }

    async fn delete_token(&self, id: SecurityTokenId) -> Result<bool, StoreError> {
        (**self).delete_token(id).await
    }
}
