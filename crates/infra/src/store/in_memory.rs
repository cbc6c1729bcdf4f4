use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use learnhub_auth::{
    attempt_is_current, AttemptMutation, Email, Identity, IdentityPatch, NewIdentity,
    SecurityToken, TokenKind, TokenSecret,
};
use learnhub_core::{IdentityId, SecurityTokenId};

use super::{AttemptOutcome, CredentialStore, IdentityFilter, StoreError};

#[derive(Debug, Default)]
struct State {
    identities: HashMap<IdentityId, Identity>,
    /// Keyed by owner and kind: at most one live token per pair.
    tokens: HashMap<(IdentityId, TokenKind), SecurityToken>,
}

/// In-memory credential store for tests/dev.
///
/// A single lock guards all records, so every operation is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("credential store lock poisoned".to_string()))
    }
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn insert_identity(&self, new: NewIdentity) -> Result<Identity, StoreError> {
        let mut state = self.write()?;
        if state.identities.values().any(|i| i.email == new.email) {
            return Err(StoreError::Conflict("email already registered".to_string()));
        }
        if state.identities.contains_key(&new.id) {
            return Err(StoreError::Conflict("identity id already exists".to_string()));
        }
        let identity = Identity::from_new(new);
        state.identities.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn get_identity(&self, id: IdentityId) -> Result<Identity, StoreError> {
        self.read()?.identities.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_identity_by_email(&self, email: &Email) -> Result<Identity, StoreError> {
        self.read()?
            .identities
            .values()
            .find(|i| &i.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_identity(
        &self,
        id: IdentityId,
        patch: IdentityPatch,
        at: DateTime<Utc>,
    ) -> Result<Identity, StoreError> {
        let mut state = self.write()?;
        let identity = state.identities.get_mut(&id).ok_or(StoreError::NotFound)?;
        patch.apply_to(identity, at);
        Ok(identity.clone())
    }

    async fn apply_attempt(
        &self,
        id: IdentityId,
        mutation: AttemptMutation,
        seen_failed_attempts: u32,
        at: DateTime<Utc>,
    ) -> Result<AttemptOutcome, StoreError> {
        let mut state = self.write()?;
        let identity = state.identities.get_mut(&id).ok_or(StoreError::NotFound)?;
        if !attempt_is_current(identity, seen_failed_attempts) {
            return Ok(AttemptOutcome::Stale(identity.clone()));
        }
        mutation.apply_to(identity, at);
        Ok(AttemptOutcome::Applied(identity.clone()))
    }

    async fn delete_identity(&self, id: IdentityId) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.identities.remove(&id).is_none() {
            return Err(StoreError::NotFound);
        }
        state.tokens.retain(|(owner, _kind), _token| *owner != id);
        Ok(())
    }

    async fn list_identities(&self, filter: IdentityFilter) -> Result<Vec<Identity>, StoreError> {
        let state = self.read()?;
        let mut out: Vec<Identity> = state
            .identities
            .values()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn upsert_token(
        &self,
        identity_id: IdentityId,
        kind: TokenKind,
        secret: TokenSecret,
        created_at: DateTime<Utc>,
    ) -> Result<SecurityToken, StoreError> {
        let mut state = self.write()?;
        if !state.identities.contains_key(&identity_id) {
            return Err(StoreError::NotFound);
        }
        if state.tokens.values().any(|t| t.secret == secret) {
            return Err(StoreError::Conflict("token secret collision".to_string()));
        }
        let token = SecurityToken {
            id: SecurityTokenId::new(),
            identity_id,
            kind,
            secret,
            created_at,
        };
        state.tokens.insert((identity_id, kind), token.clone());
        Ok(token)
    }

    async fn get_token(&self, secret: &TokenSecret, kind: TokenKind) -> Result<SecurityToken, StoreError> {
        self.read()?
            .tokens
            .values()
            .find(|t| t.kind == kind && &t.secret == secret)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_token(&self, id: SecurityTokenId) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let key = state
            .tokens
            .iter()
            .find_map(|(key, token)| (token.id == id).then_some(*key));
        Ok(match key {
            Some(key) => state.tokens.remove(&key).is_some(),
            None => false,
        })
    }
}
