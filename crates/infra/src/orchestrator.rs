//! Auth workflows (application-level orchestration).
//!
//! Each workflow is a short sequence over the injected collaborators:
//!
//! ```text
//! request
//!   ↓
//! 1. validate input (pure)
//!   ↓
//! 2. read / atomically mutate the credential store
//!   ↓
//! 3. issue or consume security tokens, mint session credentials
//!   ↓
//! 4. queue a notification (fire-and-forget)
//! ```
//!
//! Password hashing runs on the blocking pool. Nothing here logs passwords,
//! hashes, token secrets or session credentials.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use learnhub_auth::{
    evaluate_attempt, identity_visibility, precheck_attempt, validate_password, AttemptDecision, AttemptMutation,
    AuthError, AuthPolicy, AuthResult, Capability, Email, Identity, IdentityPatch,
    IdentityVisibility, NewIdentity, PasswordHasher, Principal, Registration, RelationshipFacts,
    Role, SecurityToken, SessionClaims, SessionError, SessionIssuer, SessionPair, TokenKind,
    TokenSecret,
};
use learnhub_core::{Clock, IdentityId};

use crate::notify::{Notification, NotificationPayload, Notifier, Template};
use crate::store::{AttemptOutcome, CredentialStore, IdentityFilter, StoreError};
use crate::token_issuer::SecurityTokenIssuer;

/// Verified against when an unknown e-mail logs in, so the miss costs a hash.
const TIMING_DECOY_PASSWORD: &str = "learnhub-timing-decoy";

/// How often one login re-evaluates after losing a race on the same identity.
const MAX_ATTEMPT_RETRIES: u32 = 64;

/// A fresh access credential obtained from a refresh credential.
#[derive(Clone)]
pub struct RefreshedSession {
    pub access: String,
    pub access_expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for RefreshedSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefreshedSession")
            .field("access_expires_at", &self.access_expires_at)
            .finish_non_exhaustive()
    }
}

pub struct AuthOrchestrator<S: ?Sized> {
    store: Arc<S>,
    tokens: SecurityTokenIssuer<S>,
    sessions: SessionIssuer,
    hasher: Arc<dyn PasswordHasher>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: AuthPolicy,
    decoy_hash: String,
}

impl<S> AuthOrchestrator<S>
where
    S: CredentialStore + ?Sized + 'static,
{
    pub fn new(
        store: Arc<S>,
        policy: AuthPolicy,
        jwt_secret: &[u8],
        hasher: Arc<dyn PasswordHasher>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> AuthResult<Self> {
        policy.validate()?;
        let decoy_hash = hasher.hash(TIMING_DECOY_PASSWORD)?;

        Ok(Self {
            tokens: SecurityTokenIssuer::new(store.clone(), policy.security_token_ttl()),
            sessions: SessionIssuer::new(jwt_secret, &policy),
            store,
            hasher,
            notifier,
            clock,
            policy,
            decoy_hash,
        })
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ─────────────────────────────────────────────────────────────────────
    // Registration / verification
    // ─────────────────────────────────────────────────────────────────────

    /// Create an inactive, unverified identity and send it a verification token.
    #[tracing::instrument(skip(self, registration), fields(roles = ?registration.roles), err)]
    pub async fn register(&self, registration: Registration) -> AuthResult<Identity> {
        let validated = registration.validate(&self.policy)?;

        match self.store.get_identity_by_email(&validated.email).await {
            Ok(_) => return Err(AuthError::Conflict("email already registered".to_string())),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }

        let password_hash = self.hash_password(registration.password).await?;
        let now = self.clock.now();
        let identity = self
            .store
            .insert_identity(NewIdentity {
                id: IdentityId::new(),
                email: validated.email,
                password_hash,
                firstname: validated.firstname,
                lastname: validated.lastname,
                avatar: validated.avatar,
                roles: validated.roles,
                created_at: now,
            })
            .await?;

        let token = self.tokens.issue(&identity, TokenKind::AccountVerification, now).await?;
        self.send(&identity, Template::AccountVerification, &token);

        info!(identity_id = %identity.id, "identity registered; pending verification");
        Ok(identity)
    }

    /// Consume an account-verification token; flips `verified` and `active` together.
    #[tracing::instrument(skip(self, secret), err)]
    pub async fn verify_account(&self, secret: &TokenSecret) -> AuthResult<Identity> {
        let now = self.clock.now();
        let validated = self.tokens.validate(secret, TokenKind::AccountVerification, now).await?;
        self.tokens.consume(&validated.token).await?;

        let identity = self
            .store
            .update_identity(validated.identity.id, IdentityPatch::verified_and_active(), now)
            .await?;
        info!(identity_id = %identity.id, "identity verified");
        Ok(identity)
    }

    /// Re-send a verification token to a not-yet-verified identity.
    #[tracing::instrument(skip(self, email), err)]
    pub async fn reinvite(&self, email: &str) -> AuthResult<()> {
        let email = Email::parse(email)?;
        let identity = self.store.get_identity_by_email(&email).await?;
        if identity.verified {
            return Err(AuthError::validation("user already verified"));
        }

        let token = self
            .tokens
            .issue(&identity, TokenKind::AccountVerification, self.clock.now())
            .await?;
        self.send(&identity, Template::AccountVerification, &token);
        info!(identity_id = %identity.id, "verification re-sent");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────

    /// Login: lockout guard, then session minting.
    ///
    /// Unknown e-mail, bad password, lockout, inactive and unverified accounts
    /// are all the same `AuthenticationFailure`.
    #[tracing::instrument(skip(self, email, password), err)]
    pub async fn authenticate(&self, email: &str, password: &str) -> AuthResult<SessionPair> {
        let Ok(email) = Email::parse(email) else {
            return Err(AuthError::AuthenticationFailure);
        };

        let mut identity = match self.store.get_identity_by_email(&email).await {
            Ok(identity) => identity,
            Err(StoreError::NotFound) => {
                self.verify_password(password.to_string(), self.decoy_hash.clone()).await?;
                info!("login failed: unknown identity");
                return Err(AuthError::AuthenticationFailure);
            }
            Err(e) => return Err(e.into()),
        };

        let max_attempts = self.policy.max_login_attempts;
        // Stored hash and whether the submitted password matched it.
        let mut checked: Option<(String, bool)> = None;
        let mut retries = 0;

        // The store applies the guard's mutation only if the record is still
        // the snapshot it was computed from; otherwise evaluate again.
        let (verdict, identity, now) = loop {
            let verdict = match precheck_attempt(&identity, max_attempts) {
                Some(verdict) => verdict,
                None => {
                    let cached = checked
                        .as_ref()
                        .filter(|(hash, _)| *hash == identity.password_hash)
                        .map(|(_, matched)| *matched);
                    let matched = match cached {
                        Some(matched) => matched,
                        None => {
                            let hash = identity.password_hash.clone();
                            let matched =
                                self.verify_password(password.to_string(), hash.clone()).await?;
                            checked = Some((hash, matched));
                            matched
                        }
                    };
                    evaluate_attempt(&identity, max_attempts, |_| matched)
                }
            };

            let now = self.clock.now();
            let Some(mutation) = verdict.mutation else {
                break (verdict, identity, now);
            };

            match self
                .store
                .apply_attempt(identity.id, mutation, identity.failed_attempts, now)
                .await?
            {
                AttemptOutcome::Applied(committed) => break (verdict, committed, now),
                AttemptOutcome::Stale(current) => {
                    retries += 1;
                    if retries > MAX_ATTEMPT_RETRIES {
                        warn!(identity_id = %identity.id, "login refused: attempt kept racing");
                        return Err(AuthError::AuthenticationFailure);
                    }
                    debug!(identity_id = %identity.id, retries, "login attempt raced, re-evaluating");
                    identity = current;
                }
            }
        };

        match verdict.decision {
            AttemptDecision::Allow => {
                if !identity.active || identity.locked {
                    warn!(identity_id = %identity.id, "login refused: identity no longer active");
                    return Err(AuthError::AuthenticationFailure);
                }
                let pair = self.sessions.mint(&identity, now).map_err(|e| match e {
                    SessionError::NotVerified => {
                        info!(identity_id = %identity.id, "login refused: not verified");
                        AuthError::AuthenticationFailure
                    }
                    other => AuthError::unavailable(other.to_string()),
                })?;
                info!(identity_id = %identity.id, "login succeeded");
                Ok(pair)
            }
            AttemptDecision::DenyInactive if verdict.mutation == Some(AttemptMutation::Lock) => {
                warn!(
                    identity_id = %identity.id,
                    failed_attempts = identity.failed_attempts,
                    "identity locked after repeated failed logins"
                );
                Err(AuthError::AuthenticationFailure)
            }
            AttemptDecision::DenyLocked => {
                warn!(identity_id = %identity.id, "login refused: identity locked");
                Err(AuthError::AuthenticationFailure)
            }
            AttemptDecision::DenyInactive => {
                info!(identity_id = %identity.id, "login refused: identity inactive");
                Err(AuthError::AuthenticationFailure)
            }
            AttemptDecision::DenyBadCredentials => {
                info!(
                    identity_id = %identity.id,
                    failed_attempts = identity.failed_attempts,
                    "login failed: bad credentials"
                );
                Err(AuthError::AuthenticationFailure)
            }
        }
    }

    #[tracing::instrument(skip(self, refresh_token), err)]
    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<RefreshedSession> {
        let (access, access_expires_at) = self
            .sessions
            .refresh(refresh_token, self.clock.now())
            .map_err(session_failure)?;
        Ok(RefreshedSession {
            access,
            access_expires_at,
        })
    }

    /// Stateless check of an access credential.
    pub fn verify_session(&self, access_token: &str) -> AuthResult<SessionClaims> {
        self.sessions
            .verify(access_token, self.clock.now())
            .map_err(session_failure)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Passwords
    // ─────────────────────────────────────────────────────────────────────

    /// Start a password reset. Only active identities get a token; everyone
    /// else is rejected without a token or notification.
    #[tracing::instrument(skip(self, email), err)]
    pub async fn request_password_reset(&self, email: &str) -> AuthResult<()> {
        let rejected = || AuthError::validation("user not found or deactivated");

        let email = Email::parse(email)?;
        let identity = match self.store.get_identity_by_email(&email).await {
            Ok(identity) if identity.active => identity,
            Ok(identity) => {
                info!(identity_id = %identity.id, "password reset refused: identity inactive");
                return Err(rejected());
            }
            Err(StoreError::NotFound) => return Err(rejected()),
            Err(e) => return Err(e.into()),
        };

        let token = self
            .tokens
            .issue(&identity, TokenKind::PasswordReset, self.clock.now())
            .await?;
        self.send(&identity, Template::PasswordReset, &token);
        info!(identity_id = %identity.id, "password reset initiated");
        Ok(())
    }

    /// Complete a password reset with a reset token. The old password is not needed.
    #[tracing::instrument(skip(self, secret, new_password), err)]
    pub async fn reset_password(&self, secret: &TokenSecret, new_password: &str) -> AuthResult<()> {
        validate_password(new_password, &self.policy)?;

        let now = self.clock.now();
        let validated = self.tokens.validate(secret, TokenKind::PasswordReset, now).await?;
        let password_hash = self.hash_password(new_password.to_string()).await?;
        self.tokens.consume(&validated.token).await?;

        self.store
            .update_identity(
                validated.identity.id,
                IdentityPatch::password_hash(password_hash),
                self.clock.now(),
            )
            .await?;
        info!(identity_id = %validated.identity.id, "password reset completed");
        Ok(())
    }

    /// Authenticated password change; the current password must match.
    #[tracing::instrument(skip(self, old_password, new_password), fields(identity_id = %identity_id), err)]
    pub async fn change_password(
        &self,
        identity_id: IdentityId,
        old_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        let identity = self.store.get_identity(identity_id).await?;
        validate_password(new_password, &self.policy)?;

        let old_matches = self
            .verify_password(old_password.to_string(), identity.password_hash.clone())
            .await?;
        if !old_matches {
            info!(identity_id = %identity.id, "password change refused: old password mismatch");
            return Err(AuthError::validation("old password is incorrect"));
        }

        let password_hash = self.hash_password(new_password.to_string()).await?;
        self.store
            .update_identity(identity.id, IdentityPatch::password_hash(password_hash), self.clock.now())
            .await?;
        info!(identity_id = %identity.id, "password changed");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Authorization and administration
    // ─────────────────────────────────────────────────────────────────────

    pub fn authorize(
        &self,
        principal: &Principal,
        capability: Capability,
        facts: Option<&RelationshipFacts>,
    ) -> bool {
        let allowed = learnhub_auth::authorize(principal, capability, facts);
        debug!(
            identity_id = %principal.identity_id,
            capability = capability.as_str(),
            allowed,
            "authorization decision"
        );
        allowed
    }

    /// Identities the principal may see.
    #[tracing::instrument(skip(self, principal), fields(identity_id = %principal.identity_id), err)]
    pub async fn list_identities(&self, principal: &Principal) -> AuthResult<Vec<Identity>> {
        let filter = match identity_visibility(principal) {
            IdentityVisibility::All => IdentityFilter::All,
            IdentityVisibility::StudentsOnly => IdentityFilter::WithRole(Role::Student),
            IdentityVisibility::SelfOnly => IdentityFilter::Only(principal.identity_id),
            IdentityVisibility::Nothing => return Ok(Vec::new()),
        };
        Ok(self.store.list_identities(filter).await?)
    }

    /// Delete an identity and its tokens. Admins, or the identity itself.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.identity_id, target = %target), err)]
    pub async fn delete_identity(&self, actor: &Principal, target: IdentityId) -> AuthResult<()> {
        let facts = RelationshipFacts {
            owns_record: actor.identity_id == target,
            ..RelationshipFacts::default()
        };
        if !self.authorize(actor, Capability::DeleteIdentity, Some(&facts)) {
            return Err(AuthError::Forbidden);
        }
        self.store.delete_identity(target).await?;
        info!(target = %target, "identity deleted");
        Ok(())
    }

    /// Clear a lockout. The identity becomes active again only if it is verified.
    #[tracing::instrument(skip(self, actor), fields(actor = %actor.identity_id, target = %target), err)]
    pub async fn unlock_identity(&self, actor: &Principal, target: IdentityId) -> AuthResult<Identity> {
        if !self.authorize(actor, Capability::UnlockIdentity, None) {
            return Err(AuthError::Forbidden);
        }
        let identity = self.store.get_identity(target).await?;
        let patch = IdentityPatch {
            locked: Some(false),
            reset_failed_attempts: true,
            active: identity.verified.then_some(true),
            ..IdentityPatch::default()
        };
        let identity = self.store.update_identity(target, patch, self.clock.now()).await?;
        info!(target = %target, active = identity.active, "identity unlocked");
        Ok(identity)
    }

    // ─────────────────────────────────────────────────────────────────────

    fn send(&self, identity: &Identity, template: Template, token: &SecurityToken) {
        self.notifier.notify(Notification {
            destination: identity.email.clone(),
            template,
            payload: NotificationPayload {
                fullname: identity.fullname(),
                email: identity.email.clone(),
                token: token.secret.clone(),
            },
        });
    }

    async fn hash_password(&self, password: String) -> AuthResult<String> {
        let hasher = self.hasher.clone();
        run_blocking(move || hasher.hash(&password)).await?
    }

    async fn verify_password(&self, password: String, hash: String) -> AuthResult<bool> {
        let hasher = self.hasher.clone();
        run_blocking(move || hasher.verify(&password, &hash)).await
    }
}

fn session_failure(err: SessionError) -> AuthError {
    match err {
        SessionError::Signing(msg) => AuthError::unavailable(msg),
        SessionError::LifespanOverflow => AuthError::unavailable(err.to_string()),
        SessionError::Expired | SessionError::Invalid | SessionError::NotVerified => {
            AuthError::AuthenticationFailure
        }
    }
}

async fn run_blocking<T, F>(f: F) -> AuthResult<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AuthError::unavailable(format!("blocking task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use learnhub_auth::Argon2PasswordHasher;
    use learnhub_core::ManualClock;

    use crate::notify::RecordingNotifier;
    use crate::store::InMemoryCredentialStore;

    const PASSWORD: &str = "correct-horse";

    struct Harness {
        auth: AuthOrchestrator<InMemoryCredentialStore>,
        store: Arc<InMemoryCredentialStore>,
        notifier: Arc<RecordingNotifier>,
        clock: Arc<ManualClock>,
    }

    fn harness(policy: AuthPolicy) -> Harness {
        let store = Arc::new(InMemoryCredentialStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let auth = AuthOrchestrator::new(
            store.clone(),
            policy,
            b"orchestrator-test-secret",
            Arc::new(Argon2PasswordHasher::low_cost()),
            notifier.clone(),
            clock.clone(),
        )
        .unwrap();
        Harness {
            auth,
            store,
            notifier,
            clock,
        }
    }

    fn registration(email: &str, roles: &[&str]) -> Registration {
        Registration {
            email: email.to_string(),
            password: PASSWORD.to_string(),
            firstname: "Jo".to_string(),
            lastname: "March".to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            avatar: None,
        }
    }

    impl Harness {
        /// Register and verify; returns the active identity.
        async fn active(&self, email: &str, roles: &[&str]) -> Identity {
            self.auth.register(registration(email, roles)).await.unwrap();
            let secret = self
                .notifier
                .last_token(email, Template::AccountVerification)
                .unwrap();
            self.auth.verify_account(&secret).await.unwrap()
        }

        async fn with_roles(&self, email: &str, roles: &[Role]) -> Principal {
            let identity = self.active(email, &["STUDENT"]).await;
            let roles = learnhub_auth::RoleSet::try_from(roles.to_vec()).unwrap();
            Principal::new(identity.id, roles)
        }
    }

    #[tokio::test]
    async fn registration_creates_inactive_identity_and_notifies() {
        let h = harness(AuthPolicy::default());
        let identity = h.auth.register(registration("kate@example.com", &["STUDENT"])).await.unwrap();

        assert!(!identity.active);
        assert!(!identity.verified);
        assert_eq!(identity.failed_attempts, 0);
        assert_ne!(identity.password_hash, PASSWORD);

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, Template::AccountVerification);
        assert_eq!(sent[0].payload.fullname, "Jo March");
    }

    #[tokio::test]
    async fn privileged_role_at_registration_creates_nothing() {
        let h = harness(AuthPolicy::default());
        let err = h
            .auth
            .register(registration("lee@example.com", &["STUDENT", "SUPER_ADMIN"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Validation(_)));
        assert!(h.store.list_identities(IdentityFilter::All).await.unwrap().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let h = harness(AuthPolicy::default());
        h.auth.register(registration("max@example.com", &["STUDENT"])).await.unwrap();
        let err = h
            .auth
            .register(registration("MAX@example.com", &["TEACHER"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict(_)));
    }

    #[tokio::test]
    async fn unverified_identity_cannot_log_in_even_with_correct_password() {
        let h = harness(AuthPolicy::default());
        let identity = h.auth.register(registration("ned@example.com", &["STUDENT"])).await.unwrap();
        // Active but unverified, so the guard allows and minting refuses.
        h.store
            .update_identity(
                identity.id,
                IdentityPatch {
                    active: Some(true),
                    ..IdentityPatch::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();

        assert_eq!(
            h.auth.authenticate("ned@example.com", PASSWORD).await.err(),
            Some(AuthError::AuthenticationFailure)
        );
        assert_eq!(
            h.auth.authenticate("ned@example.com", "anything").await.err(),
            Some(AuthError::AuthenticationFailure)
        );
    }

    #[tokio::test]
    async fn verification_sets_both_flags_and_is_single_use() {
        let h = harness(AuthPolicy::default());
        h.auth.register(registration("oli@example.com", &["TEACHER"])).await.unwrap();
        let secret = h
            .notifier
            .last_token("oli@example.com", Template::AccountVerification)
            .unwrap();

        let identity = h.auth.verify_account(&secret).await.unwrap();
        assert!(identity.verified && identity.active);

        let before = h.store.get_identity(identity.id).await.unwrap();
        assert_eq!(h.auth.verify_account(&secret).await.err(), Some(AuthError::TokenInvalid));
        assert_eq!(
            h.auth.verify_account(&TokenSecret::from_string("bogus")).await.err(),
            Some(AuthError::TokenInvalid)
        );
        assert_eq!(h.store.get_identity(identity.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn reinvite_supersedes_and_refuses_verified_identities() {
        let h = harness(AuthPolicy::default());
        h.auth.register(registration("pia@example.com", &["STUDENT"])).await.unwrap();
        let first = h
            .notifier
            .last_token("pia@example.com", Template::AccountVerification)
            .unwrap();

        h.auth.reinvite("pia@example.com").await.unwrap();
        let second = h
            .notifier
            .last_token("pia@example.com", Template::AccountVerification)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(h.auth.verify_account(&first).await.err(), Some(AuthError::TokenInvalid));
        h.auth.verify_account(&second).await.unwrap();

        assert!(matches!(
            h.auth.reinvite("pia@example.com").await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(h.auth.reinvite("nobody@example.com").await.err(), Some(AuthError::NotFound));
    }

    #[tokio::test]
    async fn login_mints_verifiable_credentials_and_records_last_login() {
        let h = harness(AuthPolicy::default());
        let identity = h.active("quinn@example.com", &["STUDENT", "TEACHER"]).await;

        let pair = h.auth.authenticate("Quinn@Example.com ", PASSWORD).await.unwrap();
        let claims = h.auth.verify_session(&pair.access).unwrap();
        assert_eq!(claims.identity_id(), identity.id);
        assert_eq!(claims.roles().len(), 2);

        let stored = h.store.get_identity(identity.id).await.unwrap();
        assert_eq!(stored.last_login, Some(h.clock.now()));
    }

    #[tokio::test]
    async fn unknown_email_is_indistinguishable_from_bad_password() {
        let h = harness(AuthPolicy::default());
        h.active("ray@example.com", &["STUDENT"]).await;

        let unknown = h.auth.authenticate("nobody@example.com", PASSWORD).await.unwrap_err();
        let wrong = h.auth.authenticate("ray@example.com", "wrong-pass").await.unwrap_err();
        let malformed = h.auth.authenticate("not-an-email", PASSWORD).await.unwrap_err();
        assert_eq!(unknown, wrong);
        assert_eq!(unknown, malformed);
    }

    #[tokio::test]
    async fn lockout_scenario_at_threshold() {
        let h = harness(AuthPolicy {
            max_login_attempts: 5,
            ..AuthPolicy::default()
        });
        let identity = h.active("sam@example.com", &["STUDENT"]).await;
        for _ in 0..4 {
            h.auth.authenticate("sam@example.com", "wrong-pass").await.unwrap_err();
        }
        assert_eq!(h.store.get_identity(identity.id).await.unwrap().failed_attempts, 4);

        h.auth.authenticate("sam@example.com", "wrong-pass").await.unwrap_err();
        let stored = h.store.get_identity(identity.id).await.unwrap();
        assert_eq!(stored.failed_attempts, 5);
        assert!(stored.active);

        assert_eq!(
            h.auth.authenticate("sam@example.com", PASSWORD).await.err(),
            Some(AuthError::AuthenticationFailure)
        );
        let stored = h.store.get_identity(identity.id).await.unwrap();
        assert!(!stored.active);
        assert!(stored.locked);

        // Still refused afterwards, and no reset can be started while inactive.
        assert!(h.auth.authenticate("sam@example.com", PASSWORD).await.is_err());
        assert!(h.auth.request_password_reset("sam@example.com").await.is_err());
    }

    #[tokio::test]
    async fn successful_login_resets_failures() {
        let h = harness(AuthPolicy::default());
        let identity = h.active("tia@example.com", &["STUDENT"]).await;
        for _ in 0..3 {
            h.auth.authenticate("tia@example.com", "wrong-pass").await.unwrap_err();
        }
        h.auth.authenticate("tia@example.com", PASSWORD).await.unwrap();
        assert_eq!(h.store.get_identity(identity.id).await.unwrap().failed_attempts, 0);
    }

    #[tokio::test]
    async fn concurrent_bad_logins_are_all_counted() {
        let h = Arc::new(harness(AuthPolicy {
            max_login_attempts: 50,
            ..AuthPolicy::default()
        }));
        let identity = h.active("uma@example.com", &["STUDENT"]).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                let _ = h.auth.authenticate("uma@example.com", "wrong-pass").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(h.store.get_identity(identity.id).await.unwrap().failed_attempts, 8);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_bad_logins_cannot_overshoot_the_lock() {
        let h = Arc::new(harness(AuthPolicy {
            max_login_attempts: 3,
            ..AuthPolicy::default()
        }));
        let identity = h.active("wes@example.com", &["STUDENT"]).await;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let h = h.clone();
            handles.push(tokio::spawn(async move {
                h.auth.authenticate("wes@example.com", "wrong-pass").await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().err(), Some(AuthError::AuthenticationFailure));
        }

        let stored = h.store.get_identity(identity.id).await.unwrap();
        assert!(stored.failed_attempts <= 3, "recorded {} failures", stored.failed_attempts);
        assert!(stored.locked);
        assert!(!stored.active);
        assert_eq!(
            h.auth.authenticate("wes@example.com", PASSWORD).await.err(),
            Some(AuthError::AuthenticationFailure)
        );
    }

    #[tokio::test]
    async fn session_expires_at_lifespan() {
        let h = harness(AuthPolicy {
            session_lifespan_hours: 2.0,
            ..AuthPolicy::default()
        });
        h.active("vic@example.com", &["STUDENT"]).await;
        let pair = h.auth.authenticate("vic@example.com", PASSWORD).await.unwrap();

        h.clock.advance(Duration::hours(2) - Duration::seconds(1));
        assert!(h.auth.verify_session(&pair.access).is_ok());
        h.clock.advance(Duration::seconds(1));
        assert_eq!(
            h.auth.verify_session(&pair.access).err(),
            Some(AuthError::AuthenticationFailure)
        );

        let refreshed = h.auth.refresh_session(&pair.refresh).await.unwrap();
        assert!(h.auth.verify_session(&refreshed.access).is_ok());
        assert!(h.auth.refresh_session(&pair.access).await.is_err());
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let h = harness(AuthPolicy::default());
        let identity = h.active("wes@example.com", &["STUDENT"]).await;

        h.auth.request_password_reset("wes@example.com").await.unwrap();
        let secret = h.notifier.last_token("wes@example.com", Template::PasswordReset).unwrap();

        h.auth.reset_password(&secret, "brand-new-pass").await.unwrap();
        assert!(h.auth.authenticate("wes@example.com", PASSWORD).await.is_err());
        h.auth.authenticate("wes@example.com", "brand-new-pass").await.unwrap();

        assert_eq!(
            h.auth.reset_password(&secret, "another-pass").await.err(),
            Some(AuthError::TokenInvalid)
        );
        assert!(h.store.get_identity(identity.id).await.is_ok());
    }

    #[tokio::test]
    async fn reset_for_inactive_identity_is_rejected_silently() {
        let h = harness(AuthPolicy::default());
        h.auth.register(registration("xan@example.com", &["STUDENT"])).await.unwrap();
        let sent_before = h.notifier.sent().len();

        assert!(matches!(
            h.auth.request_password_reset("xan@example.com").await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(h.notifier.sent().len(), sent_before);
        assert!(h.notifier.last_token("xan@example.com", Template::PasswordReset).is_none());
    }

    #[tokio::test]
    async fn expired_reset_token_leaves_password_unchanged() {
        let h = harness(AuthPolicy::default());
        let identity = h.active("yara@example.com", &["STUDENT"]).await;
        h.auth.request_password_reset("yara@example.com").await.unwrap();
        let secret = h.notifier.last_token("yara@example.com", Template::PasswordReset).unwrap();
        let hash_before = h.store.get_identity(identity.id).await.unwrap().password_hash;

        h.clock.advance(Duration::hours(25));
        assert_eq!(
            h.auth.reset_password(&secret, "too-late-pass").await.err(),
            Some(AuthError::TokenInvalid)
        );
        assert_eq!(h.store.get_identity(identity.id).await.unwrap().password_hash, hash_before);
    }

    #[tokio::test]
    async fn change_password_requires_current_password() {
        let h = harness(AuthPolicy::default());
        let identity = h.active("zed@example.com", &["TEACHER"]).await;
        let hash_before = h.store.get_identity(identity.id).await.unwrap().password_hash;

        assert!(matches!(
            h.auth.change_password(identity.id, "not-it", "next-pass").await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(h.store.get_identity(identity.id).await.unwrap().password_hash, hash_before);

        h.auth.change_password(identity.id, PASSWORD, "next-pass").await.unwrap();
        h.auth.authenticate("zed@example.com", "next-pass").await.unwrap();
    }

    #[tokio::test]
    async fn directory_visibility_by_role() {
        let h = harness(AuthPolicy::default());
        let student = h.active("s1@example.com", &["STUDENT"]).await;
        h.active("s2@example.com", &["STUDENT"]).await;
        let teacher = h.active("t1@example.com", &["TEACHER"]).await;

        let as_student = h.auth.list_identities(&Principal::from(&student)).await.unwrap();
        assert_eq!(as_student.len(), 1);
        assert_eq!(as_student[0].id, student.id);

        let as_teacher = h.auth.list_identities(&Principal::from(&teacher)).await.unwrap();
        assert_eq!(as_teacher.len(), 2);

        let admin = h.with_roles("root@example.com", &[Role::SuperAdmin]).await;
        assert_eq!(h.auth.list_identities(&admin).await.unwrap().len(), 4);

        let school_admin = h.with_roles("sa@example.com", &[Role::SchoolAdmin]).await;
        assert!(h.auth.list_identities(&school_admin).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_admin_or_self() {
        let h = harness(AuthPolicy::default());
        let a = h.active("del-a@example.com", &["STUDENT"]).await;
        let b = h.active("del-b@example.com", &["STUDENT"]).await;

        assert_eq!(
            h.auth.delete_identity(&Principal::from(&a), b.id).await.err(),
            Some(AuthError::Forbidden)
        );
        h.auth.delete_identity(&Principal::from(&a), a.id).await.unwrap();

        let admin = h.with_roles("del-admin@example.com", &[Role::SchoolAdmin]).await;
        h.auth.delete_identity(&admin, b.id).await.unwrap();
        assert_eq!(h.auth.delete_identity(&admin, b.id).await.err(), Some(AuthError::NotFound));
    }

    #[tokio::test]
    async fn admin_unlock_restores_verified_identity() {
        let h = harness(AuthPolicy {
            max_login_attempts: 1,
            ..AuthPolicy::default()
        });
        let identity = h.active("lock@example.com", &["STUDENT"]).await;
        h.auth.authenticate("lock@example.com", "wrong-pass").await.unwrap_err();
        h.auth.authenticate("lock@example.com", PASSWORD).await.unwrap_err();
        assert!(h.store.get_identity(identity.id).await.unwrap().locked);

        assert_eq!(
            h.auth.unlock_identity(&Principal::from(&identity), identity.id).await.err(),
            Some(AuthError::Forbidden)
        );

        let admin = h.with_roles("unlock-admin@example.com", &[Role::SuperAdmin]).await;
        let unlocked = h.auth.unlock_identity(&admin, identity.id).await.unwrap();
        assert!(unlocked.active && !unlocked.locked);
        assert_eq!(unlocked.failed_attempts, 0);
        h.auth.authenticate("lock@example.com", PASSWORD).await.unwrap();
    }
}
