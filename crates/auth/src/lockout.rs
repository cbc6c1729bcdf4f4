//! Lockout guard.
//!
//! A pure decision over an identity snapshot plus the single mutation the
//! store must apply atomically before the caller sees the result. The guard
//! never writes; `CredentialStore::apply_attempt` does.

use chrono::{DateTime, Utc};

use crate::Identity;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttemptDecision {
    Allow,
    DenyLocked,
    DenyInactive,
    DenyBadCredentials,
}

/// State change requested by the guard.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AttemptMutation {
    /// Atomic `failed_attempts += 1`.
    RecordFailure,
    /// `failed_attempts = 0`, `last_login = at`.
    RecordSuccess,
    /// `active = false`, `locked = true`.
    Lock,
}

impl AttemptMutation {
    /// Apply to an in-memory record. Stores call this under their per-record lock.
    pub fn apply_to(&self, identity: &mut Identity, at: DateTime<Utc>) {
        match self {
            AttemptMutation::RecordFailure => {
                identity.failed_attempts = identity.failed_attempts.saturating_add(1);
            }
            AttemptMutation::RecordSuccess => {
                identity.failed_attempts = 0;
                identity.last_login = Some(at);
            }
            AttemptMutation::Lock => {
                identity.active = false;
                identity.locked = true;
            }
        }
        identity.updated_at = at;
    }
}

/// Whether `identity` is still in the state a guard verdict was computed from.
///
/// Every mutation the guard requests comes from an active, unlocked snapshot
/// with `seen_failed_attempts` failures. Stores apply the mutation only while
/// this holds, in the same atomic step as the write.
pub fn attempt_is_current(identity: &Identity, seen_failed_attempts: u32) -> bool {
    identity.active && !identity.locked && identity.failed_attempts == seen_failed_attempts
}

/// Verdict reachable without looking at the password (rules 1 to 3).
///
/// `None` means the password decides.
pub fn precheck_attempt(identity: &Identity, max_attempts: u32) -> Option<AttemptVerdict> {
    if !identity.active {
        let decision = if identity.locked {
            AttemptDecision::DenyLocked
        } else {
            AttemptDecision::DenyInactive
        };
        return Some(AttemptVerdict::new(decision, None));
    }

    if identity.failed_attempts > max_attempts {
        return Some(AttemptVerdict::new(AttemptDecision::DenyLocked, None));
    }

    if identity.failed_attempts == max_attempts {
        return Some(AttemptVerdict::new(
            AttemptDecision::DenyInactive,
            Some(AttemptMutation::Lock),
        ));
    }

    None
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttemptVerdict {
    pub decision: AttemptDecision,
    pub mutation: Option<AttemptMutation>,
}

impl AttemptVerdict {
    fn new(decision: AttemptDecision, mutation: Option<AttemptMutation>) -> Self {
        Self { decision, mutation }
    }
}

/// Evaluate a login attempt against `identity`.
///
/// Rules, in order:
/// 1. inactive: `DenyLocked` if the account was locked, else `DenyInactive`;
/// 2. `failed_attempts > max_attempts`: `DenyLocked`, nothing written;
/// 3. `failed_attempts == max_attempts`: lock, then `DenyInactive`, whatever the
///    password (it is not checked);
/// 4. otherwise the password decides between `RecordSuccess`/`Allow` and
///    `RecordFailure`/`DenyBadCredentials`.
///
/// `password_matches` receives the stored hash.
pub fn evaluate_attempt<F>(identity: &Identity, max_attempts: u32, password_matches: F) -> AttemptVerdict
where
    F: FnOnce(&str) -> bool,
{
    if let Some(verdict) = precheck_attempt(identity, max_attempts) {
        return verdict;
    }

    if password_matches(&identity.password_hash) {
        AttemptVerdict::new(AttemptDecision::Allow, Some(AttemptMutation::RecordSuccess))
    } else {
        AttemptVerdict::new(
            AttemptDecision::DenyBadCredentials,
            Some(AttemptMutation::RecordFailure),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Email, NewIdentity, Role, RoleSet};
    use learnhub_core::IdentityId;
    use proptest::prelude::*;

    fn active_identity(failed_attempts: u32) -> Identity {
        let mut identity = Identity::from_new(NewIdentity {
            id: IdentityId::new(),
            email: Email::parse("gina@example.com").unwrap(),
            password_hash: "right".to_string(),
            firstname: "Gina".to_string(),
            lastname: "Park".to_string(),
            avatar: None,
            roles: RoleSet::single(Role::Student),
            created_at: Utc::now(),
        });
        identity.active = true;
        identity.verified = true;
        identity.failed_attempts = failed_attempts;
        identity
    }

    /// Evaluate and apply, the way a store-backed login does.
    fn attempt(identity: &mut Identity, max: u32, password: &str) -> AttemptDecision {
        let verdict = evaluate_attempt(identity, max, |hash| hash == password);
        if let Some(mutation) = verdict.mutation {
            mutation.apply_to(identity, Utc::now());
        }
        verdict.decision
    }

    #[test]
    fn threshold_scenario() {
        let mut identity = active_identity(4);

        assert_eq!(attempt(&mut identity, 5, "wrong"), AttemptDecision::DenyBadCredentials);
        assert_eq!(identity.failed_attempts, 5);
        assert!(identity.active);

        assert_eq!(attempt(&mut identity, 5, "right"), AttemptDecision::DenyInactive);
        assert!(!identity.active);
        assert!(identity.locked);

        assert_eq!(attempt(&mut identity, 5, "right"), AttemptDecision::DenyLocked);
    }

    #[test]
    fn password_is_not_checked_on_the_locking_attempt() {
        let identity = active_identity(3);
        let verdict = evaluate_attempt(&identity, 3, |_| panic!("password checked"));
        assert_eq!(verdict.mutation, Some(AttemptMutation::Lock));
    }

    #[test]
    fn never_activated_identity_is_inactive_not_locked() {
        let mut identity = active_identity(0);
        identity.active = false;
        let verdict = evaluate_attempt(&identity, 5, |_| true);
        assert_eq!(verdict, AttemptVerdict::new(AttemptDecision::DenyInactive, None));
    }

    #[test]
    fn over_threshold_refuses_without_writing() {
        let identity = active_identity(7);
        let verdict = evaluate_attempt(&identity, 5, |_| true);
        assert_eq!(verdict, AttemptVerdict::new(AttemptDecision::DenyLocked, None));
    }

    #[test]
    fn precheck_leaves_the_password_for_below_threshold_attempts() {
        assert_eq!(precheck_attempt(&active_identity(2), 5), None);
        assert_eq!(
            precheck_attempt(&active_identity(5), 5),
            Some(AttemptVerdict::new(AttemptDecision::DenyInactive, Some(AttemptMutation::Lock)))
        );
    }

    #[test]
    fn verdicts_go_stale_once_the_record_moves() {
        let mut identity = active_identity(2);
        assert!(attempt_is_current(&identity, 2));
        assert!(!attempt_is_current(&identity, 1));

        AttemptMutation::Lock.apply_to(&mut identity, Utc::now());
        assert!(!attempt_is_current(&identity, 2));
    }

    #[test]
    fn success_resets_counter_and_records_login() {
        let mut identity = active_identity(2);
        assert_eq!(attempt(&mut identity, 5, "right"), AttemptDecision::Allow);
        assert_eq!(identity.failed_attempts, 0);
        assert!(identity.last_login.is_some());
    }

    proptest! {
        #[test]
        fn max_consecutive_failures_lock_the_account(max in 1u32..12) {
            let mut identity = active_identity(0);
            for _ in 0..max {
                prop_assert_eq!(attempt(&mut identity, max, "wrong"), AttemptDecision::DenyBadCredentials);
            }
            prop_assert_eq!(attempt(&mut identity, max, "right"), AttemptDecision::DenyInactive);
            prop_assert!(!identity.active);
            prop_assert_ne!(attempt(&mut identity, max, "right"), AttemptDecision::Allow);
        }

        #[test]
        fn any_success_below_threshold_resets(max in 1u32..12, failures in 0u32..12) {
            let failures = failures % max;
            let mut identity = active_identity(0);
            for _ in 0..failures {
                attempt(&mut identity, max, "wrong");
            }
            prop_assert_eq!(attempt(&mut identity, max, "right"), AttemptDecision::Allow);
            prop_assert_eq!(identity.failed_attempts, 0);
        }
    }
}
