//! Identity records and the registration input that creates them.
//!
//! An `Identity` is a plain record: the lockout guard and the orchestrator decide
//! how its flags change, the credential store persists those changes atomically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnhub_core::{DomainError, Entity, IdentityId, ValueObject};

use crate::{AuthError, AuthPolicy, RoleSet};

// ─────────────────────────────────────────────────────────────────────────────
// Email
// ─────────────────────────────────────────────────────────────────────────────

/// Normalised (trimmed, lowercase) e-mail address.
///
/// Uniqueness is case-insensitive because every stored address goes through here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();
        let Some((local, domain)) = normalized.split_once('@') else {
            return Err(DomainError::validation("invalid email format"));
        };
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(DomainError::validation("invalid email format"));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ValueObject for Email {}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// A registered account.
///
/// # Invariants
/// - `roles` is never empty and only holds known tags (enforced by `RoleSet`).
/// - `verified` and `active` start false and flip to true by consuming an
///   account-verification token.
/// - `locked` implies `!active`.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: IdentityId,
    pub email: Email,
    pub password_hash: String,
    pub firstname: String,
    pub lastname: String,
    pub avatar: Option<String>,
    pub roles: RoleSet,
    pub active: bool,
    pub verified: bool,
    pub locked: bool,
    pub failed_attempts: u32,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Identity {
    /// Materialise a freshly registered identity (inactive, unverified, no failures).
    pub fn from_new(new: NewIdentity) -> Self {
        Self {
            id: new.id,
            email: new.email,
            password_hash: new.password_hash,
            firstname: new.firstname,
            lastname: new.lastname,
            avatar: new.avatar,
            roles: new.roles,
            active: false,
            verified: false,
            locked: false,
            failed_attempts: 0,
            last_login: None,
            created_at: new.created_at,
            updated_at: new.created_at,
        }
    }

    pub fn fullname(&self) -> String {
        format!("{} {}", self.firstname, self.lastname).trim().to_string()
    }
}

impl Entity for Identity {
    type Id = IdentityId;

    fn id(&self) -> Self::Id {
        self.id
    }
}

// Hand-written so the password hash never reaches logs.
impl core::fmt::Debug for Identity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("password_hash", &"<redacted>")
            .field("roles", &self.roles)
            .field("active", &self.active)
            .field("verified", &self.verified)
            .field("locked", &self.locked)
            .field("failed_attempts", &self.failed_attempts)
            .field("last_login", &self.last_login)
            .finish()
    }
}

/// Validated data for inserting a new identity.
#[derive(Clone)]
pub struct NewIdentity {
    pub id: IdentityId,
    pub email: Email,
    pub password_hash: String,
    pub firstname: String,
    pub lastname: String,
    pub avatar: Option<String>,
    pub roles: RoleSet,
    pub created_at: DateTime<Utc>,
}

/// Partial update of an identity's mutable fields.
///
/// `None` leaves a field untouched. The failure counter can only be reset here;
/// increments go through the store's atomic login-attempt operation.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct IdentityPatch {
    pub password_hash: Option<String>,
    pub active: Option<bool>,
    pub verified: Option<bool>,
    pub locked: Option<bool>,
    pub reset_failed_attempts: bool,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub avatar: Option<Option<String>>,
}

impl core::fmt::Debug for IdentityPatch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IdentityPatch")
            .field("password_hash", &self.password_hash.as_ref().map(|_| "<redacted>"))
            .field("active", &self.active)
            .field("verified", &self.verified)
            .field("locked", &self.locked)
            .field("reset_failed_attempts", &self.reset_failed_attempts)
            .field("firstname", &self.firstname)
            .field("lastname", &self.lastname)
            .field("avatar", &self.avatar)
            .finish()
    }
}

impl IdentityPatch {
    pub fn password_hash(hash: impl Into<String>) -> Self {
        Self {
            password_hash: Some(hash.into()),
            ..Default::default()
        }
    }

    /// Account verification: both flags flip together.
    pub fn verified_and_active() -> Self {
        Self {
            active: Some(true),
            verified: Some(true),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, identity: &mut Identity, at: DateTime<Utc>) {
        if let Some(hash) = &self.password_hash {
            identity.password_hash = hash.clone();
        }
        if let Some(active) = self.active {
            identity.active = active;
        }
        if let Some(verified) = self.verified {
            identity.verified = verified;
        }
        if let Some(locked) = self.locked {
            identity.locked = locked;
        }
        if self.reset_failed_attempts {
            identity.failed_attempts = 0;
        }
        if let Some(firstname) = &self.firstname {
            identity.firstname = firstname.clone();
        }
        if let Some(lastname) = &self.lastname {
            identity.lastname = lastname.clone();
        }
        if let Some(avatar) = &self.avatar {
            identity.avatar = avatar.clone();
        }
        identity.updated_at = at;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

/// Self-service registration request.
#[derive(Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub roles: Vec<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Registration input after validation; the password is still plaintext and is
/// hashed by the caller.
pub struct ValidatedRegistration {
    pub email: Email,
    pub firstname: String,
    pub lastname: String,
    pub roles: RoleSet,
    pub avatar: Option<String>,
}

impl Registration {
    pub fn validate(&self, policy: &AuthPolicy) -> Result<ValidatedRegistration, AuthError> {
        let email = Email::parse(&self.email)?;

        if self.firstname.trim().is_empty() {
            return Err(AuthError::validation("firstname is required"));
        }
        if self.lastname.trim().is_empty() {
            return Err(AuthError::validation("lastname is required"));
        }
        validate_password(&self.password, policy)?;

        let roles = RoleSet::parse(&self.roles)?;
        roles.ensure_self_assignable()?;

        Ok(ValidatedRegistration {
            email,
            firstname: self.firstname.trim().to_string(),
            lastname: self.lastname.trim().to_string(),
            roles,
            avatar: self.avatar.clone(),
        })
    }
}

impl core::fmt::Debug for Registration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("roles", &self.roles)
            .finish_non_exhaustive()
    }
}

/// Password acceptance rule shared by registration, reset and change.
pub fn validate_password(password: &str, policy: &AuthPolicy) -> Result<(), AuthError> {
    if password.chars().count() < policy.min_password_length {
        return Err(AuthError::validation(format!(
            "password must be at least {} characters",
            policy.min_password_length
        )));
    }
    Ok(())
}
