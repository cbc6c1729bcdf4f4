use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use learnhub_core::{DomainError, ValueObject};

/// Role tag granted to an identity.
///
/// The set is closed: unknown tags fail to parse rather than being carried around
/// as opaque strings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Teacher,
    SchoolAdmin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Student, Role::Teacher, Role::SchoolAdmin, Role::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Teacher => "TEACHER",
            Role::SchoolAdmin => "SCHOOL_ADMIN",
            Role::SuperAdmin => "SUPER_ADMIN",
        }
    }

    /// Whether a caller may pick this role for themselves at registration.
    pub fn is_self_assignable(&self) -> bool {
        matches!(self, Role::Student | Role::Teacher)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown role '{s}'")))
    }
}

/// Non-empty set of roles (1–4 tags).
///
/// Serialized as a JSON array; deserialization enforces the same invariants as
/// `RoleSet::try_from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Role>", into = "Vec<Role>")]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub const MAX_ENTRIES: usize = 4;

    pub fn single(role: Role) -> Self {
        Self(BTreeSet::from([role]))
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn contains_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.0.contains(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse raw role tags (e.g. from a request body).
    pub fn parse<S: AsRef<str>>(tags: &[S]) -> Result<Self, DomainError> {
        let roles = tags
            .iter()
            .map(|t| t.as_ref().parse::<Role>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::try_from(roles)
    }

    /// Roles a caller may choose for themselves at registration.
    pub fn ensure_self_assignable(&self) -> Result<(), DomainError> {
        if self.0.iter().all(Role::is_self_assignable) {
            Ok(())
        } else {
            Err(DomainError::validation("roles can only be STUDENT or TEACHER"))
        }
    }
}

impl TryFrom<Vec<Role>> for RoleSet {
    type Error = DomainError;

    fn try_from(value: Vec<Role>) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(DomainError::validation("at least one role is required"));
        }
        if value.len() > Self::MAX_ENTRIES {
            return Err(DomainError::validation(format!(
                "at most {} roles may be given",
                Self::MAX_ENTRIES
            )));
        }
        Ok(Self(value.into_iter().collect()))
    }
}

impl From<RoleSet> for Vec<Role> {
    fn from(value: RoleSet) -> Self {
        value.0.into_iter().collect()
    }
}

impl ValueObject for RoleSet {}
