use serde::{Deserialize, Serialize};

use learnhub_core::IdentityId;

use crate::{Identity, RoleSet, SessionClaims};

/// The caller an authorization decision is made for.
///
/// Derived either from a stored identity or from verified session claims; the
/// decider never needs anything else about the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub identity_id: IdentityId,
    pub roles: RoleSet,
}

impl Principal {
    pub fn new(identity_id: IdentityId, roles: RoleSet) -> Self {
        Self { identity_id, roles }
    }
}

impl From<&Identity> for Principal {
    fn from(identity: &Identity) -> Self {
        Self::new(identity.id, identity.roles.clone())
    }
}

impl From<&SessionClaims> for Principal {
    fn from(claims: &SessionClaims) -> Self {
        Self::new(claims.identity_id(), claims.roles().clone())
    }
}
