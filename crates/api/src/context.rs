use learnhub_auth::{Principal, SessionClaims};
use learnhub_core::IdentityId;

/// Principal context for a request (verified session claims + derived principal).
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    principal: Principal,
    claims: SessionClaims,
}

impl PrincipalContext {
    pub fn new(claims: SessionClaims) -> Self {
        Self {
            principal: Principal::from(&claims),
            claims,
        }
    }

    pub fn identity_id(&self) -> IdentityId {
        self.principal.identity_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn claims(&self) -> &SessionClaims {
        &self.claims
    }
}
