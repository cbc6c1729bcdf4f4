//! `learnhub-auth`: pure identity, authentication and authorization domain.
//!
//! This crate has no HTTP or storage dependencies. It owns the
//! decisions (lockout, token expiry, session signing, role/relationship
//! authorization); `learnhub-infra` owns the side effects.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod identity;
pub mod lockout;
pub mod password;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod security_token;
pub mod session;

pub use authorize::{
    authorize, decide, explain, identity_visibility, is_admin, AuthorizationExplanation,
    Capability, Decision, DenialKind, DenialReason, IdentityVisibility, Relationship,
    RelationshipFacts, Rule,
};
pub use claims::{validate_claims, SessionClaims, SessionError, TokenUse};
pub use error::{AuthError, AuthResult};
pub use identity::{
    validate_password, Email, Identity, IdentityPatch, NewIdentity, Registration,
    ValidatedRegistration,
};
pub use lockout::{
    attempt_is_current, evaluate_attempt, precheck_attempt, AttemptDecision, AttemptMutation,
    AttemptVerdict,
};
pub use password::{Argon2PasswordHasher, PasswordHasher};
pub use policy::{hours_to_duration, AuthPolicy, MAX_LIFESPAN_HOURS};
pub use principal::Principal;
pub use roles::{Role, RoleSet};
pub use security_token::{SecurityToken, SecurityTokenError, TokenKind, TokenSecret};
pub use session::{SessionIssuer, SessionPair};
