use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use learnhub_core::{IdentityId, ValueObject};

use crate::{Identity, RoleSet};

/// Which half of a session pair a credential is.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

/// Session credential claims.
///
/// Built in one step from a finalised identity snapshot; there are no setters.
/// `iat` / `exp` are JWT NumericDate seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    sub: IdentityId,
    email: String,
    firstname: String,
    lastname: String,
    roles: RoleSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    token_use: TokenUse,
    jti: Uuid,
    iat: i64,
    exp: i64,
}

impl SessionClaims {
    /// `issued_at` is truncated to whole seconds; `exp = iat + lifespan`.
    pub fn for_identity(
        identity: &Identity,
        token_use: TokenUse,
        issued_at: DateTime<Utc>,
        lifespan: Duration,
    ) -> Result<Self, SessionError> {
        let (iat, exp) = window(issued_at, lifespan)?;
        Ok(Self {
            sub: identity.id,
            email: identity.email.as_str().to_string(),
            firstname: identity.firstname.clone(),
            lastname: identity.lastname.clone(),
            roles: identity.roles.clone(),
            image: identity.avatar.clone(),
            token_use,
            jti: Uuid::now_v7(),
            iat,
            exp,
        })
    }

    /// A fresh access credential carrying the same identity claims.
    pub fn reissue_access(
        &self,
        issued_at: DateTime<Utc>,
        lifespan: Duration,
    ) -> Result<Self, SessionError> {
        let (iat, exp) = window(issued_at, lifespan)?;
        Ok(Self {
            token_use: TokenUse::Access,
            jti: Uuid::now_v7(),
            iat,
            exp,
            ..self.clone()
        })
    }

    pub fn identity_id(&self) -> IdentityId {
        self.sub
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn firstname(&self) -> &str {
        &self.firstname
    }

    pub fn lastname(&self) -> &str {
        &self.lastname
    }

    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn token_use(&self) -> TokenUse {
        self.token_use
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.iat, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

impl ValueObject for SessionClaims {}

/// `(iat, exp)` in whole seconds.
fn window(issued_at: DateTime<Utc>, lifespan: Duration) -> Result<(i64, i64), SessionError> {
    let iat = issued_at.timestamp();
    let exp = DateTime::<Utc>::from_timestamp(iat, 0)
        .unwrap_or(issued_at)
        .checked_add_signed(lifespan)
        .ok_or(SessionError::LifespanOverflow)?
        .timestamp();
    Ok((iat, exp))
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("credential has expired")]
    Expired,

    /// Bad signature, malformed token, wrong token use, or impossible time window.
    #[error("invalid credential")]
    Invalid,

    #[error("account not verified")]
    NotVerified,

    #[error("credential signing failed: {0}")]
    Signing(String),

    /// The configured lifespan runs past the representable time range.
    #[error("credential lifespan out of range")]
    LifespanOverflow,
}

/// Deterministically validate session claims against `now`.
///
/// Valid on `[issued_at, expires_at)`. Signature verification happens in
/// `SessionIssuer`; this checks the time window only.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), SessionError> {
    if claims.exp <= claims.iat {
        return Err(SessionError::Invalid);
    }
    if now < claims.issued_at() {
        return Err(SessionError::Invalid);
    }
    if now >= claims.expires_at() {
        return Err(SessionError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Email, NewIdentity, Role};

    fn identity() -> Identity {
        Identity::from_new(NewIdentity {
            id: IdentityId::new(),
            email: Email::parse("erin@example.com").unwrap(),
            password_hash: String::new(),
            firstname: "Erin".to_string(),
            lastname: "Stone".to_string(),
            avatar: Some("users/erin.png".to_string()),
            roles: RoleSet::single(Role::Teacher),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn window_is_half_open() {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let claims = SessionClaims::for_identity(&identity(), TokenUse::Access, t, Duration::hours(24)).unwrap();

        assert_eq!(validate_claims(&claims, t), Ok(()));
        assert_eq!(validate_claims(&claims, t + Duration::hours(22)), Ok(()));
        assert_eq!(
            validate_claims(&claims, t + Duration::hours(24) - Duration::milliseconds(1)),
            Ok(())
        );
        assert_eq!(
            validate_claims(&claims, t + Duration::hours(24)),
            Err(SessionError::Expired)
        );
        assert_eq!(
            validate_claims(&claims, t - Duration::seconds(1)),
            Err(SessionError::Invalid)
        );
    }

    #[test]
    fn issue_time_is_truncated_to_seconds() {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 750_000_000).unwrap();
        let claims = SessionClaims::for_identity(&identity(), TokenUse::Access, t, Duration::minutes(90)).unwrap();
        assert_eq!(claims.issued_at().timestamp_subsec_nanos(), 0);
        assert_eq!(claims.expires_at() - claims.issued_at(), Duration::minutes(90));
    }

    #[test]
    fn claims_carry_identity_fields() {
        let identity = identity();
        let claims = SessionClaims::for_identity(&identity, TokenUse::Refresh, Utc::now(), Duration::hours(1)).unwrap();
        assert_eq!(claims.identity_id(), identity.id);
        assert_eq!(claims.email(), "erin@example.com");
        assert_eq!(claims.firstname(), "Erin");
        assert_eq!(claims.lastname(), "Stone");
        assert!(claims.roles().contains(Role::Teacher));
        assert_eq!(claims.image(), Some("users/erin.png"));
        assert_eq!(claims.token_use(), TokenUse::Refresh);
    }

    #[test]
    fn reissue_keeps_identity_claims_and_switches_use() {
        let t = Utc::now();
        let refresh = SessionClaims::for_identity(&identity(), TokenUse::Refresh, t, Duration::hours(168)).unwrap();
        let access = refresh.reissue_access(t + Duration::hours(1), Duration::hours(24)).unwrap();
        assert_eq!(access.token_use(), TokenUse::Access);
        assert_eq!(access.identity_id(), refresh.identity_id());
        assert_eq!(access.roles(), refresh.roles());
        assert_eq!(access.expires_at() - access.issued_at(), Duration::hours(24));
    }

    #[test]
    fn lifespan_past_the_time_range_is_an_error() {
        let huge = Duration::hours(3_000_000_000);
        assert_eq!(
            SessionClaims::for_identity(&identity(), TokenUse::Access, Utc::now(), huge),
            Err(SessionError::LifespanOverflow)
        );

        let t = Utc::now();
        let refresh = SessionClaims::for_identity(&identity(), TokenUse::Refresh, t, Duration::hours(1)).unwrap();
        assert_eq!(refresh.reissue_access(t, huge), Err(SessionError::LifespanOverflow));
    }
}
