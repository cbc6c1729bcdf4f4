//! HS256 session credentials (access + refresh).
//!
//! Minting and verification are pure computation: no store access, no
//! revocation list. Logout is client-side discard.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;

use crate::{validate_claims, AuthPolicy, Identity, SessionClaims, SessionError, TokenUse};

/// Signed credentials handed back by a successful login.
#[derive(Clone, Serialize)]
pub struct SessionPair {
    pub access: String,
    pub refresh: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

impl core::fmt::Debug for SessionPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionPair")
            .field("access_expires_at", &self.access_expires_at)
            .field("refresh_expires_at", &self.refresh_expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    access_lifespan: Duration,
    refresh_lifespan: Duration,
}

impl core::fmt::Debug for SessionIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionIssuer")
            .field("access_lifespan", &self.access_lifespan)
            .field("refresh_lifespan", &self.refresh_lifespan)
            .finish_non_exhaustive()
    }
}

impl SessionIssuer {
    pub fn new(secret: &[u8], policy: &AuthPolicy) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked by `validate_claims` at whole-second precision.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["sub", "iat", "exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            access_lifespan: policy.session_lifespan(),
            refresh_lifespan: policy.refresh_lifespan(),
        }
    }

    pub fn access_lifespan(&self) -> Duration {
        self.access_lifespan
    }

    /// Mint an access/refresh pair. Unverified identities never get credentials.
    pub fn mint(&self, identity: &Identity, now: DateTime<Utc>) -> Result<SessionPair, SessionError> {
        if !identity.verified {
            return Err(SessionError::NotVerified);
        }

        let access = SessionClaims::for_identity(identity, TokenUse::Access, now, self.access_lifespan)?;
        let refresh = SessionClaims::for_identity(identity, TokenUse::Refresh, now, self.refresh_lifespan)?;

        Ok(SessionPair {
            access: self.sign(&access)?,
            refresh: self.sign(&refresh)?,
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    /// Verify an access credential.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        self.verify_use(token, TokenUse::Access, now)
    }

    pub fn verify_refresh(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, SessionError> {
        self.verify_use(token, TokenUse::Refresh, now)
    }

    /// Exchange a live refresh credential for a new access credential.
    pub fn refresh(
        &self,
        refresh_token: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, DateTime<Utc>), SessionError> {
        let claims = self.verify_refresh(refresh_token, now)?;
        let access = claims.reissue_access(now, self.access_lifespan)?;
        Ok((self.sign(&access)?, access.expires_at()))
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    fn verify_use(
        &self,
        token: &str,
        expected: TokenUse,
        now: DateTime<Utc>,
    ) -> Result<SessionClaims, SessionError> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &self.validation)
            .map_err(|_| SessionError::Invalid)?;
        let claims = data.claims;
        if claims.token_use() != expected {
            return Err(SessionError::Invalid);
        }
        validate_claims(&claims, now)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Email, NewIdentity, Role, RoleSet};
    use learnhub_core::IdentityId;

    fn policy(hours: f64) -> AuthPolicy {
        AuthPolicy {
            session_lifespan_hours: hours,
            ..AuthPolicy::default()
        }
    }

    fn verified_identity() -> Identity {
        let mut identity = Identity::from_new(NewIdentity {
            id: IdentityId::new(),
            email: Email::parse("frank@example.com").unwrap(),
            password_hash: String::new(),
            firstname: "Frank".to_string(),
            lastname: "Ocean".to_string(),
            avatar: None,
            roles: RoleSet::single(Role::Student),
            created_at: Utc::now(),
        });
        identity.verified = true;
        identity.active = true;
        identity
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn unverified_identity_cannot_mint() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(24.0));
        let mut identity = verified_identity();
        identity.verified = false;
        assert_eq!(
            issuer.mint(&identity, Utc::now()).err(),
            Some(SessionError::NotVerified)
        );
    }

    #[test]
    fn unrepresentable_lifespan_fails_instead_of_minting() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(3.0e9));
        assert_eq!(
            issuer.mint(&verified_identity(), Utc::now()).err(),
            Some(SessionError::LifespanOverflow)
        );
    }

    #[test]
    fn access_credential_valid_until_lifespan_boundary() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(1.5));
        let identity = verified_identity();
        let t = at(1_700_000_000);
        let pair = issuer.mint(&identity, t).unwrap();

        let claims = issuer.verify(&pair.access, t).unwrap();
        assert_eq!(claims.identity_id(), identity.id);
        assert_eq!(pair.access_expires_at, t + Duration::minutes(90));

        assert!(issuer.verify(&pair.access, t + Duration::minutes(90) - Duration::seconds(1)).is_ok());
        assert_eq!(
            issuer.verify(&pair.access, t + Duration::minutes(90)).err(),
            Some(SessionError::Expired)
        );
    }

    #[test]
    fn tampered_or_foreign_credentials_are_invalid() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(24.0));
        let other = SessionIssuer::new(b"other-secret", &policy(24.0));
        let pair = issuer.mint(&verified_identity(), Utc::now()).unwrap();

        assert_eq!(other.verify(&pair.access, Utc::now()).err(), Some(SessionError::Invalid));
        assert_eq!(issuer.verify("not-a-jwt", Utc::now()).err(), Some(SessionError::Invalid));

        let mut tampered = pair.access.clone();
        tampered.push('x');
        assert_eq!(issuer.verify(&tampered, Utc::now()).err(), Some(SessionError::Invalid));
    }

    #[test]
    fn access_and_refresh_are_not_interchangeable() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(24.0));
        let pair = issuer.mint(&verified_identity(), Utc::now()).unwrap();

        assert_eq!(issuer.verify(&pair.refresh, Utc::now()).err(), Some(SessionError::Invalid));
        assert_eq!(
            issuer.verify_refresh(&pair.access, Utc::now()).err(),
            Some(SessionError::Invalid)
        );
        assert!(issuer.refresh(&pair.access, Utc::now()).is_err());
    }

    #[test]
    fn refresh_mints_a_new_access_credential() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(1.0));
        let identity = verified_identity();
        let t = at(1_700_000_000);
        let pair = issuer.mint(&identity, t).unwrap();

        let later = t + Duration::hours(5);
        assert_eq!(issuer.verify(&pair.access, later).err(), Some(SessionError::Expired));

        let (access, expires_at) = issuer.refresh(&pair.refresh, later).unwrap();
        assert_eq!(expires_at, later + Duration::hours(1));
        let claims = issuer.verify(&access, later).unwrap();
        assert_eq!(claims.identity_id(), identity.id);
        assert_eq!(claims.email(), "frank@example.com");
    }

    #[test]
    fn expired_refresh_credential_is_rejected() {
        let issuer = SessionIssuer::new(b"test-secret", &AuthPolicy::default());
        let t = at(1_700_000_000);
        let pair = issuer.mint(&verified_identity(), t).unwrap();
        assert_eq!(
            issuer.refresh(&pair.refresh, t + Duration::hours(168)).err(),
            Some(SessionError::Expired)
        );
    }

    #[test]
    fn debug_does_not_print_credentials() {
        let issuer = SessionIssuer::new(b"test-secret", &policy(24.0));
        let pair = issuer.mint(&verified_identity(), Utc::now()).unwrap();
        let out = format!("{pair:?}");
        assert!(!out.contains(&pair.access));
    }
}
