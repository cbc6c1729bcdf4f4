//! One-way salted password hashing.

use argon2::{Algorithm, Argon2, Params, Version};
use argon2::{PasswordHasher as _, PasswordVerifier as _};
use password_hash::{PasswordHash, SaltString};

use crate::AuthError;

/// Hashing primitive consumed by the orchestrator.
pub trait PasswordHasher: Send + Sync {
    /// Produce a PHC-format hash with a fresh random salt.
    fn hash(&self, password: &str) -> Result<String, AuthError>;

    /// Constant-time verification. Malformed hashes verify as `false`.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Argon2id hasher.
#[derive(Clone)]
pub struct Argon2PasswordHasher {
    argon2: Argon2<'static>,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Minimal-cost parameters for tests and local development only.
    pub fn low_cost() -> Self {
        let params = Params::new(Params::MIN_M_COST, 1, 1, None).unwrap_or_default();
        Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        }
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Argon2PasswordHasher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Argon2PasswordHasher").finish_non_exhaustive()
    }
}

impl PasswordHasher for Argon2PasswordHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes)
            .map_err(|e| AuthError::unavailable(format!("entropy source: {e}")))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| AuthError::unavailable(format!("salt encoding: {e}")))?;
        let phc = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::unavailable(format!("password hashing: {e}")))?
            .to_string();
        Ok(phc)
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon2.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hasher = Argon2PasswordHasher::low_cost();
        let hash = hasher.hash("my@pass@access").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify("my@pass@access", &hash));
        assert!(!hasher.verify("wrong@pass", &hash));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = Argon2PasswordHasher::low_cost();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let hasher = Argon2PasswordHasher::low_cost();
        assert!(!hasher.verify("anything", "not-a-phc-string"));
        assert!(!hasher.verify("anything", ""));
    }
}
