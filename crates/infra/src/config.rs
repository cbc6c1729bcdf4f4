//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;
use tracing::warn;

use learnhub_auth::AuthPolicy;

const DEV_JWT_SECRET: &str = "learnhub-dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is required")]
    Missing { name: &'static str },

    #[error("{name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Settings {
    pub policy: AuthPolicy,
    pub jwt_secret: String,
    /// Postgres when set, in-memory store otherwise.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
}

impl core::fmt::Debug for Settings {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Settings")
            .field("policy", &self.policy)
            .field("jwt_secret", &"<redacted>")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AuthPolicy::default();
        let policy = AuthPolicy {
            max_login_attempts: parse_or(&lookup, "MAX_LOGIN_ATTEMPTS", defaults.max_login_attempts)?,
            session_lifespan_hours: parse_or(&lookup, "SESSION_LIFESPAN_HOURS", defaults.session_lifespan_hours)?,
            refresh_lifespan_hours: parse_or(&lookup, "REFRESH_LIFESPAN_HOURS", defaults.refresh_lifespan_hours)?,
            security_token_ttl_hours: parse_or(
                &lookup,
                "SECURITY_TOKEN_TTL_HOURS",
                defaults.security_token_ttl_hours,
            )?,
            min_password_length: parse_or(&lookup, "MIN_PASSWORD_LENGTH", defaults.min_password_length)?,
        };
        policy.validate().map_err(|e| ConfigError::Invalid {
            name: "auth policy",
            reason: e.to_string(),
        })?;

        let allow_dev_secret: bool = parse_or(&lookup, "LEARNHUB_ALLOW_DEV_SECRET", false)?;
        let jwt_secret = match non_empty(&lookup, "JWT_SECRET") {
            Some(secret) => secret,
            None if allow_dev_secret => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing { name: "JWT_SECRET" }),
        };

        Ok(Self {
            policy,
            jwt_secret,
            database_url: non_empty(&lookup, "DATABASE_URL"),
            bind_addr: parse_or(&lookup, "BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
        })
    }
}

fn non_empty<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.trim().is_empty())
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: core::fmt::Display,
{
    match non_empty(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(s.policy, AuthPolicy::default());
        assert_eq!(s.bind_addr.port(), 8080);
        assert!(s.database_url.is_none());
    }

    #[test]
    fn fractional_hours_are_accepted() {
        let s = settings(&[("JWT_SECRET", "s3cret"), ("SESSION_LIFESPAN_HOURS", "0.5")]).unwrap();
        assert_eq!(s.policy.session_lifespan(), chrono::Duration::minutes(30));
    }

    #[test]
    fn jwt_secret_is_required_unless_dev_allowed() {
        assert_eq!(
            settings(&[]).err(),
            Some(ConfigError::Missing { name: "JWT_SECRET" })
        );
        let s = settings(&[("LEARNHUB_ALLOW_DEV_SECRET", "true")]).unwrap();
        assert_eq!(s.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn unparseable_values_are_errors_not_defaults() {
        let err = settings(&[("JWT_SECRET", "x"), ("MAX_LOGIN_ATTEMPTS", "five")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "MAX_LOGIN_ATTEMPTS", .. }));
    }

    #[test]
    fn out_of_range_policy_is_rejected() {
        assert!(settings(&[("JWT_SECRET", "x"), ("MAX_LOGIN_ATTEMPTS", "0")]).is_err());
        assert!(settings(&[("JWT_SECRET", "x"), ("SECURITY_TOKEN_TTL_HOURS", "-1")]).is_err());
        assert!(settings(&[("JWT_SECRET", "x"), ("SESSION_LIFESPAN_HOURS", "3.0e9")]).is_err());
    }

    #[test]
    fn debug_redacts_secrets() {
        let s = settings(&[("JWT_SECRET", "hunter2"), ("DATABASE_URL", "postgres://u:pw@db/x")]).unwrap();
        let out = format!("{s:?}");
        assert!(!out.contains("hunter2"));
        assert!(!out.contains("pw@db"));
    }
}
