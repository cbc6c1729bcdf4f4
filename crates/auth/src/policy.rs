//! Tunable auth policy values.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use learnhub_core::DomainError;

/// Upper bound for every configured lifespan: one hundred years.
pub const MAX_LIFESPAN_HOURS: f64 = 100.0 * 366.0 * 24.0;

/// Convert fractional hours to a duration at millisecond precision.
///
/// Saturates at the bounds of `Duration` instead of panicking.
pub fn hours_to_duration(hours: f64) -> Duration {
    let millis = (hours * 3_600_000.0).round() as i64;
    Duration::milliseconds(millis.max(-i64::MAX))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthPolicy {
    /// Consecutive bad-password attempts tolerated before the account locks.
    pub max_login_attempts: u32,
    pub session_lifespan_hours: f64,
    pub refresh_lifespan_hours: f64,
    /// Lifetime of verification / password-reset secrets, from `created_at`.
    pub security_token_ttl_hours: f64,
    pub min_password_length: usize,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            max_login_attempts: 5,
            session_lifespan_hours: 24.0,
            refresh_lifespan_hours: 168.0,
            security_token_ttl_hours: 24.0,
            min_password_length: 5,
        }
    }
}

impl AuthPolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_login_attempts < 1 {
            return Err(DomainError::validation("MAX_LOGIN_ATTEMPTS must be >= 1"));
        }
        for (name, hours) in [
            ("SESSION_LIFESPAN_HOURS", self.session_lifespan_hours),
            ("REFRESH_LIFESPAN_HOURS", self.refresh_lifespan_hours),
            ("SECURITY_TOKEN_TTL_HOURS", self.security_token_ttl_hours),
        ] {
            if !hours.is_finite() || hours <= 0.0 {
                return Err(DomainError::validation(format!("{name} must be > 0")));
            }
            if hours > MAX_LIFESPAN_HOURS
                || Utc::now().checked_add_signed(hours_to_duration(hours)).is_none()
            {
                return Err(DomainError::validation(format!(
                    "{name} must be at most {MAX_LIFESPAN_HOURS} hours"
                )));
            }
        }
        if hours_to_duration(self.session_lifespan_hours) < Duration::seconds(1) {
            return Err(DomainError::validation("SESSION_LIFESPAN_HOURS is shorter than one second"));
        }
        Ok(())
    }

    pub fn session_lifespan(&self) -> Duration {
        hours_to_duration(self.session_lifespan_hours)
    }

    pub fn refresh_lifespan(&self) -> Duration {
        hours_to_duration(self.refresh_lifespan_hours)
    }

    pub fn security_token_ttl(&self) -> Duration {
        hours_to_duration(self.security_token_ttl_hours)
    }
}
