use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use learnhub_auth::{Identity, RelationshipFacts};

// -------------------------
// Request DTOs
// -------------------------

// Requests carrying passwords or token secrets do not derive `Debug`.

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct TokenRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Deserialize)]
pub struct CreatePasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub capability: String,
    #[serde(default)]
    pub teaches_course: bool,
    #[serde(default)]
    pub enrolled_in_course: bool,
    #[serde(default)]
    pub owns_record: bool,
}

impl ExplainQuery {
    pub fn facts(&self) -> RelationshipFacts {
        RelationshipFacts {
            teaches_course: self.teaches_course,
            enrolled_in_course: self.enrolled_in_course,
            owns_record: self.owns_record,
        }
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Public view of an identity. Never includes the password hash.
#[derive(Debug, Serialize)]
pub struct IdentityView {
    pub id: String,
    pub email: String,
    pub firstname: String,
    pub lastname: String,
    pub avatar: Option<String>,
    pub roles: Vec<&'static str>,
    pub active: bool,
    pub verified: bool,
    pub locked: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Identity> for IdentityView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id.to_string(),
            email: identity.email.to_string(),
            firstname: identity.firstname.clone(),
            lastname: identity.lastname.clone(),
            avatar: identity.avatar.clone(),
            roles: identity.roles.iter().map(|r| r.as_str()).collect(),
            active: identity.active,
            verified: identity.verified,
            locked: identity.locked,
            last_login: identity.last_login,
            created_at: identity.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CapabilityView {
    pub name: &'static str,
    pub rule: String,
}
