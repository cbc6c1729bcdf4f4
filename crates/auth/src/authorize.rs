//! Authorization decider.
//!
//! Every role and relationship predicate in the system lives here. Callers
//! supply relationship facts as booleans; the decider knows nothing about
//! courses, quizzes or certificates beyond the capability names.
//!
//! - No IO
//! - No panics
//! - Total: every (principal, capability, facts) triple yields a decision

use serde::Serialize;

use crate::{Principal, Role, RoleSet};

/// Facts about the caller's relation to one specific resource.
///
/// Missing facts are treated as `false`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelationshipFacts {
    pub teaches_course: bool,
    pub enrolled_in_course: bool,
    pub owns_record: bool,
}

impl RelationshipFacts {
    pub fn teaching() -> Self {
        Self {
            teaches_course: true,
            ..Self::default()
        }
    }

    pub fn enrolled() -> Self {
        Self {
            enrolled_in_course: true,
            ..Self::default()
        }
    }

    pub fn owner() -> Self {
        Self {
            owns_record: true,
            ..Self::default()
        }
    }

    pub fn holds(&self, relationship: Relationship) -> bool {
        match relationship {
            Relationship::TeachesCourse => self.teaches_course,
            Relationship::EnrolledInCourse => self.enrolled_in_course,
            Relationship::OwnsRecord => self.owns_record,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    TeachesCourse,
    EnrolledInCourse,
    OwnsRecord,
}

impl Relationship {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relationship::TeachesCourse => "teaches_course",
            Relationship::EnrolledInCourse => "enrolled_in_course",
            Relationship::OwnsRecord => "owns_record",
        }
    }
}

/// Shape of a capability's access rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Anyone, authenticated or not.
    Public,
    /// Caller holds at least one of the roles.
    AnyRole(&'static [Role]),
    /// Caller is an admin, or holds at least one of the relationships.
    AdminOr(&'static [Relationship]),
    /// Caller holds one of the roles and the relationship.
    RoleWith(&'static [Role], Relationship),
}

const ADMINS: &[Role] = &[Role::SchoolAdmin, Role::SuperAdmin];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewCourse,
    CreateCourse,
    UpdateCourse,
    DeleteCourse,
    ManageModule,
    ViewModule,
    EnrollInCourse,
    SubmitAssignment,
    ManageQuiz,
    ViewQuiz,
    AttemptQuiz,
    GenerateCertificate,
    ViewCertificate,
    VerifyCertificate,
    ViewEnrollments,
    DeleteEnrollment,
    UpdateIdentity,
    DeleteIdentity,
    UnlockIdentity,
}

impl Capability {
    pub const ALL: [Capability; 19] = [
        Capability::ViewCourse,
        Capability::CreateCourse,
        Capability::UpdateCourse,
        Capability::DeleteCourse,
        Capability::ManageModule,
        Capability::ViewModule,
        Capability::EnrollInCourse,
        Capability::SubmitAssignment,
        Capability::ManageQuiz,
        Capability::ViewQuiz,
        Capability::AttemptQuiz,
        Capability::GenerateCertificate,
        Capability::ViewCertificate,
        Capability::VerifyCertificate,
        Capability::ViewEnrollments,
        Capability::DeleteEnrollment,
        Capability::UpdateIdentity,
        Capability::DeleteIdentity,
        Capability::UnlockIdentity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ViewCourse => "view_course",
            Capability::CreateCourse => "create_course",
            Capability::UpdateCourse => "update_course",
            Capability::DeleteCourse => "delete_course",
            Capability::ManageModule => "manage_module",
            Capability::ViewModule => "view_module",
            Capability::EnrollInCourse => "enroll_in_course",
            Capability::SubmitAssignment => "submit_assignment",
            Capability::ManageQuiz => "manage_quiz",
            Capability::ViewQuiz => "view_quiz",
            Capability::AttemptQuiz => "attempt_quiz",
            Capability::GenerateCertificate => "generate_certificate",
            Capability::ViewCertificate => "view_certificate",
            Capability::VerifyCertificate => "verify_certificate",
            Capability::ViewEnrollments => "view_enrollments",
            Capability::DeleteEnrollment => "delete_enrollment",
            Capability::UpdateIdentity => "update_identity",
            Capability::DeleteIdentity => "delete_identity",
            Capability::UnlockIdentity => "unlock_identity",
        }
    }

    /// Look a capability up by its snake_case name.
    pub fn parse(name: &str) -> Option<Capability> {
        Capability::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn rule(&self) -> Rule {
        use Relationship::*;

        match self {
            Capability::ViewCourse | Capability::VerifyCertificate => Rule::Public,
            Capability::CreateCourse => {
                Rule::AnyRole(&[Role::Teacher, Role::SchoolAdmin, Role::SuperAdmin])
            }
            Capability::DeleteCourse | Capability::UnlockIdentity => Rule::AnyRole(ADMINS),
            Capability::UpdateCourse | Capability::ManageModule | Capability::ManageQuiz => {
                Rule::AdminOr(&[TeachesCourse])
            }
            Capability::ViewModule | Capability::ViewQuiz => {
                Rule::AdminOr(&[TeachesCourse, EnrolledInCourse])
            }
            Capability::EnrollInCourse => Rule::AnyRole(&[Role::Student]),
            Capability::SubmitAssignment | Capability::AttemptQuiz => {
                Rule::RoleWith(&[Role::Student], EnrolledInCourse)
            }
            Capability::GenerateCertificate => Rule::AnyRole(&[Role::Student, Role::Teacher]),
            Capability::ViewCertificate
            | Capability::UpdateIdentity
            | Capability::DeleteIdentity => Rule::AdminOr(&[OwnsRecord]),
            Capability::ViewEnrollments => Rule::AdminOr(&[OwnsRecord, TeachesCourse]),
            Capability::DeleteEnrollment => Rule::AnyRole(&[Role::SuperAdmin]),
        }
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

pub fn is_admin(roles: &RoleSet) -> bool {
    roles.contains_any(ADMINS)
}

pub fn decide(
    principal: &Principal,
    capability: Capability,
    facts: Option<&RelationshipFacts>,
) -> Decision {
    if evaluate(principal, capability.rule(), facts.copied().unwrap_or_default()).is_none() {
        Decision::Allow
    } else {
        Decision::Deny
    }
}

pub fn authorize(
    principal: &Principal,
    capability: Capability,
    facts: Option<&RelationshipFacts>,
) -> bool {
    decide(principal, capability, facts).is_allow()
}

/// `None` when the rule passes, otherwise what was missing.
fn evaluate(principal: &Principal, rule: Rule, facts: RelationshipFacts) -> Option<Missing> {
    let roles = &principal.roles;
    match rule {
        Rule::Public => None,
        Rule::AnyRole(required) => (!roles.contains_any(required)).then_some(Missing::Role(required)),
        Rule::AdminOr(relationships) => {
            if is_admin(roles) || relationships.iter().any(|r| facts.holds(*r)) {
                None
            } else {
                Some(Missing::AdminOrRelationship(relationships))
            }
        }
        Rule::RoleWith(required, relationship) => {
            if !roles.contains_any(required) {
                Some(Missing::Role(required))
            } else if !facts.holds(relationship) {
                Some(Missing::Relationship(relationship))
            } else {
                None
            }
        }
    }
}

enum Missing {
    Role(&'static [Role]),
    Relationship(Relationship),
    AdminOrRelationship(&'static [Relationship]),
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity directory visibility
// ─────────────────────────────────────────────────────────────────────────────

/// Which identities a caller may list.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityVisibility {
    All,
    StudentsOnly,
    SelfOnly,
    Nothing,
}

/// First matching role wins: super admin, then teacher, then student.
pub fn identity_visibility(principal: &Principal) -> IdentityVisibility {
    let roles = &principal.roles;
    if roles.contains(Role::SuperAdmin) {
        IdentityVisibility::All
    } else if roles.contains(Role::Teacher) {
        IdentityVisibility::StudentsOnly
    } else if roles.contains(Role::Student) {
        IdentityVisibility::SelfOnly
    } else {
        IdentityVisibility::Nothing
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation
// ─────────────────────────────────────────────────────────────────────────────

/// Debuggable account of a single decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub capability: Capability,
    pub granted: bool,
    /// Human-readable form of the capability's rule.
    pub rule: String,
    pub roles: Vec<String>,
    pub facts: RelationshipFacts,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    MissingRole,
    MissingRelationship,
}

/// Same decision as [`decide`], with the reason attached.
pub fn explain(
    principal: &Principal,
    capability: Capability,
    facts: Option<&RelationshipFacts>,
) -> AuthorizationExplanation {
    let rule = capability.rule();
    let facts = facts.copied().unwrap_or_default();
    let missing = evaluate(principal, rule, facts);

    AuthorizationExplanation {
        capability,
        granted: missing.is_none(),
        rule: rule.to_string(),
        roles: principal.roles.iter().map(|r| r.as_str().to_string()).collect(),
        facts,
        denial_reason: missing.map(|m| match m {
            Missing::Role(required) => DenialReason {
                kind: DenialKind::MissingRole,
                message: format!("requires one of roles [{}]", role_list(required)),
            },
            Missing::Relationship(relationship) => DenialReason {
                kind: DenialKind::MissingRelationship,
                message: format!("requires relationship '{}'", relationship.as_str()),
            },
            Missing::AdminOrRelationship(relationships) => DenialReason {
                kind: DenialKind::MissingRelationship,
                message: format!(
                    "requires an admin role or one of relationships [{}]",
                    relationship_list(relationships)
                ),
            },
        }),
    }
}

impl core::fmt::Display for Rule {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Rule::Public => f.write_str("public"),
            Rule::AnyRole(roles) => write!(f, "any role of [{}]", role_list(roles)),
            Rule::AdminOr(relationships) => {
                write!(f, "admin or [{}]", relationship_list(relationships))
            }
            Rule::RoleWith(roles, relationship) => {
                write!(f, "any role of [{}] with {}", role_list(roles), relationship.as_str())
            }
        }
    }
}

fn role_list(roles: &[Role]) -> String {
    roles.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ")
}

fn relationship_list(relationships: &[Relationship]) -> String {
    relationships
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
