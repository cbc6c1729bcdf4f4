//! Authorization audit endpoints.
//!
//! Answer "why was this denied?" for the calling principal without touching
//! any protected resource.

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use learnhub_auth::{explain, Capability};

use crate::app::dto::{CapabilityView, ExplainQuery};
use crate::app::errors;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/capabilities", get(list_capabilities))
        .route("/explain", get(explain_decision))
}

/// GET /authz/capabilities - the capability catalogue and each rule
pub async fn list_capabilities() -> axum::response::Response {
    let capabilities: Vec<CapabilityView> = Capability::ALL
        .iter()
        .map(|c| CapabilityView {
            name: c.as_str(),
            rule: c.rule().to_string(),
        })
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "capabilities": capabilities }))).into_response()
}

/// GET /authz/explain?capability=..&teaches_course=..&enrolled_in_course=..&owns_record=..
///
/// Relationship facts are hypothetical inputs; the roles come from the session.
pub async fn explain_decision(
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> axum::response::Response {
    let Some(capability) = Capability::parse(&query.capability) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "unknown_capability",
            format!("unknown capability '{}'", query.capability),
        );
    };

    let facts = query.facts();
    let explanation = explain(principal.principal(), capability, Some(&facts));
    (StatusCode::OK, Json(explanation)).into_response()
}
