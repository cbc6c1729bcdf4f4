//! Identity directory and administration.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};

use learnhub_core::IdentityId;

use crate::app::dto::IdentityView;
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_identities))
        .route("/:id", delete(delete_identity))
        .route("/:id/unlock", post(unlock_identity))
}

/// GET /users - identities visible to the caller
pub async fn list_identities(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.auth.list_identities(principal.principal()).await {
        Ok(identities) => {
            let items: Vec<IdentityView> = identities.iter().map(IdentityView::from).collect();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// DELETE /users/:id
pub async fn delete_identity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let target = match parse_identity_id(&id) {
        Ok(target) => target,
        Err(resp) => return resp,
    };

    match services.auth.delete_identity(principal.principal(), target).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /users/:id/unlock
pub async fn unlock_identity(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let target = match parse_identity_id(&id) {
        Ok(target) => target,
        Err(resp) => return resp,
    };

    match services.auth.unlock_identity(principal.principal(), target).await {
        Ok(identity) => (StatusCode::OK, Json(IdentityView::from(&identity))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

fn parse_identity_id(raw: &str) -> Result<IdentityId, axum::response::Response> {
    raw.parse::<IdentityId>().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid identity id")
    })
}
