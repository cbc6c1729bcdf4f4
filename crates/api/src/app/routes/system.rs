use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn whoami(Extension(principal): Extension<PrincipalContext>) -> impl IntoResponse {
    let claims = principal.claims();
    Json(serde_json::json!({
        "identity_id": principal.identity_id().to_string(),
        "email": claims.email(),
        "firstname": claims.firstname(),
        "lastname": claims.lastname(),
        "roles": claims.roles().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
        "expires_at": claims.expires_at(),
    }))
}
