//! Account lifecycle and session endpoints.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use learnhub_auth::{Registration, TokenSecret};

use crate::app::dto::{
    ChangePasswordRequest, CreatePasswordRequest, EmailRequest, IdentityView, LoginRequest,
    RefreshRequest, TokenRequest,
};
use crate::app::{errors, services::AppServices};
use crate::context::PrincipalContext;

pub fn public_router() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/reinvite", post(reinvite))
        .route("/verify-account", post(verify_account))
        .route("/login", post(login))
        .route("/token/refresh", post(refresh))
        .route("/token/verify", post(verify_token))
        .route("/initiate-password-reset", post(initiate_password_reset))
        .route("/create-password", post(create_password))
}

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<Registration>,
) -> axum::response::Response {
    match services.auth.register(req).await {
        Ok(identity) => (StatusCode::CREATED, Json(IdentityView::from(&identity))).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/reinvite
pub async fn reinvite(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<EmailRequest>,
) -> axum::response::Response {
    match services.auth.reinvite(&req.email).await {
        Ok(()) => errors::json_message("Verification mail sent successfully."),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/verify-account
pub async fn verify_account(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<TokenRequest>,
) -> axum::response::Response {
    let secret = TokenSecret::from_string(req.token);
    match services.auth.verify_account(&secret).await {
        Ok(_) => errors::json_message("Account verification successful"),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<LoginRequest>,
) -> axum::response::Response {
    match services.auth.authenticate(&req.email, &req.password).await {
        Ok(pair) => (StatusCode::OK, Json(pair)).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/token/refresh
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<RefreshRequest>,
) -> axum::response::Response {
    match services.auth.refresh_session(&req.refresh).await {
        Ok(session) => Json(serde_json::json!({
            "access": session.access,
            "access_expires_at": session.access_expires_at,
        }))
        .into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/token/verify
pub async fn verify_token(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<TokenRequest>,
) -> axum::response::Response {
    match services.auth.verify_session(&req.token) {
        Ok(claims) => Json(claims).into_response(),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/initiate-password-reset
pub async fn initiate_password_reset(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<EmailRequest>,
) -> axum::response::Response {
    match services.auth.request_password_reset(&req.email).await {
        Ok(()) => errors::json_message("Password reset link sent to your email"),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/create-password
pub async fn create_password(
    Extension(services): Extension<Arc<AppServices>>,
    Json(req): Json<CreatePasswordRequest>,
) -> axum::response::Response {
    let secret = TokenSecret::from_string(req.token);
    match services.auth.reset_password(&secret, &req.password).await {
        Ok(()) => errors::json_message("Password successfully reset"),
        Err(e) => errors::auth_error_to_response(e),
    }
}

/// POST /auth/change-password (authenticated)
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(req): Json<ChangePasswordRequest>,
) -> axum::response::Response {
    match services
        .auth
        .change_password(principal.identity_id(), &req.old_password, &req.new_password)
        .await
    {
        Ok(()) => errors::json_message("Your password has been updated."),
        Err(e) => errors::auth_error_to_response(e),
    }
}
