use axum::{
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod authz;
pub mod system;
pub mod users;

/// Router for endpoints reachable without a session credential.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .nest("/auth", auth::public_router())
}

/// Router for all authenticated endpoints.
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route("/auth/change-password", post(auth::change_password))
        .nest("/users", users::router())
        .nest("/authz", authz::router())
}
