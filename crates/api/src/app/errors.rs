use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use learnhub_auth::AuthError;

pub fn auth_error_to_response(err: AuthError) -> axum::response::Response {
    let status = match &err {
        AuthError::Validation(_) => StatusCode::BAD_REQUEST,
        AuthError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
        AuthError::TokenInvalid => StatusCode::BAD_REQUEST,
        AuthError::NotFound => StatusCode::NOT_FOUND,
        AuthError::Conflict(_) => StatusCode::CONFLICT,
        AuthError::Forbidden => StatusCode::FORBIDDEN,
        AuthError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    let message = match &err {
        AuthError::Validation(msg) | AuthError::Conflict(msg) => msg.clone(),
        AuthError::Unavailable(detail) => {
            tracing::error!(detail = %detail, "backend unavailable");
            "service temporarily unavailable".to_string()
        }
        other => other.to_string(),
    };

    json_error(status, err.code(), message)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// `{ "success": true, "message": ... }` with 200.
pub fn json_message(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::OK,
        axum::Json(json!({
            "success": true,
            "message": message.into(),
        })),
    )
        .into_response()
}
