use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};

use warden_auth::SessionClaims;

use crate::app::dto::ClaimsResponse;

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// Echo the verified claims of the caller.
pub async fn whoami(Extension(claims): Extension<SessionClaims>) -> impl IntoResponse {
    Json(ClaimsResponse::from(claims))
}
