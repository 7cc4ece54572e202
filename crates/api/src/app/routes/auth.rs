use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use warden_auth::Principal;
use warden_infra::services::ProfileChanges;
use warden_infra::LoginRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Login is the only unauthenticated route under `/auth`.
pub fn public_router() -> Router {
    Router::new().route("/login", post(login))
}

pub fn protected_router() -> Router {
    Router::new()
        .route("/profile", get(get_profile).patch(update_profile))
        .route("/change-password", post(change_password))
}

pub async fn login(
    Extension(app): Extension<Arc<AppServices>>,
    Json(body): Json<LoginRequest>,
) -> axum::response::Response {
    match app.services.sessions.login(&body).await {
        Ok(outcome) => (StatusCode::OK, Json(dto::LoginResponse::from(outcome))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_profile(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> axum::response::Response {
    match app.services.profile.get_profile(principal.subject_id).await {
        Ok(profile) => (StatusCode::OK, Json(dto::ProfileResponse::from(profile))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_profile(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ProfileChanges>,
) -> axum::response::Response {
    match app.services.profile.update_profile(principal.subject_id, body).await {
        Ok(profile) => (StatusCode::OK, Json(dto::ProfileResponse::from(profile))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_password(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<dto::ChangePasswordRequest>,
) -> axum::response::Response {
    let result = app
        .services
        .profile
        .change_password(principal.subject_id, &body.current_password, &body.new_password)
        .await;
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
