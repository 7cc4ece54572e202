use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use warden_auth::Principal;
use warden_core::UserId;
use warden_infra::services::{ListQuery, NewUser, UserChanges};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_user).get(list_users))
        .route("/:id", get(get_user).patch(update_user).delete(deactivate_user))
}

pub async fn create_user(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewUser>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::users()) {
        return res;
    }

    match app.services.users.create(&principal, body).await {
        Ok(account) => (StatusCode::CREATED, Json(dto::UserResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_users(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::users()) {
        return res;
    }

    match app.services.users.list(&principal, &query).await {
        Ok(page) => {
            let body = dto::PageResponse::from_page(page, dto::UserResponse::from);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_user(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::users()) {
        return res;
    }
    let id: UserId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.users.get(&principal, id).await {
        Ok(account) => (StatusCode::OK, Json(dto::UserResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_user(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<UserChanges>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::users()) {
        return res;
    }
    let id: UserId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.users.update(&principal, id, body).await {
        Ok(account) => (StatusCode::OK, Json(dto::UserResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Users are deactivated, never removed.
pub async fn deactivate_user(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::users()) {
        return res;
    }
    let id: UserId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.users.deactivate(&principal, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
