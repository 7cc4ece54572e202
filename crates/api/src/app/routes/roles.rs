use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use warden_auth::Principal;
use warden_core::RoleId;
use warden_infra::services::{ListQuery, NewRole, RoleChanges};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_role).get(list_roles))
        .route("/:id", get(get_role).patch(update_role).delete(delete_role))
}

pub async fn create_role(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewRole>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::roles_write()) {
        return res;
    }

    match app.services.roles.create(&principal, body).await {
        Ok(account) => (StatusCode::CREATED, Json(dto::RoleResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_roles(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::roles_read()) {
        return res;
    }

    match app.services.roles.list(&principal, &query).await {
        Ok(page) => {
            let body = dto::PageResponse::from_page(page, dto::RoleResponse::from);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_role(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::roles_read()) {
        return res;
    }
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.roles.get(&principal, id).await {
        Ok(account) => (StatusCode::OK, Json(dto::RoleResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_role(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<RoleChanges>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::roles_write()) {
        return res;
    }
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.roles.update(&principal, id, body).await {
        Ok(account) => (StatusCode::OK, Json(dto::RoleResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Soft delete; the role keeps its row with `deleted_at` set.
pub async fn delete_role(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::roles_write()) {
        return res;
    }
    let id: RoleId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.roles.delete(&principal, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
