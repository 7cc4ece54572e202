use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use warden_auth::Principal;
use warden_core::TenantId;
use warden_infra::services::{ListQuery, NewTenant, TenantChanges};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_tenant).get(list_tenants))
        .route("/:id", get(get_tenant).patch(update_tenant).delete(deactivate_tenant))
}

pub async fn create_tenant(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewTenant>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::tenants()) {
        return res;
    }

    match app.services.tenants.create(&principal, body).await {
        Ok(account) => (StatusCode::CREATED, Json(dto::TenantResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_tenants(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::tenants()) {
        return res;
    }

    match app.services.tenants.list(&principal, &query).await {
        Ok(page) => {
            let body = dto::PageResponse::from_page(page, dto::TenantResponse::from);
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_tenant(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::tenants()) {
        return res;
    }
    let id: TenantId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.tenants.get(&principal, id).await {
        Ok(account) => (StatusCode::OK, Json(dto::TenantResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_tenant(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(body): Json<TenantChanges>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::tenants()) {
        return res;
    }
    let id: TenantId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.tenants.update(&principal, id, body).await {
        Ok(account) => (StatusCode::OK, Json(dto::TenantResponse::from(account))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// Deactivation blocks logins into the tenant.
pub async fn deactivate_tenant(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::tenants()) {
        return res;
    }
    let id: TenantId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(res) => return res,
    };

    match app.services.tenants.deactivate(&principal, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
