use std::sync::Arc;

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use warden_auth::Principal;
use warden_infra::services::NewPermission;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new().route("/", get(list_permissions).post(create_permission))
}

pub async fn list_permissions(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::permissions_read()) {
        return res;
    }

    match app.services.permissions.list().await {
        Ok(defs) => {
            let permissions: Vec<dto::PermissionResponse> =
                defs.into_iter().map(dto::PermissionResponse::from).collect();
            (StatusCode::OK, Json(serde_json::json!({ "permissions": permissions }))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn create_permission(
    Extension(app): Extension<Arc<AppServices>>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<NewPermission>,
) -> axum::response::Response {
    if let Err(res) = authz::require(&app.services, &principal, &authz::permissions_write()) {
        return res;
    }

    match app.services.permissions.create(body).await {
        Ok(def) => (StatusCode::CREATED, Json(dto::PermissionResponse::from(def))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}
