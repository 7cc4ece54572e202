//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: storage backend, hasher, signer and service wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use warden_infra::config::AppConfig;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, BootstrapError};

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, BootstrapError> {
    let app = services::build_services(config).await?;
    Ok(router(app))
}

/// Router over already-wired services.
pub fn router(app: AppServices) -> Router {
    let auth_state = middleware::AuthState {
        verifier: app.verifier.clone(),
    };
    let app = Arc::new(app);

    // Protected routes: require a verified bearer token.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    let api = Router::new()
        .nest("/auth", routes::auth::public_router())
        .merge(protected)
        .layer(Extension(app));

    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api/v1", api)
        .layer(ServiceBuilder::new().layer(axum::middleware::from_fn(middleware::audit_middleware)))
}
