use axum::{routing::get, Router};

pub mod auth;
pub mod permissions;
pub mod roles;
pub mod system;
pub mod tenants;
pub mod users;

/// Router for all authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/auth", auth::protected_router())
        .nest("/users", users::router())
        .nest("/roles", roles::router())
        .nest("/tenants", tenants::router())
        .nest("/permissions", permissions::router())
}
