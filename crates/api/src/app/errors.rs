use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use warden_auth::AuthzError;
use warden_infra::{ErrorKind, ServiceError};

/// Map a service failure onto the HTTP error contract.
///
/// Forbidden and internal failures are logged with their detail and rendered
/// generically.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let status = status_of(err.kind());
    let message = match (&err, err.kind()) {
        (ServiceError::Forbidden(AuthzError::Denied(reason)), _) => {
            warn!(reason = %reason, "request denied");
            "access denied".to_string()
        }
        (_, ErrorKind::Forbidden) => "insufficient permissions".to_string(),
        (_, ErrorKind::Internal) => {
            error!(error = %err, "request failed");
            "internal server error".to_string()
        }
        _ => err.to_string(),
    };
    json_error(status, err.code(), message)
}

pub fn status_of(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path-embedded identifier.
pub fn parse_id<T: From<Uuid>>(raw: &str) -> Result<T, axum::response::Response> {
    Uuid::parse_str(raw).map(T::from).map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("'{raw}' is not a valid id"),
        )
    })
}
