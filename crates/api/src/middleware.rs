use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, info, warn};

use warden_auth::TokenVerifier;
use warden_core::UserId;

use crate::app::errors::json_error;

#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
}

/// Subject of an authenticated request, echoed on the response for the audit log.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AuditSubject(pub UserId);

/// Verify the bearer token and attach the caller's claims and principal.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers())
        .ok_or_else(|| json_error(StatusCode::UNAUTHORIZED, "unauthorized", "missing bearer token"))?;

    let claims = state.verifier.verify(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "token rejected");
        json_error(StatusCode::UNAUTHORIZED, "invalid_token", e.to_string())
    })?;

    let subject = claims.sub;
    req.extensions_mut().insert(claims.principal());
    req.extensions_mut().insert(claims);

    let mut response = next.run(req).await;
    response.extensions_mut().insert(AuditSubject(subject));
    Ok(response)
}

/// One `audit` line per request.
pub async fn audit_middleware(req: axum::http::Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status();
    let principal = response
        .extensions()
        .get::<AuditSubject>()
        .map(|s| s.0.to_string())
        .unwrap_or_else(|| "anonymous".to_string());
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_client_error() || status.is_server_error() {
        warn!(target: "audit", %method, %path, status = status.as_u16(), %principal, elapsed_ms, "request");
    } else {
        info!(target: "audit", %method, %path, status = status.as_u16(), %principal, elapsed_ms, "request");
    }
    response
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
    }

    #[test]
    fn other_schemes_and_blank_tokens_are_ignored() {
        assert_eq!(extract_bearer(&headers("Basic dXNlcg==")), None);
        assert_eq!(extract_bearer(&headers("Bearer   ")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
