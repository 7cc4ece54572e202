use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use warden_core::{TenantId, UserId};

use crate::{Permission, Principal, Role};

/// Session token claims.
///
/// This is the exact content contract of an issued session: subject id,
/// username, tenant id, role names and the permission-key union. Timestamps
/// are unix seconds so the payload is a standard JWT body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user id).
    pub sub: UserId,

    pub username: String,

    /// Tenant context; `None` for global accounts.
    pub tenant_id: Option<TenantId>,

    pub roles: Vec<Role>,

    pub permissions: Vec<Permission>,

    /// Issuer.
    pub iss: String,

    /// Issued-at (unix seconds).
    pub iat: i64,

    /// Expiration (unix seconds).
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,

    #[error("malformed token: {0}")]
    Malformed(String),
}

impl SessionClaims {
    /// Build claims for `principal`, valid for `ttl` from `issued_at`.
    pub fn issue(
        principal: &Principal,
        username: impl Into<String>,
        issuer: impl Into<String>,
        issued_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            sub: principal.subject_id,
            username: username.into(),
            tenant_id: principal.tenant_id,
            roles: principal.roles.clone(),
            permissions: principal.permissions.clone(),
            iss: issuer.into(),
            iat: issued_at.timestamp(),
            exp: (issued_at + ttl).timestamp(),
        }
    }

    /// The immutable requester view of these claims.
    pub fn principal(&self) -> Principal {
        Principal::new(
            self.sub,
            self.tenant_id,
            self.roles.clone(),
            self.permissions.clone(),
        )
    }

    pub fn expires_in_secs(&self) -> i64 {
        self.exp - self.iat
    }
}

/// Deterministically validate the claim time window.
///
/// Signature verification happens in [`crate::jwt`]; this only checks the
/// decoded claims against `now`.
pub fn validate_claims(claims: &SessionClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    let now = now.timestamp();
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn claims(issued_at: DateTime<Utc>, ttl: Duration) -> SessionClaims {
        let principal = Principal::new(
            UserId::new(),
            Some(TenantId::new()),
            vec![Role::COMPANY_ADMIN],
            vec![Permission::MANAGE_USERS, Permission::VIEW_USERS],
        );
        SessionClaims::issue(&principal, "companyadmin", "warden", issued_at, ttl)
    }

    #[test]
    fn issue_carries_principal_content() {
        let c = claims(at(1_700_000_000), Duration::hours(24));
        assert_eq!(c.username, "companyadmin");
        assert_eq!(c.expires_in_secs(), 86_400);

        let p = c.principal();
        assert_eq!(p.subject_id, c.sub);
        assert_eq!(p.tenant_id, c.tenant_id);
        assert_eq!(p.roles, vec![Role::COMPANY_ADMIN]);
        assert!(p.has_permission(&Permission::MANAGE_USERS));
    }

    #[test]
    fn valid_inside_window() {
        let c = claims(at(1_000), Duration::seconds(60));
        assert_eq!(validate_claims(&c, at(1_000)), Ok(()));
        assert_eq!(validate_claims(&c, at(1_059)), Ok(()));
    }

    #[test]
    fn expired_at_exp() {
        let c = claims(at(1_000), Duration::seconds(60));
        assert_eq!(validate_claims(&c, at(1_060)), Err(TokenValidationError::Expired));
    }

    #[test]
    fn not_yet_valid_before_iat() {
        let c = claims(at(1_000), Duration::seconds(60));
        assert_eq!(validate_claims(&c, at(999)), Err(TokenValidationError::NotYetValid));
    }

    #[test]
    fn zero_ttl_is_an_invalid_window() {
        let c = claims(at(1_000), Duration::zero());
        assert_eq!(
            validate_claims(&c, at(1_000)),
            Err(TokenValidationError::InvalidTimeWindow)
        );
    }
}
