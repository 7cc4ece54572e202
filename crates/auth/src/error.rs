use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::TokenValidationError;

/// Authentication failure.
///
/// Every variant maps to "unauthorized" at the transport edge. Login never
/// distinguishes an unknown username from a wrong password: both are
/// [`AuthError::InvalidCredentials`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid tenant")]
    InvalidTenant,

    #[error("tenant is deactivated")]
    TenantDeactivated,

    #[error("account is locked; try again after {}", .until.to_rfc3339())]
    AccountLocked { until: DateTime<Utc> },

    #[error("account is deactivated")]
    AccountDeactivated,

    #[error("current password is incorrect")]
    CurrentPasswordIncorrect,

    #[error(transparent)]
    Token(#[from] TokenValidationError),

    #[error("crypto failure: {0}")]
    Crypto(String),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::InvalidTenant => "invalid_tenant",
            AuthError::TenantDeactivated => "tenant_deactivated",
            AuthError::AccountLocked { .. } => "account_locked",
            AuthError::AccountDeactivated => "account_deactivated",
            AuthError::CurrentPasswordIncorrect => "current_password_incorrect",
            AuthError::Token(_) => "invalid_token",
            AuthError::Crypto(_) => "crypto_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn lock_message_surfaces_unlock_time() {
        let until = Utc.with_ymd_and_hms(2025, 3, 1, 12, 15, 0).unwrap();
        let msg = AuthError::AccountLocked { until }.to_string();
        assert!(msg.contains("2025-03-01T12:15:00"), "{msg}");
    }
}
