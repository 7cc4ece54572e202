//! Service-level error model.

use thiserror::Error;

use warden_auth::{AuthError, AuthzError};
use warden_core::DomainError;

use crate::store::StoreError;

/// Error returned by every service operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error(transparent)]
    Forbidden(#[from] AuthzError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transport-neutral classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Internal,
}

impl ServiceError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::Domain(DomainError::not_found(entity))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::conflict(msg))
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthorized(AuthError::Crypto(_)) => ErrorKind::Internal,
            ServiceError::Unauthorized(_) => ErrorKind::Unauthorized,
            ServiceError::Forbidden(_) => ErrorKind::Forbidden,
            ServiceError::Domain(e) => match e {
                DomainError::NotFound(_) => ErrorKind::NotFound,
                DomainError::Conflict(_) => ErrorKind::Conflict,
                DomainError::Validation(_) | DomainError::InvalidId(_) | DomainError::InvariantViolation(_) => {
                    ErrorKind::Validation
                }
            },
            ServiceError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::Conflict(_) | StoreError::Concurrency(_) => ErrorKind::Conflict,
                StoreError::Backend(_) => ErrorKind::Internal,
            },
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized(e) => e.code(),
            ServiceError::Forbidden(AuthzError::InsufficientPermissions) => "insufficient_permissions",
            ServiceError::Forbidden(AuthzError::Denied(_)) => "access_denied",
            ServiceError::Domain(DomainError::InvalidId(_)) => "invalid_id",
            ServiceError::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            ServiceError::Store(StoreError::Concurrency(_)) => "concurrency_conflict",
            _ => match self.kind() {
                ErrorKind::NotFound => "not_found",
                ErrorKind::Conflict => "conflict",
                ErrorKind::Validation => "validation_error",
                ErrorKind::Internal => "internal_error",
                ErrorKind::Unauthorized => "unauthorized",
                ErrorKind::Forbidden => "forbidden",
            },
        }
    }
}
