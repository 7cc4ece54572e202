//! Resource services: every operation checks access before touching storage.

use std::sync::Arc;

use serde::Deserialize;

use warden_auth::{DecisionEngine, PasswordHasher, TokenSigner};

use crate::error::ServiceError;
use crate::guard::AccessGuard;
use crate::session::{SessionService, SessionSettings};
use crate::store::{Directory, Pagination};

pub mod permissions;
pub mod profile;
pub mod roles;
pub mod tenants;
pub mod users;

pub use permissions::{NewPermission, PermissionService};
pub use profile::{Profile, ProfileChanges, ProfileService};
pub use roles::{NewRole, RoleChanges, RoleDetails, RoleService};
pub use tenants::{NewTenant, TenantChanges, TenantService};
pub use users::{NewUser, UserChanges, UserService};

/// Page/limit/search parameters accepted by every list operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::from_page(self.page, self.limit)
    }
}

/// Every service wired against one directory.
#[derive(Clone)]
pub struct Services {
    pub sessions: SessionService,
    pub guard: AccessGuard,
    pub users: UserService,
    pub roles: RoleService,
    pub tenants: TenantService,
    pub permissions: PermissionService,
    pub profile: ProfileService,
}

impl Services {
    pub fn new(
        directory: Arc<dyn Directory>,
        hasher: Arc<dyn PasswordHasher>,
        signer: Arc<dyn TokenSigner>,
        settings: SessionSettings,
        engine: DecisionEngine,
    ) -> Self {
        let guard = AccessGuard::new(directory.clone(), engine);
        let sessions = SessionService::new(directory.clone(), hasher.clone(), signer, settings);

        Self {
            users: UserService::new(directory.clone(), guard.clone(), hasher),
            roles: RoleService::new(directory.clone(), guard.clone()),
            tenants: TenantService::new(directory.clone(), guard.clone()),
            permissions: PermissionService::new(directory.clone()),
            profile: ProfileService::new(directory, sessions.clone()),
            sessions,
            guard,
        }
    }
}

pub(crate) const USERNAME_MIN: usize = 3;
pub(crate) const USERNAME_MAX: usize = 50;
/// First and last name.
pub(crate) const NAME_MAX: usize = 100;

/// Trimmed, length-checked text field.
pub(crate) fn text_field(field: &str, value: &str, min: usize, max: usize) -> Result<String, ServiceError> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ServiceError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(value.to_string())
}

/// Optional free-text field: blank clears it.
pub(crate) fn optional_text(field: &str, value: Option<String>, max: usize) -> Result<Option<String>, ServiceError> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > max => Err(ServiceError::validation(format!(
            "{field} must be at most {max} characters"
        ))),
        Some(v) => Ok(Some(v)),
    }
}

pub(crate) fn email_field(value: Option<String>) -> Result<Option<String>, ServiceError> {
    let email = optional_text("email", value, 255)?;
    if let Some(e) = &email {
        let valid = e
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
        if !valid {
            return Err(ServiceError::validation("email must be a valid address"));
        }
    }
    Ok(email)
}
