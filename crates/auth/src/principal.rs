use serde::{Deserialize, Serialize};

use warden_core::{TenantId, UserId};

use crate::{Permission, Role};

/// An authenticated requester, derived per request from verified claims.
///
/// Immutable once built; `tenant_id = None` means the global (super) tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject_id: UserId,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(
        subject_id: UserId,
        tenant_id: Option<TenantId>,
        roles: Vec<Role>,
        permissions: Vec<Permission>,
    ) -> Self {
        Self {
            subject_id,
            tenant_id,
            roles,
            permissions,
        }
    }

    pub fn has_role(&self, role: &Role) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }
}
