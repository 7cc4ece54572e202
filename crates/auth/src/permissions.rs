use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Entity, PermissionId};

/// Permission key (e.g. `"MANAGE_USERS"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub const MANAGE_COMPANIES: Permission = Permission(Cow::Borrowed("MANAGE_COMPANIES"));
    pub const VIEW_COMPANIES: Permission = Permission(Cow::Borrowed("VIEW_COMPANIES"));
    pub const MANAGE_USERS: Permission = Permission(Cow::Borrowed("MANAGE_USERS"));
    pub const VIEW_USERS: Permission = Permission(Cow::Borrowed("VIEW_USERS"));
    /// Grants management of accounts holding COMPANY_ADMIN.
    pub const MANAGE_COMPANY_ADMINS: Permission =
        Permission(Cow::Borrowed("MANAGE_COMPANY_ADMINS"));
    pub const VIEW_COMPANY_ADMINS: Permission = Permission(Cow::Borrowed("VIEW_COMPANY_ADMINS"));
    pub const MANAGE_ROLES: Permission = Permission(Cow::Borrowed("MANAGE_ROLES"));
    pub const VIEW_ROLES: Permission = Permission(Cow::Borrowed("VIEW_ROLES"));
    pub const MANAGE_PERMISSIONS: Permission = Permission(Cow::Borrowed("MANAGE_PERMISSIONS"));
    pub const VIEW_PERMISSIONS: Permission = Permission(Cow::Borrowed("VIEW_PERMISSIONS"));

    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The built-in permission catalogue, in display order.
    pub fn catalogue() -> [Permission; 10] {
        [
            Self::MANAGE_COMPANIES,
            Self::VIEW_COMPANIES,
            Self::MANAGE_USERS,
            Self::VIEW_USERS,
            Self::MANAGE_COMPANY_ADMINS,
            Self::VIEW_COMPANY_ADMINS,
            Self::MANAGE_ROLES,
            Self::VIEW_ROLES,
            Self::MANAGE_PERMISSIONS,
            Self::VIEW_PERMISSIONS,
        ]
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored permission definition (unique `key`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDefinition {
    pub id: PermissionId,
    pub key: Permission,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PermissionDefinition {
    pub fn new(key: Permission, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: PermissionId::new(),
            key,
            description,
            created_at: now,
        }
    }
}

impl Entity for PermissionDefinition {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
