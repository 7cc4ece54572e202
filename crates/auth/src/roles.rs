use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Entity, RoleId, TenantId, UserId};

/// Role name used for RBAC.
///
/// Roles are opaque strings; only the names listed in a [`RoleHierarchy`]
/// carry a privilege level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const SUPER_ADMIN: Role = Role(Cow::Borrowed("SUPER_ADMIN"));
    pub const COMPANY_ADMIN: Role = Role(Cow::Borrowed("COMPANY_ADMIN"));
    pub const CLIENT: Role = Role(Cow::Borrowed("CLIENT"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role Hierarchy
// ─────────────────────────────────────────────────────────────────────────────

/// Static ranking of role names to privilege levels.
///
/// The table is read-only and handed to the decision engine by reference.
/// Unranked role names resolve to level `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleHierarchy {
    levels: &'static [(&'static str, u8)],
}

static STANDARD: RoleHierarchy = RoleHierarchy::new(&[
    ("SUPER_ADMIN", 3),
    ("COMPANY_ADMIN", 2),
    ("CLIENT", 1),
]);

impl RoleHierarchy {
    pub const fn new(levels: &'static [(&'static str, u8)]) -> Self {
        Self { levels }
    }

    /// SUPER_ADMIN(3) > COMPANY_ADMIN(2) > CLIENT(1).
    pub fn standard() -> &'static RoleHierarchy {
        &STANDARD
    }

    pub fn level_of(&self, role: &str) -> u8 {
        self.levels
            .iter()
            .find(|(name, _)| *name == role)
            .map(|(_, level)| *level)
            .unwrap_or(0)
    }

    /// Highest level over all roles held (`0` if none).
    pub fn max_level<'a>(&self, roles: impl IntoIterator<Item = &'a Role>) -> u8 {
        roles
            .into_iter()
            .map(|r| self.level_of(r.as_str()))
            .max()
            .unwrap_or(0)
    }

    /// True if any held role ranks at or above `required`.
    pub fn has_at_least<'a>(&self, roles: impl IntoIterator<Item = &'a Role>, required: &Role) -> bool {
        self.max_level(roles) >= self.level_of(required.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Role Definition (stored record)
// ─────────────────────────────────────────────────────────────────────────────

/// A stored role definition.
///
/// `tenant_id = None` marks a global definition (e.g. the three built-in
/// roles). `(name, tenant_id)` is unique among non-deleted rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: RoleId,
    pub name: Role,
    pub description: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,
    pub version: u64,
}

impl RoleDefinition {
    pub fn new(name: Role, tenant_id: Option<TenantId>, now: DateTime<Utc>) -> Self {
        Self {
            id: RoleId::new(),
            name,
            description: None,
            tenant_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: None,
            updated_by: None,
            version: 0,
        }
    }

    pub fn is_global(&self) -> bool {
        self.tenant_id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Entity for RoleDefinition {
    type Id = RoleId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn standard_levels() {
        let h = RoleHierarchy::standard();
        assert_eq!(h.level_of("SUPER_ADMIN"), 3);
        assert_eq!(h.level_of("COMPANY_ADMIN"), 2);
        assert_eq!(h.level_of("CLIENT"), 1);
        assert_eq!(h.level_of("AUDITOR"), 0);
    }

    #[test]
    fn max_level_of_nothing_is_zero() {
        let none: Vec<Role> = Vec::new();
        assert_eq!(RoleHierarchy::standard().max_level(&none), 0);
    }

    #[test]
    fn max_level_picks_highest() {
        let roles = vec![Role::CLIENT, Role::new("AUDITOR"), Role::COMPANY_ADMIN];
        assert_eq!(RoleHierarchy::standard().max_level(&roles), 2);
    }

    #[test]
    fn level_lookup_is_case_sensitive() {
        assert_eq!(RoleHierarchy::standard().level_of("super_admin"), 0);
    }

    fn ranked() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("SUPER_ADMIN"), Just("COMPANY_ADMIN"), Just("CLIENT")]
    }

    proptest! {
        #[test]
        fn unranked_names_resolve_to_zero(name in "[a-z_]{1,16}") {
            prop_assert_eq!(RoleHierarchy::standard().level_of(&name), 0);
        }

        #[test]
        fn ranked_names_outrank_unknown(role in ranked(), other in "[a-z]{1,12}") {
            let h = RoleHierarchy::standard();
            prop_assert!(h.level_of(role) > h.level_of(&other));
        }

        #[test]
        fn max_level_bounds_every_member(roles in proptest::collection::vec(ranked(), 0..6)) {
            let h = RoleHierarchy::standard();
            let roles: Vec<Role> = roles.into_iter().map(Role::new).collect();
            let max = h.max_level(&roles);
            for r in &roles {
                prop_assert!(h.level_of(r.as_str()) <= max);
            }
        }
    }
}
