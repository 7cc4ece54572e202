//! Authorization decision engine.
//!
//! Pure functions over a requester's [`Principal`] and a target's identity:
//! no IO, no panics, no storage lookups.

use serde::Serialize;
use thiserror::Error;

use warden_core::{TenantId, UserId};

use crate::{Permission, Principal, Role, RoleHierarchy};

/// True iff `roles` contains SUPER_ADMIN.
pub fn is_super_admin(roles: &[Role]) -> bool {
    roles.iter().any(|r| *r == Role::SUPER_ADMIN)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No route predicate matched.
    #[error("insufficient permissions")]
    InsufficientPermissions,

    /// The decision engine denied the operation.
    #[error("access denied: {0}")]
    Denied(DecisionReason),
}

// ─────────────────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────────────────

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    TargetNotFound,
    SelfManagement,
    SuperAdminOverride,
    SuperAdminProtected,
    CrossTenant,
    CompanyAdminPermissionRequired,
    ManagementAllowed,
    SuperAdminRoleReserved,
    InsufficientRoleLevel,
    RoleAssignmentValid,
}

impl core::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let text = match self {
            DecisionReason::TargetNotFound => "target user not found",
            DecisionReason::SelfManagement => "user managing own account",
            DecisionReason::SuperAdminOverride => "SUPER_ADMIN override",
            DecisionReason::SuperAdminProtected => "cannot manage SUPER_ADMIN accounts",
            DecisionReason::CrossTenant => "cross-tenant access not allowed",
            DecisionReason::CompanyAdminPermissionRequired => {
                "MANAGE_COMPANY_ADMINS permission required"
            }
            DecisionReason::ManagementAllowed => "user management allowed",
            DecisionReason::SuperAdminRoleReserved => "only SUPER_ADMIN may assign SUPER_ADMIN",
            DecisionReason::InsufficientRoleLevel => {
                "requester role level too low to assign COMPANY_ADMIN"
            }
            DecisionReason::RoleAssignmentValid => "role assignment valid",
        };
        f.write_str(text)
    }
}

/// Outcome of a decision: allowed/denied plus its reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: DecisionReason,
}

impl AccessDecision {
    pub fn allow(reason: DecisionReason) -> Self {
        Self { allowed: true, reason }
    }

    pub fn deny(reason: DecisionReason) -> Self {
        Self { allowed: false, reason }
    }

    pub fn into_result(self) -> Result<(), AuthzError> {
        if self.allowed {
            Ok(())
        } else {
            Err(AuthzError::Denied(self.reason))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Targets
// ─────────────────────────────────────────────────────────────────────────────

/// The identity facts the engine needs about a target account.
pub trait UserSubject {
    fn subject_id(&self) -> UserId;
    fn tenant_id(&self) -> Option<TenantId>;
    fn roles(&self) -> &[Role];
}

/// A target account resolved from storage (user + assigned role names).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetUser {
    pub id: UserId,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<Role>,
}

impl UserSubject for TargetUser {
    fn subject_id(&self) -> UserId {
        self.id
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl UserSubject for Principal {
    fn subject_id(&self) -> UserId {
        self.subject_id
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    fn roles(&self) -> &[Role] {
        &self.roles
    }
}

impl<T: UserSubject + ?Sized> UserSubject for &T {
    fn subject_id(&self) -> UserId {
        (**self).subject_id()
    }

    fn tenant_id(&self) -> Option<TenantId> {
        (**self).tenant_id()
    }

    fn roles(&self) -> &[Role] {
        (**self).roles()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Decision engine bound to a read-only role hierarchy.
#[derive(Debug, Clone, Copy)]
pub struct DecisionEngine {
    hierarchy: &'static RoleHierarchy,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::standard()
    }
}

impl DecisionEngine {
    pub fn new(hierarchy: &'static RoleHierarchy) -> Self {
        Self { hierarchy }
    }

    pub fn standard() -> Self {
        Self::new(RoleHierarchy::standard())
    }

    pub fn hierarchy(&self) -> &'static RoleHierarchy {
        self.hierarchy
    }

    /// SUPER_ADMIN, or same tenant (two global ids compare equal).
    pub fn can_access_tenant(&self, requester: &Principal, tenant_id: Option<TenantId>) -> bool {
        is_super_admin(&requester.roles) || requester.tenant_id == tenant_id
    }

    pub fn can_manage_company_admins(&self, requester: &Principal) -> bool {
        is_super_admin(&requester.roles) || requester.has_permission(&Permission::MANAGE_COMPANY_ADMINS)
    }

    /// Primary gate for viewing or mutating another account.
    ///
    /// First match wins:
    /// 1. target missing → denied
    /// 2. requester is the target → allowed
    /// 3. requester is SUPER_ADMIN → allowed
    /// 4. target is SUPER_ADMIN → denied
    /// 5. target outside the requester's tenant → denied
    /// 6. target is COMPANY_ADMIN and requester may not manage company admins → denied
    /// 7. allowed
    pub fn can_manage_user<S: UserSubject>(&self, requester: &Principal, target: Option<&S>) -> AccessDecision {
        match target {
            None => AccessDecision::deny(DecisionReason::TargetNotFound),
            Some(target) => self.decide(requester, target),
        }
    }

    /// Viewing shares the management policy.
    pub fn can_view_user<S: UserSubject>(&self, requester: &Principal, target: Option<&S>) -> AccessDecision {
        self.can_manage_user(requester, target)
    }

    /// Keep only the accounts `requester` may manage (rules 2–7).
    pub fn filter_accessible_users<S: UserSubject>(
        &self,
        requester: &Principal,
        users: impl IntoIterator<Item = S>,
    ) -> Vec<S> {
        users
            .into_iter()
            .filter(|u| self.decide(requester, u).allowed)
            .collect()
    }

    /// Reject role grants above the requester's own standing.
    pub fn validate_privilege_escalation(&self, requester: &Principal, target_roles: &[Role]) -> AccessDecision {
        if is_super_admin(&requester.roles) {
            return AccessDecision::allow(DecisionReason::SuperAdminOverride);
        }

        if target_roles.iter().any(|r| *r == Role::SUPER_ADMIN) {
            return AccessDecision::deny(DecisionReason::SuperAdminRoleReserved);
        }

        if target_roles.iter().any(|r| *r == Role::COMPANY_ADMIN)
            && !self.hierarchy.has_at_least(&requester.roles, &Role::COMPANY_ADMIN)
        {
            return AccessDecision::deny(DecisionReason::InsufficientRoleLevel);
        }

        AccessDecision::allow(DecisionReason::RoleAssignmentValid)
    }

    fn decide<S: UserSubject>(&self, requester: &Principal, target: &S) -> AccessDecision {
        if requester.subject_id == target.subject_id() {
            return AccessDecision::allow(DecisionReason::SelfManagement);
        }

        if is_super_admin(&requester.roles) {
            return AccessDecision::allow(DecisionReason::SuperAdminOverride);
        }

        let target_roles = target.roles();

        if is_super_admin(target_roles) {
            return AccessDecision::deny(DecisionReason::SuperAdminProtected);
        }

        if !self.can_access_tenant(requester, target.tenant_id()) {
            return AccessDecision::deny(DecisionReason::CrossTenant);
        }

        if target_roles.iter().any(|r| *r == Role::COMPANY_ADMIN) && !self.can_manage_company_admins(requester) {
            return AccessDecision::deny(DecisionReason::CompanyAdminPermissionRequired);
        }

        AccessDecision::allow(DecisionReason::ManagementAllowed)
    }
}
