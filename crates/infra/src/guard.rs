//! Per-request access control: route predicates plus target-user checks.

use std::sync::Arc;

use tracing::warn;

use warden_auth::{
    AccessDecision, AccessRequirement, AuthzError, DecisionEngine, DecisionReason, Principal, Role,
    RoleDefinition, User, UserSubject,
};
use warden_core::{TenantId, UserId};

use crate::error::ServiceError;
use crate::store::Directory;

/// A stored user together with its live role assignments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub user: User,
    pub roles: Vec<RoleDefinition>,
    role_names: Vec<Role>,
}

impl UserAccount {
    pub fn new(user: User, roles: Vec<RoleDefinition>) -> Self {
        let role_names = roles.iter().map(|r| r.name.clone()).collect();
        Self { user, roles, role_names }
    }

    /// Load a user and its roles; `None` if the user does not exist.
    pub async fn load(directory: &dyn Directory, id: UserId) -> Result<Option<Self>, ServiceError> {
        let Some(user) = directory.get_user(id).await? else {
            return Ok(None);
        };
        let roles = directory.roles_of_user(id).await?;
        Ok(Some(Self::new(user, roles)))
    }

    pub fn role_names(&self) -> &[Role] {
        &self.role_names
    }
}

impl UserSubject for UserAccount {
    fn subject_id(&self) -> UserId {
        self.user.id
    }

    fn tenant_id(&self) -> Option<TenantId> {
        self.user.tenant_id
    }

    fn roles(&self) -> &[Role] {
        &self.role_names
    }
}

/// Wraps the decision engine with the storage lookups a request needs.
#[derive(Clone)]
pub struct AccessGuard {
    directory: Arc<dyn Directory>,
    engine: DecisionEngine,
}

impl AccessGuard {
    pub fn new(directory: Arc<dyn Directory>, engine: DecisionEngine) -> Self {
        Self { directory, engine }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// Check the route-level role/permission predicate.
    pub fn authorize_route(&self, principal: &Principal, requirement: &AccessRequirement) -> Result<(), ServiceError> {
        requirement
            .check(principal, self.engine.hierarchy())
            .map_err(|e| {
                warn!(
                    principal = %principal.subject_id,
                    roles = ?principal.roles,
                    "route requirement not met"
                );
                ServiceError::from(e)
            })
    }

    /// Decision for `principal` managing the stored user `target_id`.
    pub async fn can_manage_user(&self, principal: &Principal, target_id: UserId) -> Result<AccessDecision, ServiceError> {
        let account = UserAccount::load(self.directory.as_ref(), target_id).await?;
        Ok(self.engine.can_manage_user(principal, account.as_ref()))
    }

    /// Load `target_id` and require that `principal` may manage it.
    ///
    /// A missing target surfaces as `NotFound`; any other denial as `Forbidden`.
    pub async fn authorize_user_target(&self, principal: &Principal, target_id: UserId) -> Result<UserAccount, ServiceError> {
        let account = UserAccount::load(self.directory.as_ref(), target_id).await?;
        let decision = self.engine.can_manage_user(principal, account.as_ref());

        match (decision.allowed, account) {
            (true, Some(account)) => Ok(account),
            (_, None) => Err(ServiceError::not_found("user")),
            (false, Some(_)) => {
                warn!(
                    principal = %principal.subject_id,
                    target = %target_id,
                    reason = %decision.reason,
                    "user management denied"
                );
                Err(AuthzError::Denied(decision.reason).into())
            }
        }
    }

    /// Reject role grants above the requester's standing.
    pub fn authorize_role_grant(&self, principal: &Principal, roles: &[Role]) -> Result<(), ServiceError> {
        let decision = self.engine.validate_privilege_escalation(principal, roles);
        if !decision.allowed {
            warn!(
                principal = %principal.subject_id,
                requested = ?roles,
                reason = %decision.reason,
                "privilege escalation denied"
            );
        }
        decision.into_result().map_err(Into::into)
    }

    /// Require tenant access (SUPER_ADMIN or same tenant).
    pub fn authorize_tenant(&self, principal: &Principal, tenant_id: Option<TenantId>) -> Result<(), ServiceError> {
        if self.engine.can_access_tenant(principal, tenant_id) {
            Ok(())
        } else {
            warn!(principal = %principal.subject_id, "cross-tenant access denied");
            Err(AuthzError::Denied(DecisionReason::CrossTenant).into())
        }
    }
}

impl core::fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AccessGuard").field("engine", &self.engine).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::Permission;

    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn route_requirement_rejects_clients() {
        let fx = Fixture::seeded().await;
        let guard = fx.guard();
        let users_route = AccessRequirement::any_role([Role::SUPER_ADMIN, Role::COMPANY_ADMIN]);

        assert!(guard.authorize_route(&fx.company_admin_principal(), &users_route).is_ok());
        let err = guard.authorize_route(&fx.client_principal(), &users_route).unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::InsufficientPermissions));
    }

    #[tokio::test]
    async fn missing_target_is_not_found() {
        let fx = Fixture::seeded().await;
        let err = fx
            .guard()
            .authorize_user_target(&fx.super_admin_principal(), UserId::new())
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::not_found("user"));

        let decision = fx.guard().can_manage_user(&fx.super_admin_principal(), UserId::new()).await.unwrap();
        assert_eq!(decision.reason, DecisionReason::TargetNotFound);
    }

    #[tokio::test]
    async fn company_admin_cannot_touch_super_admin() {
        let fx = Fixture::seeded().await;
        let err = fx
            .guard()
            .authorize_user_target(&fx.company_admin_principal(), fx.seed.super_admin)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::SuperAdminProtected)));
    }

    #[tokio::test]
    async fn company_admin_manages_own_tenant_client() {
        let fx = Fixture::seeded().await;
        let account = fx
            .guard()
            .authorize_user_target(&fx.company_admin_principal(), fx.seed.client)
            .await
            .unwrap();
        assert_eq!(account.role_names(), &[Role::CLIENT]);
    }

    #[tokio::test]
    async fn cross_tenant_target_is_forbidden() {
        let fx = Fixture::seeded().await;
        let outsider = fx.client_in_new_tenant("outsider").await;
        let err = fx
            .guard()
            .authorize_user_target(&fx.company_admin_principal(), outsider)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::CrossTenant)));
    }

    #[test]
    fn role_grants_are_checked_for_escalation() {
        let guard = AccessGuard::new(Arc::new(crate::store::InMemoryDirectory::new()), DecisionEngine::standard());
        let admin = Principal::new(
            UserId::new(),
            Some(TenantId::new()),
            vec![Role::COMPANY_ADMIN],
            vec![Permission::MANAGE_USERS],
        );
        assert!(guard.authorize_role_grant(&admin, &[Role::CLIENT]).is_ok());
        assert_eq!(
            guard.authorize_role_grant(&admin, &[Role::SUPER_ADMIN]),
            Err(ServiceError::Forbidden(AuthzError::Denied(DecisionReason::SuperAdminRoleReserved)))
        );
        assert!(guard.authorize_tenant(&admin, Some(TenantId::new())).is_err());
        assert!(guard.authorize_tenant(&admin, admin.tenant_id).is_ok());
    }
}
