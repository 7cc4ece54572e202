use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use warden_auth::{PermissionDefinition, Principal, Role, RoleDefinition, is_super_admin};
use warden_core::{ExpectedVersion, PermissionId, RoleId, TenantId};

use super::{ListQuery, optional_text, text_field};
use crate::error::ServiceError;
use crate::guard::AccessGuard;
use crate::store::{Directory, ListFilter, Page, TenantScope};

/// A role with its permission grants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDetails {
    pub role: RoleDefinition,
    pub permissions: Vec<PermissionDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    /// `None` defines a global role.
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub permission_ids: Vec<PermissionId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permission_ids: Option<Vec<PermissionId>>,
}

#[derive(Clone)]
pub struct RoleService {
    directory: Arc<dyn Directory>,
    guard: AccessGuard,
}

impl RoleService {
    pub fn new(directory: Arc<dyn Directory>, guard: AccessGuard) -> Self {
        Self { directory, guard }
    }

    #[instrument(skip(self, principal, new), fields(requester = %principal.subject_id), err)]
    pub async fn create(&self, principal: &Principal, new: NewRole) -> Result<RoleDetails, ServiceError> {
        let name = text_field("role name", &new.name, 1, 100)?;
        self.guard.authorize_tenant(principal, new.tenant_id)?;
        if let Some(tenant_id) = new.tenant_id {
            if self.directory.get_tenant(tenant_id).await?.is_none() {
                return Err(ServiceError::not_found("tenant"));
            }
        }
        let permissions = self.resolve_permissions(&new.permission_ids).await?;

        let now = Utc::now();
        let mut role = RoleDefinition::new(Role::new(name), new.tenant_id, now);
        role.description = optional_text("description", new.description, 500)?;
        role.created_by = Some(principal.subject_id);
        role.updated_by = Some(principal.subject_id);

        let role = self.directory.insert_role(role).await?;
        let ids: Vec<PermissionId> = permissions.iter().map(|p| p.id).collect();
        self.directory.set_role_permissions(role.id, &ids).await?;

        info!(role_id = %role.id, name = %role.name, "role created");
        Ok(RoleDetails { role, permissions })
    }

    /// Live roles; non-SUPER_ADMIN requesters see their tenant's roles plus
    /// the global definitions.
    pub async fn list(&self, principal: &Principal, query: &ListQuery) -> Result<Page<RoleDetails>, ServiceError> {
        let scope = if is_super_admin(&principal.roles) {
            TenantScope::All
        } else {
            TenantScope::WithGlobal(principal.tenant_id)
        };
        let roles = self
            .directory
            .list_roles(&ListFilter::new(scope, query.search.clone()))
            .await?;

        let Page {
            items: roles,
            total,
            pagination,
            has_more,
        } = Page::from_items(roles, query.pagination());

        let mut items = Vec::with_capacity(roles.len());
        for role in roles {
            let permissions = self.directory.permissions_of_role(role.id).await?;
            items.push(RoleDetails { role, permissions });
        }
        Ok(Page {
            items,
            total,
            pagination,
            has_more,
        })
    }

    pub async fn get(&self, principal: &Principal, id: RoleId) -> Result<RoleDetails, ServiceError> {
        let role = self.visible_role(principal, id).await?;
        let permissions = self.directory.permissions_of_role(role.id).await?;
        Ok(RoleDetails { role, permissions })
    }

    #[instrument(skip(self, principal, changes), fields(requester = %principal.subject_id), err)]
    pub async fn update(&self, principal: &Principal, id: RoleId, changes: RoleChanges) -> Result<RoleDetails, ServiceError> {
        let mut role = self.writable_role(principal, id).await?;
        let version = role.version;

        if let Some(name) = changes.name {
            role.name = Role::new(text_field("role name", &name, 1, 100)?);
        }
        if changes.description.is_some() {
            role.description = optional_text("description", changes.description, 500)?;
        }
        let permissions = match changes.permission_ids {
            Some(ids) => Some(self.resolve_permissions(&ids).await?),
            None => None,
        };

        role.updated_at = Utc::now();
        role.updated_by = Some(principal.subject_id);
        let role = self.directory.update_role(role, ExpectedVersion::Exact(version)).await?;

        let permissions = match permissions {
            Some(perms) => {
                let ids: Vec<PermissionId> = perms.iter().map(|p| p.id).collect();
                self.directory.set_role_permissions(role.id, &ids).await?;
                perms
            }
            None => self.directory.permissions_of_role(role.id).await?,
        };

        info!(role_id = %role.id, "role updated");
        Ok(RoleDetails { role, permissions })
    }

    /// Soft delete via `deleted_at`; assignments stop taking effect.
    #[instrument(skip(self, principal), fields(requester = %principal.subject_id), err)]
    pub async fn delete(&self, principal: &Principal, id: RoleId) -> Result<(), ServiceError> {
        let mut role = self.writable_role(principal, id).await?;
        let version = role.version;
        let now = Utc::now();

        role.deleted_at = Some(now);
        role.updated_at = now;
        role.updated_by = Some(principal.subject_id);
        self.directory.update_role(role, ExpectedVersion::Exact(version)).await?;

        info!(role_id = %id, "role deleted");
        Ok(())
    }

    /// Global roles are readable by everyone; tenant roles need tenant access.
    async fn visible_role(&self, principal: &Principal, id: RoleId) -> Result<RoleDefinition, ServiceError> {
        let role = self
            .directory
            .get_role(id)
            .await?
            .filter(|r| !r.is_deleted())
            .ok_or(ServiceError::not_found("role"))?;
        if !role.is_global() {
            self.guard.authorize_tenant(principal, role.tenant_id)?;
        }
        Ok(role)
    }

    async fn writable_role(&self, principal: &Principal, id: RoleId) -> Result<RoleDefinition, ServiceError> {
        let role = self.visible_role(principal, id).await?;
        self.guard.authorize_tenant(principal, role.tenant_id)?;
        Ok(role)
    }

    async fn resolve_permissions(&self, ids: &[PermissionId]) -> Result<Vec<PermissionDefinition>, ServiceError> {
        let mut out: Vec<PermissionDefinition> = Vec::with_capacity(ids.len());
        for id in ids {
            if out.iter().any(|p| p.id == *id) {
                continue;
            }
            let permission = self
                .directory
                .get_permission(*id)
                .await?
                .ok_or(ServiceError::not_found("permission"))?;
            out.push(permission);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::{AuthzError, DecisionReason, Permission};

    use super::*;
    use crate::store::{PermissionStore, RoleStore, UserStore, effective_access};
    use crate::testing::Fixture;

    async fn permission_id(fx: &Fixture, key: Permission) -> PermissionId {
        fx.dir.find_permission_by_key(key.as_str()).await.unwrap().unwrap().id
    }

    #[tokio::test]
    async fn create_role_with_permissions() {
        let fx = Fixture::seeded().await;
        let view = permission_id(&fx, Permission::VIEW_ROLES).await;

        let details = fx
            .services()
            .roles
            .create(
                &fx.super_admin_principal(),
                NewRole {
                    name: "AUDITOR".into(),
                    tenant_id: Some(fx.seed.tenant_id),
                    permission_ids: vec![view, view],
                    ..NewRole::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(details.role.tenant_id, Some(fx.seed.tenant_id));
        assert_eq!(details.permissions.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_name_in_the_same_scope_conflicts() {
        let fx = Fixture::seeded().await;
        let err = fx
            .services()
            .roles
            .create(
                &fx.super_admin_principal(),
                NewRole {
                    name: "CLIENT".into(),
                    ..NewRole::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn company_admin_sees_global_and_own_tenant_roles() {
        let fx = Fixture::seeded().await;
        let roles = fx.services().roles;
        let sa = fx.super_admin_principal();

        roles
            .create(&sa, NewRole { name: "LOCAL".into(), tenant_id: Some(fx.seed.tenant_id), ..NewRole::default() })
            .await
            .unwrap();
        let other = fx.client_in_new_tenant("other").await;
        let other_tenant = fx.dir.get_user(other).await.unwrap().unwrap().tenant_id;
        let foreign = roles
            .create(&sa, NewRole { name: "FOREIGN".into(), tenant_id: other_tenant, ..NewRole::default() })
            .await
            .unwrap();

        let page = roles.list(&fx.company_admin_principal(), &ListQuery::default()).await.unwrap();
        let mut names: Vec<&str> = page.items.iter().map(|d| d.role.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["CLIENT", "COMPANY_ADMIN", "LOCAL", "SUPER_ADMIN"]);

        let err = roles.get(&fx.company_admin_principal(), foreign.role.id).await.unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::CrossTenant)));
    }

    #[tokio::test]
    async fn update_replaces_grants() {
        let fx = Fixture::seeded().await;
        let manage = permission_id(&fx, Permission::MANAGE_COMPANY_ADMINS).await;

        let details = fx
            .services()
            .roles
            .update(
                &fx.super_admin_principal(),
                fx.seed.company_admin_role,
                RoleChanges {
                    permission_ids: Some(vec![manage]),
                    ..RoleChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(details.permissions.len(), 1);

        let (_, perms) = effective_access(fx.dir.as_ref(), fx.seed.company_admin).await.unwrap();
        assert_eq!(perms, vec![Permission::MANAGE_COMPANY_ADMINS]);
    }

    #[tokio::test]
    async fn deleted_role_stops_counting() {
        let fx = Fixture::seeded().await;
        let roles = fx.services().roles;
        roles.delete(&fx.super_admin_principal(), fx.seed.client_role).await.unwrap();

        assert!(fx.dir.roles_of_user(fx.seed.client).await.unwrap().is_empty());
        let err = roles.get(&fx.super_admin_principal(), fx.seed.client_role).await.unwrap_err();
        assert_eq!(err, ServiceError::not_found("role"));
        assert!(fx.dir.get_role(fx.seed.client_role).await.unwrap().unwrap().deleted_at.is_some());
    }
}
