use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use warden_auth::{PasswordHasher, PasswordPolicy, Principal, Role, RoleDefinition, User, is_super_admin};
use warden_core::{ExpectedVersion, RoleId, TenantId, UserId};

use super::{ListQuery, NAME_MAX, USERNAME_MAX, USERNAME_MIN, email_field, optional_text, text_field};
use crate::error::ServiceError;
use crate::guard::{AccessGuard, UserAccount};
use crate::store::{Directory, ListFilter, Page, TenantScope};

#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub password: String,
    /// Defaults to the requester's tenant.
    pub tenant_id: Option<TenantId>,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
    pub is_active: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("tenant_id", &self.tenant_id)
            .field("role_ids", &self.role_ids)
            .finish_non_exhaustive()
    }
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserChanges {
    pub username: Option<String>,
    pub password: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub role_ids: Option<Vec<RoleId>>,
    pub is_active: Option<bool>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
}

impl core::fmt::Debug for UserChanges {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UserChanges")
            .field("username", &self.username)
            .field("tenant_id", &self.tenant_id)
            .field("role_ids", &self.role_ids)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct UserService {
    directory: Arc<dyn Directory>,
    guard: AccessGuard,
    hasher: Arc<dyn PasswordHasher>,
    policy: PasswordPolicy,
}

impl UserService {
    pub fn new(directory: Arc<dyn Directory>, guard: AccessGuard, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            directory,
            guard,
            hasher,
            policy: PasswordPolicy::default(),
        }
    }

    #[instrument(skip(self, principal, new), fields(requester = %principal.subject_id), err)]
    pub async fn create(&self, principal: &Principal, new: NewUser) -> Result<UserAccount, ServiceError> {
        let username = text_field("username", &new.username, USERNAME_MIN, USERNAME_MAX)?;
        self.policy.validate(&new.password)?;

        let tenant_id = new.tenant_id.or(principal.tenant_id);
        self.guard.authorize_tenant(principal, tenant_id)?;
        self.require_tenant(tenant_id).await?;

        let roles = self.resolve_roles(&new.role_ids, tenant_id).await?;
        self.authorize_grant(principal, &roles)?;

        if self.directory.find_user_by_username(&username, None).await?.is_some() {
            return Err(ServiceError::conflict("username already exists"));
        }

        let now = Utc::now();
        let mut user = User::new(username, self.hasher.hash(&new.password)?, tenant_id, now);
        user.is_active = new.is_active.unwrap_or(true);
        user.first_name = optional_text("first name", new.first_name, NAME_MAX)?;
        user.last_name = optional_text("last name", new.last_name, NAME_MAX)?;
        user.email = email_field(new.email)?;
        user.phone = optional_text("phone", new.phone, 20)?;
        user.avatar_url = optional_text("avatar url", new.avatar_url, 500)?;
        user.created_by = Some(principal.subject_id);
        user.updated_by = Some(principal.subject_id);

        let user = self.directory.insert_user(user).await?;
        let role_ids: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
        self.directory.set_user_roles(user.id, &role_ids).await?;

        info!(user_id = %user.id, tenant_id = ?user.tenant_id, "user created");
        Ok(UserAccount::new(user, roles))
    }

    /// Accounts the requester may manage, newest first.
    ///
    /// SUPER_ADMIN lists every tenant; everyone else only their own, then
    /// the decision engine drops accounts they are barred from.
    #[instrument(skip(self, principal), fields(requester = %principal.subject_id), err)]
    pub async fn list(&self, principal: &Principal, query: &ListQuery) -> Result<Page<UserAccount>, ServiceError> {
        let scope = if is_super_admin(&principal.roles) {
            TenantScope::All
        } else {
            TenantScope::Exactly(principal.tenant_id)
        };
        let filter = ListFilter::new(scope, query.search.clone());

        let users = self.directory.list_users(&filter).await?;
        let mut accounts = Vec::with_capacity(users.len());
        for user in users {
            let roles = self.directory.roles_of_user(user.id).await?;
            accounts.push(UserAccount::new(user, roles));
        }

        let visible = self.guard.engine().filter_accessible_users(principal, accounts);
        Ok(Page::from_items(visible, query.pagination()))
    }

    pub async fn get(&self, principal: &Principal, id: UserId) -> Result<UserAccount, ServiceError> {
        self.guard.authorize_user_target(principal, id).await
    }

    #[instrument(skip(self, principal, changes), fields(requester = %principal.subject_id), err)]
    pub async fn update(&self, principal: &Principal, id: UserId, changes: UserChanges) -> Result<UserAccount, ServiceError> {
        let UserAccount { mut user, roles, .. } = self.guard.authorize_user_target(principal, id).await?;
        let version = user.version;
        let now = Utc::now();

        if let Some(username) = changes.username {
            let username = text_field("username", &username, USERNAME_MIN, USERNAME_MAX)?;
            if username != user.username {
                if self.directory.find_user_by_username(&username, None).await?.is_some() {
                    return Err(ServiceError::conflict("username already exists"));
                }
                user.username = username;
            }
        }

        if let Some(password) = changes.password {
            self.policy.validate(&password)?;
            user.password_hash = self.hasher.hash(&password)?;
            user.password_changed_at = now;
        }

        let mut moved = false;
        if let Some(tenant_id) = changes.tenant_id {
            if user.tenant_id != Some(tenant_id) {
                self.guard.authorize_tenant(principal, Some(tenant_id))?;
                self.require_tenant(Some(tenant_id)).await?;
                user.tenant_id = Some(tenant_id);
                moved = true;
            }
        }

        // A tenant move re-checks the held roles against the new tenant.
        let new_roles = match changes.role_ids {
            Some(ids) => {
                let resolved = self.resolve_roles(&ids, user.tenant_id).await?;
                self.authorize_grant(principal, &resolved)?;
                Some(resolved)
            }
            None if moved => {
                let held: Vec<RoleId> = roles.iter().map(|r| r.id).collect();
                Some(self.resolve_roles(&held, user.tenant_id).await?)
            }
            None => None,
        };

        if let Some(active) = changes.is_active {
            user.is_active = active;
        }
        if changes.first_name.is_some() {
            user.first_name = optional_text("first name", changes.first_name, NAME_MAX)?;
        }
        if changes.last_name.is_some() {
            user.last_name = optional_text("last name", changes.last_name, NAME_MAX)?;
        }
        if changes.email.is_some() {
            user.email = email_field(changes.email)?;
        }
        if changes.phone.is_some() {
            user.phone = optional_text("phone", changes.phone, 20)?;
        }
        if changes.avatar_url.is_some() {
            user.avatar_url = optional_text("avatar url", changes.avatar_url, 500)?;
        }

        user.touch(Some(principal.subject_id), now);
        let user = self.directory.update_user(user, ExpectedVersion::Exact(version)).await?;

        let roles = match new_roles {
            Some(resolved) => {
                let ids: Vec<RoleId> = resolved.iter().map(|r| r.id).collect();
                self.directory.set_user_roles(user.id, &ids).await?;
                resolved
            }
            None => roles,
        };

        info!(user_id = %user.id, "user updated");
        Ok(UserAccount::new(user, roles))
    }

    /// Soft delete: the account stays but can no longer log in.
    #[instrument(skip(self, principal), fields(requester = %principal.subject_id), err)]
    pub async fn deactivate(&self, principal: &Principal, id: UserId) -> Result<(), ServiceError> {
        let UserAccount { mut user, .. } = self.guard.authorize_user_target(principal, id).await?;
        let version = user.version;

        user.is_active = false;
        user.touch(Some(principal.subject_id), Utc::now());
        self.directory.update_user(user, ExpectedVersion::Exact(version)).await?;

        info!(user_id = %id, "user deactivated");
        Ok(())
    }

    async fn require_tenant(&self, tenant_id: Option<TenantId>) -> Result<(), ServiceError> {
        if let Some(id) = tenant_id {
            if self.directory.get_tenant(id).await?.is_none() {
                return Err(ServiceError::not_found("tenant"));
            }
        }
        Ok(())
    }

    /// Live roles that are global or belong to `tenant_id`.
    async fn resolve_roles(&self, ids: &[RoleId], tenant_id: Option<TenantId>) -> Result<Vec<RoleDefinition>, ServiceError> {
        let mut roles: Vec<RoleDefinition> = Vec::with_capacity(ids.len());
        for id in ids {
            if roles.iter().any(|r| r.id == *id) {
                continue;
            }
            let role = self
                .directory
                .get_role(*id)
                .await?
                .filter(|r| !r.is_deleted())
                .ok_or(ServiceError::not_found("role"))?;
            if !role.is_global() && role.tenant_id != tenant_id {
                return Err(ServiceError::validation(format!(
                    "role {} is not available in this tenant",
                    role.name
                )));
            }
            roles.push(role);
        }
        Ok(roles)
    }

    fn authorize_grant(&self, principal: &Principal, roles: &[RoleDefinition]) -> Result<(), ServiceError> {
        let names: Vec<Role> = roles.iter().map(|r| r.name.clone()).collect();
        self.guard.authorize_role_grant(principal, &names)
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::{AuthzError, DecisionReason, UserSubject};

    use super::*;
    use crate::services::{NewRole, NewTenant};
    use crate::store::{RoleStore, UserStore};
    use crate::testing::Fixture;

    fn new_user(username: &str, role_ids: Vec<RoleId>) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "Str0ng!Pass".to_string(),
            role_ids,
            ..NewUser::default()
        }
    }

    #[tokio::test]
    async fn company_admin_creates_clients_in_own_tenant() {
        let fx = Fixture::seeded().await;
        let users = fx.services().users;
        let admin = fx.company_admin_principal();

        let created = users
            .create(&admin, new_user("newclient", vec![fx.seed.client_role]))
            .await
            .unwrap();
        assert_eq!(created.user.tenant_id, Some(fx.seed.tenant_id));
        assert_eq!(created.user.created_by, Some(admin.subject_id));
        assert_eq!(created.role_names(), &[Role::CLIENT]);
    }

    #[tokio::test]
    async fn company_admin_cannot_grant_super_admin() {
        let fx = Fixture::seeded().await;
        let err = fx
            .services()
            .users
            .create(&fx.company_admin_principal(), new_user("sneaky", vec![fx.seed.super_admin_role]))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::SuperAdminRoleReserved)));
    }

    #[tokio::test]
    async fn company_admin_cannot_create_in_another_tenant() {
        let fx = Fixture::seeded().await;
        let mut request = new_user("elsewhere", vec![]);
        request.tenant_id = Some(TenantId::new());
        let err = fx
            .services()
            .users
            .create(&fx.company_admin_principal(), request)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::CrossTenant)));
    }

    #[tokio::test]
    async fn duplicate_username_and_weak_password_are_rejected() {
        let fx = Fixture::seeded().await;
        let users = fx.services().users;
        let admin = fx.super_admin_principal();

        let dup = users.create(&admin, new_user("clientuser", vec![])).await.unwrap_err();
        assert!(matches!(dup, ServiceError::Domain(warden_core::DomainError::Conflict(_))));

        let mut weak = new_user("weakling", vec![]);
        weak.password = "password".into();
        let err = users.create(&admin, weak).await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(warden_core::DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn listing_hides_what_the_requester_may_not_manage() {
        let fx = Fixture::seeded().await;
        let users = fx.services().users;
        fx.client_in_new_tenant("outsider").await;

        let all = users.list(&fx.super_admin_principal(), &ListQuery::default()).await.unwrap();
        assert_eq!(all.total, 4);

        // Same tenant: self + client. The super admin is global and never listed.
        let mine = users.list(&fx.company_admin_principal(), &ListQuery::default()).await.unwrap();
        let mut names: Vec<&str> = mine.items.iter().map(|a| a.user.username.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["clientuser", "companyadmin"]);

        let searched = users
            .list(
                &fx.super_admin_principal(),
                &ListQuery {
                    search: Some("CLIENT".into()),
                    ..ListQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(searched.total, 1);
    }

    #[tokio::test]
    async fn peer_company_admin_is_filtered_without_manage_company_admins() {
        let fx = Fixture::seeded().await;
        let peer = fx.user_with_role("peeradmin", fx.seed.company_admin_role).await;
        let users = fx.services().users;

        let page = users.list(&fx.company_admin_principal(), &ListQuery::default()).await.unwrap();
        assert!(page.items.iter().all(|a| a.subject_id() != peer));

        let err = users.get(&fx.company_admin_principal(), peer).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::Forbidden(AuthzError::Denied(DecisionReason::CompanyAdminPermissionRequired))
        );
    }

    #[tokio::test]
    async fn update_changes_profile_and_roles() {
        let fx = Fixture::seeded().await;
        let users = fx.services().users;

        let updated = users
            .update(
                &fx.super_admin_principal(),
                fx.seed.client,
                UserChanges {
                    first_name: Some("Cleo".into()),
                    role_ids: Some(vec![fx.seed.company_admin_role]),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.user.first_name.as_deref(), Some("Cleo"));
        assert_eq!(updated.role_names(), &[Role::COMPANY_ADMIN]);
        assert_eq!(updated.user.version, 1);
        assert_eq!(updated.user.updated_by, Some(fx.seed.super_admin));
    }

    #[tokio::test]
    async fn moving_tenants_rechecks_tenant_scoped_roles() {
        let fx = Fixture::seeded().await;
        let services = fx.services();
        let sa = fx.super_admin_principal();

        let auditor = services
            .roles
            .create(
                &sa,
                NewRole {
                    name: "ACME_AUDITOR".into(),
                    tenant_id: Some(fx.seed.tenant_id),
                    ..NewRole::default()
                },
            )
            .await
            .unwrap();
        services
            .users
            .update(
                &sa,
                fx.seed.client,
                UserChanges {
                    role_ids: Some(vec![fx.seed.client_role, auditor.role.id]),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        let globex = services.tenants.create(&sa, NewTenant { name: "Globex".into() }).await.unwrap();

        let err = services
            .users
            .update(
                &sa,
                fx.seed.client,
                UserChanges {
                    tenant_id: Some(globex.id),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(warden_core::DomainError::Validation(_))));
        let stored = fx.dir.get_user(fx.seed.client).await.unwrap().unwrap();
        assert_eq!(stored.tenant_id, Some(fx.seed.tenant_id));

        let moved = services
            .users
            .update(
                &sa,
                fx.seed.client,
                UserChanges {
                    tenant_id: Some(globex.id),
                    role_ids: Some(vec![fx.seed.client_role]),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.user.tenant_id, Some(globex.id));
        assert_eq!(moved.role_names(), &[Role::CLIENT]);
        let held = fx.dir.roles_of_user(fx.seed.client).await.unwrap();
        assert!(held.iter().all(|r| r.is_global() || r.tenant_id == Some(globex.id)));
    }

    #[tokio::test]
    async fn moving_tenants_keeps_global_roles() {
        let fx = Fixture::seeded().await;
        let services = fx.services();
        let sa = fx.super_admin_principal();
        let globex = services.tenants.create(&sa, NewTenant { name: "Globex".into() }).await.unwrap();

        let moved = services
            .users
            .update(
                &sa,
                fx.seed.client,
                UserChanges {
                    tenant_id: Some(globex.id),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.user.tenant_id, Some(globex.id));
        assert_eq!(moved.role_names(), &[Role::CLIENT]);
    }

    #[tokio::test]
    async fn profile_and_admin_paths_share_length_limits() {
        let fx = Fixture::seeded().await;
        let services = fx.services();
        let long = "u".repeat(USERNAME_MAX + 1);

        let err = services
            .users
            .create(&fx.super_admin_principal(), new_user(&long, vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(warden_core::DomainError::Validation(_))));

        let err = services
            .profile
            .update_profile(
                fx.seed.client,
                crate::services::ProfileChanges {
                    first_name: Some("n".repeat(NAME_MAX + 1)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(warden_core::DomainError::Validation(_))));

        let exact = "u".repeat(USERNAME_MAX);
        services
            .users
            .create(&fx.super_admin_principal(), new_user(&exact, vec![]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn renaming_to_a_taken_username_conflicts() {
        let fx = Fixture::seeded().await;
        let err = fx
            .services()
            .users
            .update(
                &fx.company_admin_principal(),
                fx.seed.client,
                UserChanges {
                    username: Some("companyadmin".into()),
                    ..UserChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Domain(warden_core::DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn deactivate_keeps_the_row() {
        let fx = Fixture::seeded().await;
        fx.services()
            .users
            .deactivate(&fx.company_admin_principal(), fx.seed.client)
            .await
            .unwrap();
        let stored = fx.dir.get_user(fx.seed.client).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.updated_by, Some(fx.seed.company_admin));
    }

    #[tokio::test]
    async fn client_cannot_deactivate_super_admin() {
        let fx = Fixture::seeded().await;
        let err = fx
            .services()
            .users
            .deactivate(&fx.client_principal(), fx.seed.super_admin)
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Forbidden(AuthzError::Denied(DecisionReason::SuperAdminProtected)));
    }
}
