use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use warden_auth::{LockoutPolicy, LoginCounters, PermissionDefinition, RoleDefinition, Tenant, User};
use warden_core::{ExpectedVersion, PermissionId, RoleId, TenantId, UserId};

use super::{ListFilter, PermissionStore, RoleStore, StoreError, TenantStore, UserStore};

#[derive(Debug, Default)]
struct State {
    users: HashMap<UserId, User>,
    tenants: HashMap<TenantId, Tenant>,
    roles: HashMap<RoleId, RoleDefinition>,
    permissions: HashMap<PermissionId, PermissionDefinition>,
    user_roles: HashMap<UserId, Vec<RoleId>>,
    role_permissions: HashMap<RoleId, Vec<PermissionId>>,
}

/// In-memory identity directory.
///
/// Intended for tests/dev. A single lock guards all tables, so every
/// operation (including the failed-login counter update) is atomic.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    state: RwLock<State>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("directory lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("directory lock poisoned".into()))
    }
}

fn check_version(expected: ExpectedVersion, actual: u64) -> Result<(), StoreError> {
    expected
        .check(actual)
        .map_err(|e| StoreError::Concurrency(e.to_string()))
}

fn distinct<T: Copy + Eq + std::hash::Hash>(ids: &[T]) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

fn newest_first<T>(items: &mut [T], created_at: impl Fn(&T) -> DateTime<Utc>) {
    items.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
}

#[async_trait::async_trait]
impl UserStore for InMemoryDirectory {
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!("username '{}' already exists", user.username)));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<User>, StoreError> {
        let state = self.read()?;
        Ok(state
            .users
            .values()
            .find(|u| u.username == username && tenant_id.is_none_or(|t| u.tenant_id == Some(t)))
            .cloned())
    }

    async fn list_users(&self, filter: &ListFilter) -> Result<Vec<User>, StoreError> {
        let state = self.read()?;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.matches(u.tenant_id, &u.username))
            .cloned()
            .collect();
        newest_first(&mut users, |u| u.created_at);
        Ok(users)
    }

    async fn update_user(&self, mut user: User, expected: ExpectedVersion) -> Result<User, StoreError> {
        let mut state = self.write()?;
        if state
            .users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(StoreError::Conflict(format!("username '{}' already exists", user.username)));
        }

        let stored = state.users.get_mut(&user.id).ok_or(StoreError::NotFound("user"))?;
        check_version(expected, stored.version)?;

        user.apply_counters(stored.counters());
        user.last_login_at = stored.last_login_at;
        user.version = stored.version + 1;
        *stored = user.clone();
        Ok(user)
    }

    async fn record_login_failure(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LoginCounters, StoreError> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        let mut counters = user.counters();
        counters.register_failure(policy, now);
        user.apply_counters(counters);
        Ok(counters)
    }

    async fn record_login_success(&self, id: UserId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let user = state.users.get_mut(&id).ok_or(StoreError::NotFound("user"))?;
        let mut counters = user.counters();
        counters.register_success();
        user.apply_counters(counters);
        user.last_login_at = Some(now);
        Ok(())
    }

    async fn set_user_roles(&self, id: UserId, roles: &[RoleId]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.users.contains_key(&id) {
            return Err(StoreError::NotFound("user"));
        }
        if let Some(missing) = roles.iter().find(|r| !state.roles.contains_key(r)) {
            return Err(StoreError::Conflict(format!("role {missing} does not exist")));
        }
        state.user_roles.insert(id, distinct(roles));
        Ok(())
    }

    async fn roles_of_user(&self, id: UserId) -> Result<Vec<RoleDefinition>, StoreError> {
        let state = self.read()?;
        let ids = state.user_roles.get(&id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|r| state.roles.get(r))
            .filter(|r| !r.is_deleted())
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl TenantStore for InMemoryDirectory {
    async fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError> {
        let mut state = self.write()?;
        if state.tenants.values().any(|t| t.name == tenant.name) {
            return Err(StoreError::Conflict(format!("tenant '{}' already exists", tenant.name)));
        }
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        Ok(self.read()?.tenants.get(&id).cloned())
    }

    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        Ok(self.read()?.tenants.values().find(|t| t.name == name).cloned())
    }

    async fn list_tenants(&self, filter: &ListFilter) -> Result<Vec<Tenant>, StoreError> {
        let state = self.read()?;
        let mut tenants: Vec<Tenant> = state
            .tenants
            .values()
            .filter(|t| filter.matches(Some(t.id), &t.name))
            .cloned()
            .collect();
        newest_first(&mut tenants, |t| t.created_at);
        Ok(tenants)
    }

    async fn update_tenant(&self, mut tenant: Tenant, expected: ExpectedVersion) -> Result<Tenant, StoreError> {
        let mut state = self.write()?;
        if state
            .tenants
            .values()
            .any(|t| t.id != tenant.id && t.name == tenant.name)
        {
            return Err(StoreError::Conflict(format!("tenant '{}' already exists", tenant.name)));
        }
        let stored = state.tenants.get_mut(&tenant.id).ok_or(StoreError::NotFound("tenant"))?;
        check_version(expected, stored.version)?;
        tenant.version = stored.version + 1;
        *stored = tenant.clone();
        Ok(tenant)
    }
}

fn role_name_taken(state: &State, role: &RoleDefinition) -> bool {
    state.roles.values().any(|r| {
        r.id != role.id && !r.is_deleted() && r.name == role.name && r.tenant_id == role.tenant_id
    })
}

#[async_trait::async_trait]
impl RoleStore for InMemoryDirectory {
    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        let mut state = self.write()?;
        if role_name_taken(&state, &role) {
            return Err(StoreError::Conflict(format!("role '{}' already exists in this scope", role.name)));
        }
        state.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, StoreError> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn find_role_by_name(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<RoleDefinition>, StoreError> {
        let state = self.read()?;
        Ok(state
            .roles
            .values()
            .find(|r| !r.is_deleted() && r.name.as_str() == name && r.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_roles(&self, filter: &ListFilter) -> Result<Vec<RoleDefinition>, StoreError> {
        let state = self.read()?;
        let mut roles: Vec<RoleDefinition> = state
            .roles
            .values()
            .filter(|r| !r.is_deleted() && filter.matches(r.tenant_id, r.name.as_str()))
            .cloned()
            .collect();
        newest_first(&mut roles, |r| r.created_at);
        Ok(roles)
    }

    async fn update_role(
        &self,
        mut role: RoleDefinition,
        expected: ExpectedVersion,
    ) -> Result<RoleDefinition, StoreError> {
        let mut state = self.write()?;
        if !role.is_deleted() && role_name_taken(&state, &role) {
            return Err(StoreError::Conflict(format!("role '{}' already exists in this scope", role.name)));
        }
        let stored = state.roles.get_mut(&role.id).ok_or(StoreError::NotFound("role"))?;
        check_version(expected, stored.version)?;
        role.version = stored.version + 1;
        *stored = role.clone();
        Ok(role)
    }

    async fn set_role_permissions(&self, id: RoleId, permissions: &[PermissionId]) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.roles.contains_key(&id) {
            return Err(StoreError::NotFound("role"));
        }
        if let Some(missing) = permissions.iter().find(|p| !state.permissions.contains_key(p)) {
            return Err(StoreError::Conflict(format!("permission {missing} does not exist")));
        }
        state.role_permissions.insert(id, distinct(permissions));
        Ok(())
    }

    async fn permissions_of_role(&self, id: RoleId) -> Result<Vec<PermissionDefinition>, StoreError> {
        let state = self.read()?;
        let ids = state.role_permissions.get(&id).map(Vec::as_slice).unwrap_or_default();
        Ok(ids.iter().filter_map(|p| state.permissions.get(p)).cloned().collect())
    }
}

#[async_trait::async_trait]
impl PermissionStore for InMemoryDirectory {
    async fn insert_permission(&self, permission: PermissionDefinition) -> Result<PermissionDefinition, StoreError> {
        let mut state = self.write()?;
        if state.permissions.values().any(|p| p.key == permission.key) {
            return Err(StoreError::Conflict(format!("permission '{}' already exists", permission.key)));
        }
        state.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionDefinition>, StoreError> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    async fn find_permission_by_key(&self, key: &str) -> Result<Option<PermissionDefinition>, StoreError> {
        Ok(self.read()?.permissions.values().find(|p| p.key.as_str() == key).cloned())
    }

    async fn list_permissions(&self) -> Result<Vec<PermissionDefinition>, StoreError> {
        let mut all: Vec<PermissionDefinition> = self.read()?.permissions.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use warden_auth::{Permission, Role};

    use super::*;

    fn user(name: &str, tenant: Option<TenantId>) -> User {
        User::new(name, "hash", tenant, Utc::now())
    }

    #[tokio::test]
    async fn usernames_are_globally_unique() {
        let dir = InMemoryDirectory::new();
        dir.insert_user(user("alice", Some(TenantId::new()))).await.unwrap();
        let err = dir.insert_user(user("alice", Some(TenantId::new()))).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn tenant_scoped_username_lookup() {
        let dir = InMemoryDirectory::new();
        let t = TenantId::new();
        dir.insert_user(user("alice", Some(t))).await.unwrap();

        assert!(dir.find_user_by_username("alice", None).await.unwrap().is_some());
        assert!(dir.find_user_by_username("alice", Some(t)).await.unwrap().is_some());
        assert!(dir.find_user_by_username("alice", Some(TenantId::new())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_update_is_rejected_and_counters_survive() {
        let dir = InMemoryDirectory::new();
        let u = dir.insert_user(user("bob", None)).await.unwrap();
        let now = Utc::now();
        dir.record_login_failure(u.id, &LockoutPolicy::default(), now).await.unwrap();

        let mut edited = u.clone();
        edited.first_name = Some("Bob".into());
        let saved = dir.update_user(edited.clone(), ExpectedVersion::Exact(0)).await.unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(saved.login_attempts, 1);

        let err = dir.update_user(edited, ExpectedVersion::Exact(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[tokio::test]
    async fn failures_lock_and_success_resets() {
        let dir = InMemoryDirectory::new();
        let u = dir.insert_user(user("carol", None)).await.unwrap();
        let policy = LockoutPolicy::default();
        let now = Utc::now();

        let mut last = LoginCounters::default();
        for _ in 0..5 {
            last = dir.record_login_failure(u.id, &policy, now).await.unwrap();
        }
        assert_eq!(last.locked_until, Some(now + Duration::minutes(15)));

        dir.record_login_success(u.id, now).await.unwrap();
        let stored = dir.get_user(u.id).await.unwrap().unwrap();
        assert_eq!(stored.counters(), LoginCounters::default());
        assert_eq!(stored.last_login_at, Some(now));
    }

    #[tokio::test]
    async fn role_names_unique_per_tenant_and_deleted_roles_drop_out() {
        let dir = InMemoryDirectory::new();
        let now = Utc::now();
        let t = Some(TenantId::new());

        let global = dir.insert_role(RoleDefinition::new(Role::new("AUDITOR"), None, now)).await.unwrap();
        dir.insert_role(RoleDefinition::new(Role::new("AUDITOR"), t, now)).await.unwrap();
        let err = dir
            .insert_role(RoleDefinition::new(Role::new("AUDITOR"), t, now))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let u = dir.insert_user(user("dave", t)).await.unwrap();
        dir.set_user_roles(u.id, &[global.id]).await.unwrap();
        assert_eq!(dir.roles_of_user(u.id).await.unwrap().len(), 1);

        let mut deleted = global.clone();
        deleted.deleted_at = Some(now);
        dir.update_role(deleted, ExpectedVersion::Any).await.unwrap();
        assert!(dir.roles_of_user(u.id).await.unwrap().is_empty());

        let recreated = dir.insert_role(RoleDefinition::new(Role::new("AUDITOR"), None, now)).await;
        assert!(recreated.is_ok());
    }

    #[tokio::test]
    async fn effective_access_is_the_deduplicated_union() {
        let dir = InMemoryDirectory::new();
        let now = Utc::now();
        let view = dir
            .insert_permission(PermissionDefinition::new(Permission::VIEW_USERS, None, now))
            .await
            .unwrap();
        let manage = dir
            .insert_permission(PermissionDefinition::new(Permission::MANAGE_USERS, None, now))
            .await
            .unwrap();
        let a = dir.insert_role(RoleDefinition::new(Role::CLIENT, None, now)).await.unwrap();
        let b = dir.insert_role(RoleDefinition::new(Role::COMPANY_ADMIN, None, now)).await.unwrap();
        dir.set_role_permissions(a.id, &[view.id]).await.unwrap();
        dir.set_role_permissions(b.id, &[view.id, manage.id]).await.unwrap();

        let u = dir.insert_user(user("erin", None)).await.unwrap();
        dir.set_user_roles(u.id, &[a.id, b.id]).await.unwrap();

        let (roles, perms) = super::super::effective_access(&dir, u.id).await.unwrap();
        assert_eq!(roles, vec![Role::CLIENT, Role::COMPANY_ADMIN]);
        assert_eq!(perms, vec![Permission::MANAGE_USERS, Permission::VIEW_USERS]);
    }
}
