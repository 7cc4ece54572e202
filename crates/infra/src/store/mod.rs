//! Storage boundary for identity records.
//!
//! Stores are async and object-safe so services can hold an
//! `Arc<dyn Directory>` regardless of backend.

use chrono::{DateTime, Utc};
use thiserror::Error;

use warden_auth::{
    LockoutPolicy, LoginCounters, Permission, PermissionDefinition, Role, RoleDefinition, Tenant, User,
};
use warden_core::{ExpectedVersion, PermissionId, RoleId, TenantId, UserId};

pub mod in_memory;
pub mod postgres;
pub mod query;

pub use in_memory::InMemoryDirectory;
pub use postgres::PostgresDirectory;
pub use query::{ListFilter, Page, Pagination, TenantScope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic concurrency check failed.
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// User accounts, their lockout counters and role assignments.
///
/// `update_user` never writes lockout counters or `last_login_at`; those are
/// owned by `record_login_failure` / `record_login_success`, which must be
/// atomic per row.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` if the username is taken.
    async fn insert_user(&self, user: User) -> Result<User, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    /// Look up by username; with `Some(tenant)` only accounts of that tenant match.
    async fn find_user_by_username(
        &self,
        username: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<User>, StoreError>;

    /// Newest first.
    async fn list_users(&self, filter: &ListFilter) -> Result<Vec<User>, StoreError>;

    /// Persist profile/admin changes and bump `version`.
    async fn update_user(&self, user: User, expected: ExpectedVersion) -> Result<User, StoreError>;

    /// Atomically apply [`LoginCounters::register_failure`] to the stored row.
    async fn record_login_failure(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LoginCounters, StoreError>;

    /// Reset counters and stamp `last_login_at`.
    async fn record_login_success(&self, id: UserId, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Replace the user's role assignments.
    async fn set_user_roles(&self, id: UserId, roles: &[RoleId]) -> Result<(), StoreError>;

    /// Assigned, non-deleted roles.
    async fn roles_of_user(&self, id: UserId) -> Result<Vec<RoleDefinition>, StoreError>;
}

#[async_trait::async_trait]
pub trait TenantStore: Send + Sync {
    /// Fails with `Conflict` if the name is taken.
    async fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError>;

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError>;

    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError>;

    async fn list_tenants(&self, filter: &ListFilter) -> Result<Vec<Tenant>, StoreError>;

    async fn update_tenant(&self, tenant: Tenant, expected: ExpectedVersion) -> Result<Tenant, StoreError>;
}

#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    /// Fails with `Conflict` if `(name, tenant_id)` is taken by a live role.
    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError>;

    /// Returns soft-deleted rows too.
    async fn get_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, StoreError>;

    async fn find_role_by_name(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<RoleDefinition>, StoreError>;

    /// Live roles only, newest first.
    async fn list_roles(&self, filter: &ListFilter) -> Result<Vec<RoleDefinition>, StoreError>;

    async fn update_role(
        &self,
        role: RoleDefinition,
        expected: ExpectedVersion,
    ) -> Result<RoleDefinition, StoreError>;

    /// Replace the role's permission grants.
    async fn set_role_permissions(&self, id: RoleId, permissions: &[PermissionId]) -> Result<(), StoreError>;

    async fn permissions_of_role(&self, id: RoleId) -> Result<Vec<PermissionDefinition>, StoreError>;
}

#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fails with `Conflict` if the key is taken.
    async fn insert_permission(&self, permission: PermissionDefinition) -> Result<PermissionDefinition, StoreError>;

    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionDefinition>, StoreError>;

    async fn find_permission_by_key(&self, key: &str) -> Result<Option<PermissionDefinition>, StoreError>;

    /// Ordered by key.
    async fn list_permissions(&self) -> Result<Vec<PermissionDefinition>, StoreError>;
}

/// Every store a service may need, behind one object.
pub trait Directory: UserStore + TenantStore + RoleStore + PermissionStore {}

impl<T> Directory for T where T: UserStore + TenantStore + RoleStore + PermissionStore + ?Sized {}

/// Effective role names and permission-key union for a user.
///
/// Both lists are de-duplicated and sorted.
pub async fn effective_access<D>(directory: &D, id: UserId) -> Result<(Vec<Role>, Vec<Permission>), StoreError>
where
    D: Directory + ?Sized,
{
    let roles = directory.roles_of_user(id).await?;

    let mut names = std::collections::BTreeSet::new();
    let mut keys = std::collections::BTreeSet::new();
    for role in &roles {
        names.insert(role.name.clone());
        for p in directory.permissions_of_role(role.id).await? {
            keys.insert(p.key);
        }
    }

    Ok((names.into_iter().collect(), keys.into_iter().collect()))
}
