//! Idempotent bootstrap data: permission catalogue, global roles, a demo
//! tenant and one account per role.

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use warden_auth::{Permission, PermissionDefinition, PasswordHasher, Role, RoleDefinition, Tenant, User};
use warden_core::{PermissionId, RoleId, TenantId, UserId};

use crate::error::ServiceError;
use crate::store::Directory;

pub const SEED_TENANT: &str = "Acme Corp";

/// Passwords for the seeded accounts. Seeding bypasses the strength policy.
#[derive(Clone, PartialEq, Eq)]
pub struct SeedOptions {
    pub admin_password: String,
    pub client_password: String,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            admin_password: "admin123".to_string(),
            client_password: "client123".to_string(),
        }
    }
}

impl core::fmt::Debug for SeedOptions {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SeedOptions").finish_non_exhaustive()
    }
}

/// Ids of the seeded records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub tenant_id: TenantId,
    pub super_admin_role: RoleId,
    pub company_admin_role: RoleId,
    pub client_role: RoleId,
    pub super_admin: UserId,
    pub company_admin: UserId,
    pub client: UserId,
    /// Records created by this run (0 on a re-run).
    pub created: usize,
}

fn description(key: &Permission) -> &'static str {
    match key.as_str() {
        "MANAGE_COMPANIES" => "Can manage companies/tenants",
        "VIEW_COMPANIES" => "Can view companies/tenants",
        "MANAGE_USERS" => "Can manage users",
        "VIEW_USERS" => "Can view users",
        "MANAGE_COMPANY_ADMINS" => "Can manage company admins",
        "VIEW_COMPANY_ADMINS" => "Can view company admins",
        "MANAGE_ROLES" => "Can manage roles",
        "VIEW_ROLES" => "Can view roles",
        "MANAGE_PERMISSIONS" => "Can manage permissions",
        "VIEW_PERMISSIONS" => "Can view permissions",
        _ => "",
    }
}

fn grants(role: &Role) -> Vec<Permission> {
    if *role == Role::SUPER_ADMIN {
        Permission::catalogue().to_vec()
    } else if *role == Role::COMPANY_ADMIN {
        vec![
            Permission::MANAGE_USERS,
            Permission::VIEW_USERS,
            Permission::VIEW_ROLES,
            Permission::VIEW_PERMISSIONS,
        ]
    } else if *role == Role::CLIENT {
        vec![Permission::VIEW_USERS]
    } else {
        Vec::new()
    }
}

#[instrument(skip_all, err)]
pub async fn seed_directory(
    directory: &dyn Directory,
    hasher: &dyn PasswordHasher,
    options: &SeedOptions,
    now: DateTime<Utc>,
) -> Result<SeedReport, ServiceError> {
    let mut created = 0;

    let mut permission_ids: Vec<(Permission, PermissionId)> = Vec::new();
    for key in Permission::catalogue() {
        let def = match directory.find_permission_by_key(key.as_str()).await? {
            Some(existing) => existing,
            None => {
                created += 1;
                let def = PermissionDefinition::new(key.clone(), Some(description(&key).to_string()), now);
                directory.insert_permission(def).await?
            }
        };
        permission_ids.push((key, def.id));
    }

    let mut role_ids = Vec::new();
    for name in [Role::SUPER_ADMIN, Role::COMPANY_ADMIN, Role::CLIENT] {
        let role = match directory.find_role_by_name(name.as_str(), None).await? {
            Some(existing) => existing,
            None => {
                created += 1;
                directory.insert_role(RoleDefinition::new(name.clone(), None, now)).await?
            }
        };
        let wanted = grants(&name);
        let ids: Vec<PermissionId> = permission_ids
            .iter()
            .filter(|(key, _)| wanted.contains(key))
            .map(|(_, id)| *id)
            .collect();
        directory.set_role_permissions(role.id, &ids).await?;
        role_ids.push(role.id);
    }
    let [super_admin_role, company_admin_role, client_role] = role_ids[..] else {
        return Err(ServiceError::validation("seed role table is incomplete"));
    };

    let tenant = match directory.find_tenant_by_name(SEED_TENANT).await? {
        Some(existing) => existing,
        None => {
            created += 1;
            directory.insert_tenant(Tenant::new(SEED_TENANT, now)).await?
        }
    };

    let accounts = [
        ("superadmin", options.admin_password.as_str(), None, super_admin_role),
        ("companyadmin", options.admin_password.as_str(), Some(tenant.id), company_admin_role),
        ("clientuser", options.client_password.as_str(), Some(tenant.id), client_role),
    ];

    let mut user_ids = Vec::with_capacity(accounts.len());
    for (username, password, tenant_id, role_id) in accounts {
        let user = match directory.find_user_by_username(username, None).await? {
            Some(existing) => existing,
            None => {
                created += 1;
                let user = User::new(username, hasher.hash(password)?, tenant_id, now);
                let user = directory.insert_user(user).await?;
                directory.set_user_roles(user.id, &[role_id]).await?;
                user
            }
        };
        user_ids.push(user.id);
    }
    let [super_admin, company_admin, client] = user_ids[..] else {
        return Err(ServiceError::validation("seed account table is incomplete"));
    };

    info!(created, "directory seeded");
    Ok(SeedReport {
        tenant_id: tenant.id,
        super_admin_role,
        company_admin_role,
        client_role,
        super_admin,
        company_admin,
        client,
        created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryDirectory, PermissionStore, UserStore, effective_access};
    use crate::testing::PlainHasher;

    #[tokio::test]
    async fn seeding_twice_creates_nothing_new() {
        let dir = InMemoryDirectory::new();
        let now = Utc::now();
        let first = seed_directory(&dir, &PlainHasher, &SeedOptions::default(), now).await.unwrap();
        assert_eq!(first.created, 10 + 3 + 1 + 3);

        let second = seed_directory(&dir, &PlainHasher, &SeedOptions::default(), now).await.unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.client, first.client);
        assert_eq!(dir.list_permissions().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn seeded_roles_carry_their_grants() {
        let dir = InMemoryDirectory::new();
        let report = seed_directory(&dir, &PlainHasher, &SeedOptions::default(), Utc::now()).await.unwrap();

        let (roles, perms) = effective_access(&dir, report.super_admin).await.unwrap();
        assert_eq!(roles, vec![Role::SUPER_ADMIN]);
        assert_eq!(perms.len(), 10);

        let (_, perms) = effective_access(&dir, report.company_admin).await.unwrap();
        assert_eq!(
            perms,
            vec![
                Permission::MANAGE_USERS,
                Permission::VIEW_PERMISSIONS,
                Permission::VIEW_ROLES,
                Permission::VIEW_USERS,
            ]
        );

        let (_, perms) = effective_access(&dir, report.client).await.unwrap();
        assert_eq!(perms, vec![Permission::VIEW_USERS]);

        let client = dir.get_user(report.client).await.unwrap().unwrap();
        assert_eq!(client.tenant_id, Some(report.tenant_id));
    }
}
