//! Shared fixtures for in-crate tests.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use warden_auth::{AuthError, DecisionEngine, Hs256Jwt, PasswordHasher, Principal, Role, Tenant, User};
use warden_core::UserId;

use crate::guard::AccessGuard;
use crate::seed::{SeedOptions, SeedReport, seed_directory};
use crate::services::Services;
use crate::session::{SessionService, SessionSettings};
use crate::store::{Directory, InMemoryDirectory, TenantStore, UserStore, effective_access};

pub const ADMIN_PASSWORD: &str = "admin123";
pub const CLIENT_PASSWORD: &str = "client123";
pub const SECRET: &[u8] = b"test-secret";

/// Reversible stand-in for the real hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String, AuthError> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, AuthError> {
        Ok(hash.strip_prefix("plain:") == Some(password))
    }
}

pub struct Fixture {
    pub dir: Arc<InMemoryDirectory>,
    pub seed: SeedReport,
    pub now: DateTime<Utc>,
}

impl Fixture {
    pub async fn seeded() -> Self {
        let dir = Arc::new(InMemoryDirectory::new());
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let options = SeedOptions {
            admin_password: ADMIN_PASSWORD.to_string(),
            client_password: CLIENT_PASSWORD.to_string(),
        };
        let seed = seed_directory(dir.as_ref(), &PlainHasher, &options, now).await.unwrap();
        Self { dir, seed, now }
    }

    pub fn directory(&self) -> Arc<dyn Directory> {
        self.dir.clone()
    }

    pub fn guard(&self) -> AccessGuard {
        AccessGuard::new(self.directory(), DecisionEngine::standard())
    }

    pub fn jwt(&self) -> Hs256Jwt {
        Hs256Jwt::new(SECRET, "warden")
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(
            self.directory(),
            Arc::new(PlainHasher),
            Arc::new(self.jwt()),
            SessionSettings::default(),
        )
    }

    pub fn services(&self) -> Services {
        Services::new(
            self.directory(),
            Arc::new(PlainHasher),
            Arc::new(self.jwt()),
            SessionSettings::default(),
            DecisionEngine::standard(),
        )
    }

    pub async fn principal_of(&self, id: UserId) -> Principal {
        let user = self.dir.get_user(id).await.unwrap().unwrap();
        let (roles, permissions) = effective_access(self.dir.as_ref(), id).await.unwrap();
        Principal::new(id, user.tenant_id, roles, permissions)
    }

    pub fn super_admin_principal(&self) -> Principal {
        Principal::new(
            self.seed.super_admin,
            None,
            vec![Role::SUPER_ADMIN],
            warden_auth::Permission::catalogue().to_vec(),
        )
    }

    pub fn company_admin_principal(&self) -> Principal {
        use warden_auth::Permission;
        Principal::new(
            self.seed.company_admin,
            Some(self.seed.tenant_id),
            vec![Role::COMPANY_ADMIN],
            vec![
                Permission::MANAGE_USERS,
                Permission::VIEW_PERMISSIONS,
                Permission::VIEW_ROLES,
                Permission::VIEW_USERS,
            ],
        )
    }

    pub fn client_principal(&self) -> Principal {
        Principal::new(
            self.seed.client,
            Some(self.seed.tenant_id),
            vec![Role::CLIENT],
            vec![warden_auth::Permission::VIEW_USERS],
        )
    }

    /// Create a CLIENT account in a fresh tenant named `name`.
    pub async fn client_in_new_tenant(&self, name: &str) -> UserId {
        let tenant = self.dir.insert_tenant(Tenant::new(format!("{name} Inc"), self.now)).await.unwrap();
        let user = User::new(name, PlainHasher.hash(CLIENT_PASSWORD).unwrap(), Some(tenant.id), self.now);
        let user = self.dir.insert_user(user).await.unwrap();
        self.dir.set_user_roles(user.id, &[self.seed.client_role]).await.unwrap();
        user.id
    }

    /// Create a user in the seed tenant holding `role_id`.
    pub async fn user_with_role(&self, name: &str, role_id: warden_core::RoleId) -> UserId {
        let user = User::new(name, PlainHasher.hash(CLIENT_PASSWORD).unwrap(), Some(self.seed.tenant_id), self.now);
        let user = self.dir.insert_user(user).await.unwrap();
        self.dir.set_user_roles(user.id, &[role_id]).await.unwrap();
        user.id
    }
}
