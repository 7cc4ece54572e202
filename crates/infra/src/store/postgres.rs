//! Postgres-backed identity directory.
//!
//! ## Error mapping
//!
//! | SQLx error | Postgres code | `StoreError` |
//! |------------|---------------|--------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key violation) | `23503` | `Conflict` |
//! | Database (other) | any | `Backend` |
//! | PoolClosed / network / decode | n/a | `Backend` |
//!
//! Version checks are done in the `WHERE` clause of each `UPDATE`; zero
//! affected rows is disambiguated into `NotFound` or `Concurrency`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::instrument;
use uuid::Uuid;

use warden_auth::{
    LockoutPolicy, LoginCounters, Permission, PermissionDefinition, Role, RoleDefinition, Tenant, User,
};
use warden_core::{ExpectedVersion, PermissionId, RoleId, TenantId, UserId};

use super::{ListFilter, PermissionStore, RoleStore, StoreError, TenantScope, TenantStore, UserStore};

/// Schema statements applied by [`PostgresDirectory::ensure_schema`].
///
/// All statements are idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS tenants (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        is_active   BOOLEAN NOT NULL DEFAULT TRUE,
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        deleted_at  TIMESTAMPTZ,
        created_by  UUID,
        updated_by  UUID,
        version     BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id                  UUID PRIMARY KEY,
        username            TEXT NOT NULL UNIQUE,
        password_hash       TEXT NOT NULL,
        tenant_id           UUID REFERENCES tenants(id),
        is_active           BOOLEAN NOT NULL DEFAULT TRUE,
        first_name          TEXT,
        last_name           TEXT,
        email               TEXT,
        phone               TEXT,
        avatar_url          TEXT,
        login_attempts      INTEGER NOT NULL DEFAULT 0,
        locked_until        TIMESTAMPTZ,
        last_login_at       TIMESTAMPTZ,
        password_changed_at TIMESTAMPTZ NOT NULL,
        created_at          TIMESTAMPTZ NOT NULL,
        updated_at          TIMESTAMPTZ NOT NULL,
        deleted_at          TIMESTAMPTZ,
        created_by          UUID,
        updated_by          UUID,
        version             BIGINT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS users_tenant_idx ON users (tenant_id)",
    r#"
    CREATE TABLE IF NOT EXISTS roles (
        id          UUID PRIMARY KEY,
        name        TEXT NOT NULL,
        description TEXT,
        tenant_id   UUID REFERENCES tenants(id),
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL,
        deleted_at  TIMESTAMPTZ,
        created_by  UUID,
        updated_by  UUID,
        version     BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS roles_live_name_uidx
        ON roles (name, COALESCE(tenant_id, '00000000-0000-0000-0000-000000000000'::uuid))
        WHERE deleted_at IS NULL
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS permissions (
        id          UUID PRIMARY KEY,
        key         TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS user_roles (
        user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        role_id UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        PRIMARY KEY (user_id, role_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS role_permissions (
        role_id       UUID NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission_id UUID NOT NULL REFERENCES permissions(id) ON DELETE CASCADE,
        PRIMARY KEY (role_id, permission_id)
    )
    "#,
];

const USER_COLUMNS: &str = "id, username, password_hash, tenant_id, is_active, first_name, last_name, \
     email, phone, avatar_url, login_attempts, locked_until, last_login_at, password_changed_at, \
     created_at, updated_at, deleted_at, created_by, updated_by, version";

const TENANT_COLUMNS: &str =
    "id, name, is_active, created_at, updated_at, deleted_at, created_by, updated_by, version";

const ROLE_COLUMNS: &str =
    "id, name, description, tenant_id, created_at, updated_at, deleted_at, created_by, updated_by, version";

/// Postgres-backed implementation of every directory store.
#[derive(Debug, Clone)]
pub struct PostgresDirectory {
    pool: Arc<PgPool>,
}

impl PostgresDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    /// Resolve a zero-row `UPDATE` into the right error.
    async fn missing_or_stale(&self, table: &'static str, entity: &'static str, id: Uuid) -> StoreError {
        let sql = format!("SELECT version FROM {table} WHERE id = $1");
        match sqlx::query(&sql).bind(id).fetch_optional(&*self.pool).await {
            Ok(Some(row)) => {
                let found: i64 = row.try_get("version").unwrap_or_default();
                StoreError::Concurrency(format!("{entity} {id} was modified concurrently (now at version {found})"))
            }
            Ok(None) => StoreError::NotFound(entity),
            Err(e) => map_sqlx_error("missing_or_stale", e),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn version_of(row: &PgRow) -> Result<u64, StoreError> {
    Ok(col::<i64>(row, "version")?.max(0) as u64)
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        id: UserId::from_uuid(col(row, "id")?),
        username: col(row, "username")?,
        password_hash: col(row, "password_hash")?,
        tenant_id: col::<Option<Uuid>>(row, "tenant_id")?.map(TenantId::from_uuid),
        is_active: col(row, "is_active")?,
        first_name: col(row, "first_name")?,
        last_name: col(row, "last_name")?,
        email: col(row, "email")?,
        phone: col(row, "phone")?,
        avatar_url: col(row, "avatar_url")?,
        login_attempts: col::<i32>(row, "login_attempts")?.max(0) as u32,
        locked_until: col(row, "locked_until")?,
        last_login_at: col(row, "last_login_at")?,
        password_changed_at: col(row, "password_changed_at")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        deleted_at: col(row, "deleted_at")?,
        created_by: col::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        updated_by: col::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
        version: version_of(row)?,
    })
}

fn tenant_from_row(row: &PgRow) -> Result<Tenant, StoreError> {
    Ok(Tenant {
        id: TenantId::from_uuid(col(row, "id")?),
        name: col(row, "name")?,
        is_active: col(row, "is_active")?,
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        deleted_at: col(row, "deleted_at")?,
        created_by: col::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        updated_by: col::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
        version: version_of(row)?,
    })
}

fn role_from_row(row: &PgRow) -> Result<RoleDefinition, StoreError> {
    Ok(RoleDefinition {
        id: RoleId::from_uuid(col(row, "id")?),
        name: Role::new(col::<String>(row, "name")?),
        description: col(row, "description")?,
        tenant_id: col::<Option<Uuid>>(row, "tenant_id")?.map(TenantId::from_uuid),
        created_at: col(row, "created_at")?,
        updated_at: col(row, "updated_at")?,
        deleted_at: col(row, "deleted_at")?,
        created_by: col::<Option<Uuid>>(row, "created_by")?.map(UserId::from_uuid),
        updated_by: col::<Option<Uuid>>(row, "updated_by")?.map(UserId::from_uuid),
        version: version_of(row)?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<PermissionDefinition, StoreError> {
    Ok(PermissionDefinition {
        id: PermissionId::from_uuid(col(row, "id")?),
        key: Permission::new(col::<String>(row, "key")?),
        description: col(row, "description")?,
        created_at: col(row, "created_at")?,
    })
}

fn uuid_opt<T: Into<Uuid>>(id: Option<T>) -> Option<Uuid> {
    id.map(Into::into)
}

/// `(mode, tenant)` bind pair consumed by [`SCOPE_PREDICATE`].
fn scope_params(scope: TenantScope) -> (i16, Option<Uuid>) {
    match scope {
        TenantScope::All => (0, None),
        TenantScope::Exactly(t) => (1, uuid_opt(t)),
        TenantScope::WithGlobal(t) => (2, uuid_opt(t)),
    }
}

/// Expects `$1` = scope mode, `$2` = tenant, `$3` = ILIKE pattern; the
/// caller substitutes the tenant and name columns.
const SCOPE_PREDICATE: &str = "($1 = 0 \
     OR ($1 = 1 AND {tenant} IS NOT DISTINCT FROM $2) \
     OR ($1 = 2 AND ({tenant} IS NULL OR {tenant} IS NOT DISTINCT FROM $2))) \
     AND ($3::TEXT IS NULL OR {name} ILIKE $3)";

fn scope_predicate(tenant_column: &str, name_column: &str) -> String {
    SCOPE_PREDICATE
        .replace("{tenant}", tenant_column)
        .replace("{name}", name_column)
}

fn expected_param(expected: ExpectedVersion) -> Option<i64> {
    match expected {
        ExpectedVersion::Any => None,
        ExpectedVersion::Exact(v) => Some(v as i64),
    }
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {operation}")),
        other => StoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl UserStore for PostgresDirectory {
    #[instrument(skip(self, user), fields(username = %user.username), err)]
    async fn insert_user(&self, user: User) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"
        );
        sqlx::query(&sql)
            .bind(user.id.as_uuid())
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(uuid_opt(user.tenant_id))
            .bind(user.is_active)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.avatar_url)
            .bind(user.login_attempts as i32)
            .bind(user.locked_until)
            .bind(user.last_login_at)
            .bind(user.password_changed_at)
            .bind(user.created_at)
            .bind(user.updated_at)
            .bind(user.deleted_at)
            .bind(uuid_opt(user.created_by))
            .bind(uuid_opt(user.updated_by))
            .bind(user.version as i64)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_user", e))?;
        Ok(user)
    }

    #[instrument(skip(self), err)]
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_user", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_user_by_username(
        &self,
        username: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND ($2::UUID IS NULL OR tenant_id = $2)"
        );
        let row = sqlx::query(&sql)
            .bind(username)
            .bind(uuid_opt(tenant_id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_user_by_username", e))?;
        row.as_ref().map(user_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, filter: &ListFilter) -> Result<Vec<User>, StoreError> {
        let (mode, tenant) = scope_params(filter.tenant);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} ORDER BY created_at DESC",
            scope_predicate("tenant_id", "username")
        );
        let rows = sqlx::query(&sql)
            .bind(mode)
            .bind(tenant)
            .bind(filter.like_pattern())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_users", e))?;
        rows.iter().map(user_from_row).collect()
    }

    #[instrument(skip(self, user), fields(user_id = %user.id), err)]
    async fn update_user(&self, user: User, expected: ExpectedVersion) -> Result<User, StoreError> {
        let sql = format!(
            "UPDATE users SET \
                 username = $2, password_hash = $3, tenant_id = $4, is_active = $5, \
                 first_name = $6, last_name = $7, email = $8, phone = $9, avatar_url = $10, \
                 password_changed_at = $11, updated_at = $12, deleted_at = $13, updated_by = $14, \
                 version = version + 1 \
             WHERE id = $1 AND ($15::BIGINT IS NULL OR version = $15) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(user.id.as_uuid())
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(uuid_opt(user.tenant_id))
            .bind(user.is_active)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.email)
            .bind(&user.phone)
            .bind(&user.avatar_url)
            .bind(user.password_changed_at)
            .bind(user.updated_at)
            .bind(user.deleted_at)
            .bind(uuid_opt(user.updated_by))
            .bind(expected_param(expected))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_user", e))?;

        match row {
            Some(row) => user_from_row(&row),
            None => Err(self.missing_or_stale("users", "user", *user.id.as_uuid()).await),
        }
    }

    #[instrument(skip(self, policy), err)]
    async fn record_login_failure(
        &self,
        id: UserId,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<LoginCounters, StoreError> {
        // Every right-hand side sees the pre-update row, so `expired` and the
        // new counter are evaluated consistently in a single statement.
        let row = sqlx::query(
            r#"
            UPDATE users SET
                login_attempts = CASE
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                    ELSE login_attempts + 1
                END,
                locked_until = CASE
                    WHEN (CASE
                            WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN 1
                            ELSE login_attempts + 1
                          END) >= $3 THEN $4
                    WHEN locked_until IS NOT NULL AND locked_until <= $2 THEN NULL
                    ELSE locked_until
                END
            WHERE id = $1
            RETURNING login_attempts, locked_until
            "#,
        )
        .bind(id.as_uuid())
        .bind(now)
        .bind(policy.max_attempts.min(i32::MAX as u32) as i32)
        .bind(now + policy.lock_duration)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_login_failure", e))?
        .ok_or(StoreError::NotFound("user"))?;

        Ok(LoginCounters {
            login_attempts: col::<i32>(&row, "login_attempts")?.max(0) as u32,
            locked_until: col(&row, "locked_until")?,
        })
    }

    #[instrument(skip(self), err)]
    async fn record_login_success(&self, id: UserId, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE users SET login_attempts = 0, locked_until = NULL, last_login_at = $2 WHERE id = $1",
        )
        .bind(id.as_uuid())
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record_login_success", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("user"));
        }
        Ok(())
    }

    #[instrument(skip(self, roles), fields(role_count = roles.len()), err)]
    async fn set_user_roles(&self, id: UserId, roles: &[RoleId]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists = sqlx::query("SELECT 1 FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;
        if exists.is_none() {
            return Err(StoreError::NotFound("user"));
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_user_roles", e))?;

        let role_ids: Vec<Uuid> = roles.iter().map(|r| *r.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) \
             SELECT $1, r FROM UNNEST($2::UUID[]) AS r ON CONFLICT DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(&role_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_user_roles", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn roles_of_user(&self, id: UserId) -> Result<Vec<RoleDefinition>, StoreError> {
        let sql = format!(
            "SELECT {} FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
             WHERE ur.user_id = $1 AND r.deleted_at IS NULL ORDER BY r.name",
            qualified("r", ROLE_COLUMNS)
        );
        let rows = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles_of_user", e))?;
        rows.iter().map(role_from_row).collect()
    }
}

fn qualified(alias: &str, columns: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tenants
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl TenantStore for PostgresDirectory {
    #[instrument(skip(self, tenant), fields(name = %tenant.name), err)]
    async fn insert_tenant(&self, tenant: Tenant) -> Result<Tenant, StoreError> {
        let sql = format!("INSERT INTO tenants ({TENANT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)");
        sqlx::query(&sql)
            .bind(tenant.id.as_uuid())
            .bind(&tenant.name)
            .bind(tenant.is_active)
            .bind(tenant.created_at)
            .bind(tenant.updated_at)
            .bind(tenant.deleted_at)
            .bind(uuid_opt(tenant.created_by))
            .bind(uuid_opt(tenant.updated_by))
            .bind(tenant.version as i64)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_tenant", e))?;
        Ok(tenant)
    }

    #[instrument(skip(self), err)]
    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, StoreError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_tenant", e))?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_tenant_by_name(&self, name: &str) -> Result<Option<Tenant>, StoreError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_tenant_by_name", e))?;
        row.as_ref().map(tenant_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_tenants(&self, filter: &ListFilter) -> Result<Vec<Tenant>, StoreError> {
        let (mode, tenant) = scope_params(filter.tenant);
        let sql = format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE {} ORDER BY created_at DESC",
            scope_predicate("id", "name")
        );
        let rows = sqlx::query(&sql)
            .bind(mode)
            .bind(tenant)
            .bind(filter.like_pattern())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_tenants", e))?;
        rows.iter().map(tenant_from_row).collect()
    }

    #[instrument(skip(self, tenant), fields(tenant_id = %tenant.id), err)]
    async fn update_tenant(&self, tenant: Tenant, expected: ExpectedVersion) -> Result<Tenant, StoreError> {
        let sql = format!(
            "UPDATE tenants SET name = $2, is_active = $3, updated_at = $4, deleted_at = $5, \
                 updated_by = $6, version = version + 1 \
             WHERE id = $1 AND ($7::BIGINT IS NULL OR version = $7) \
             RETURNING {TENANT_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(tenant.id.as_uuid())
            .bind(&tenant.name)
            .bind(tenant.is_active)
            .bind(tenant.updated_at)
            .bind(tenant.deleted_at)
            .bind(uuid_opt(tenant.updated_by))
            .bind(expected_param(expected))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_tenant", e))?;

        match row {
            Some(row) => tenant_from_row(&row),
            None => Err(self.missing_or_stale("tenants", "tenant", *tenant.id.as_uuid()).await),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl RoleStore for PostgresDirectory {
    #[instrument(skip(self, role), fields(name = %role.name), err)]
    async fn insert_role(&self, role: RoleDefinition) -> Result<RoleDefinition, StoreError> {
        let sql = format!("INSERT INTO roles ({ROLE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)");
        sqlx::query(&sql)
            .bind(role.id.as_uuid())
            .bind(role.name.as_str())
            .bind(&role.description)
            .bind(uuid_opt(role.tenant_id))
            .bind(role.created_at)
            .bind(role.updated_at)
            .bind(role.deleted_at)
            .bind(uuid_opt(role.created_by))
            .bind(uuid_opt(role.updated_by))
            .bind(role.version as i64)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_role", e))?;
        Ok(role)
    }

    #[instrument(skip(self), err)]
    async fn get_role(&self, id: RoleId) -> Result<Option<RoleDefinition>, StoreError> {
        let sql = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_role", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_role_by_name(
        &self,
        name: &str,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<RoleDefinition>, StoreError> {
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles \
             WHERE name = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND deleted_at IS NULL"
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(uuid_opt(tenant_id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_role_by_name", e))?;
        row.as_ref().map(role_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_roles(&self, filter: &ListFilter) -> Result<Vec<RoleDefinition>, StoreError> {
        let (mode, tenant) = scope_params(filter.tenant);
        let sql = format!(
            "SELECT {ROLE_COLUMNS} FROM roles WHERE deleted_at IS NULL AND {} ORDER BY created_at DESC",
            scope_predicate("tenant_id", "name")
        );
        let rows = sqlx::query(&sql)
            .bind(mode)
            .bind(tenant)
            .bind(filter.like_pattern())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_roles", e))?;
        rows.iter().map(role_from_row).collect()
    }

    #[instrument(skip(self, role), fields(role_id = %role.id), err)]
    async fn update_role(
        &self,
        role: RoleDefinition,
        expected: ExpectedVersion,
    ) -> Result<RoleDefinition, StoreError> {
        let sql = format!(
            "UPDATE roles SET name = $2, description = $3, tenant_id = $4, updated_at = $5, \
                 deleted_at = $6, updated_by = $7, version = version + 1 \
             WHERE id = $1 AND ($8::BIGINT IS NULL OR version = $8) \
             RETURNING {ROLE_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(role.id.as_uuid())
            .bind(role.name.as_str())
            .bind(&role.description)
            .bind(uuid_opt(role.tenant_id))
            .bind(role.updated_at)
            .bind(role.deleted_at)
            .bind(uuid_opt(role.updated_by))
            .bind(expected_param(expected))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_role", e))?;

        match row {
            Some(row) => role_from_row(&row),
            None => Err(self.missing_or_stale("roles", "role", *role.id.as_uuid()).await),
        }
    }

    #[instrument(skip(self, permissions), fields(permission_count = permissions.len()), err)]
    async fn set_role_permissions(&self, id: RoleId, permissions: &[PermissionId]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let exists = sqlx::query("SELECT 1 FROM roles WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_role_permissions", e))?;
        if exists.is_none() {
            return Err(StoreError::NotFound("role"));
        }

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_role_permissions", e))?;

        let permission_ids: Vec<Uuid> = permissions.iter().map(|p| *p.as_uuid()).collect();
        sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) \
             SELECT $1, p FROM UNNEST($2::UUID[]) AS p ON CONFLICT DO NOTHING",
        )
        .bind(id.as_uuid())
        .bind(&permission_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_role_permissions", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    #[instrument(skip(self), err)]
    async fn permissions_of_role(&self, id: RoleId) -> Result<Vec<PermissionDefinition>, StoreError> {
        let rows = sqlx::query(
            "SELECT p.id, p.key, p.description, p.created_at FROM permissions p \
             JOIN role_permissions rp ON rp.permission_id = p.id \
             WHERE rp.role_id = $1 ORDER BY p.key",
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("permissions_of_role", e))?;
        rows.iter().map(permission_from_row).collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl PermissionStore for PostgresDirectory {
    #[instrument(skip(self, permission), fields(key = %permission.key), err)]
    async fn insert_permission(&self, permission: PermissionDefinition) -> Result<PermissionDefinition, StoreError> {
        sqlx::query("INSERT INTO permissions (id, key, description, created_at) VALUES ($1, $2, $3, $4)")
            .bind(permission.id.as_uuid())
            .bind(permission.key.as_str())
            .bind(&permission.description)
            .bind(permission.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_permission", e))?;
        Ok(permission)
    }

    #[instrument(skip(self), err)]
    async fn get_permission(&self, id: PermissionId) -> Result<Option<PermissionDefinition>, StoreError> {
        let row = sqlx::query("SELECT id, key, description, created_at FROM permissions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_permission", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_permission_by_key(&self, key: &str) -> Result<Option<PermissionDefinition>, StoreError> {
        let row = sqlx::query("SELECT id, key, description, created_at FROM permissions WHERE key = $1")
            .bind(key)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_permission_by_key", e))?;
        row.as_ref().map(permission_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_permissions(&self) -> Result<Vec<PermissionDefinition>, StoreError> {
        let rows = sqlx::query("SELECT id, key, description, created_at FROM permissions ORDER BY key")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_permissions", e))?;
        rows.iter().map(permission_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_predicate_substitutes_columns() {
        let sql = scope_predicate("tenant_id", "username");
        assert!(sql.contains("tenant_id IS NOT DISTINCT FROM $2"));
        assert!(sql.contains("username ILIKE $3"));
        assert!(!sql.contains('{'));
    }

    #[test]
    fn scope_modes_are_distinct() {
        let t = TenantId::new();
        assert_eq!(scope_params(TenantScope::All), (0, None));
        assert_eq!(scope_params(TenantScope::Exactly(Some(t))), (1, Some(*t.as_uuid())));
        assert_eq!(scope_params(TenantScope::WithGlobal(None)), (2, None));
    }

    #[test]
    fn qualified_prefixes_every_column() {
        assert_eq!(qualified("r", "id, name"), "r.id, r.name");
    }

    #[test]
    fn non_database_errors_are_backend_errors() {
        let err = map_sqlx_error("get_user", sqlx::Error::PoolClosed);
        assert!(matches!(err, StoreError::Backend(msg) if msg.contains("get_user")));
    }
}
