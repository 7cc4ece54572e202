//! User account record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use warden_core::{Entity, TenantId, UserId};

use crate::LoginCounters;

/// A stored user account.
///
/// # Invariants
/// - `username` is globally unique.
/// - `tenant_id = None` marks a global account.
/// - Accounts are deactivated (`is_active = false`), never hard-deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub tenant_id: Option<TenantId>,
    pub is_active: bool,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,

    pub login_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub password_changed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_by: Option<UserId>,
    pub updated_by: Option<UserId>,

    pub version: u64,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        tenant_id: Option<TenantId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UserId::new(),
            username: username.into(),
            password_hash: password_hash.into(),
            tenant_id,
            is_active: true,
            first_name: None,
            last_name: None,
            email: None,
            phone: None,
            avatar_url: None,
            login_attempts: 0,
            locked_until: None,
            last_login_at: None,
            password_changed_at: now,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: None,
            updated_by: None,
            version: 0,
        }
    }

    pub fn counters(&self) -> LoginCounters {
        LoginCounters {
            login_attempts: self.login_attempts,
            locked_until: self.locked_until,
        }
    }

    pub fn apply_counters(&mut self, counters: LoginCounters) {
        self.login_attempts = counters.login_attempts;
        self.locked_until = counters.locked_until;
    }

    /// Stamp a modification by `actor` at `now`.
    pub fn touch(&mut self, actor: Option<UserId>, now: DateTime<Utc>) {
        self.updated_at = now;
        self.updated_by = actor;
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
