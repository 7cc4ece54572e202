//! Session/credential service: login with lockout, token issuance and
//! password changes.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use warden_auth::{
    AuthError, LockState, LockoutPolicy, PasswordHasher, PasswordPolicy, Permission, Principal, Role,
    SessionClaims, TokenSigner,
};
use warden_core::{ExpectedVersion, TenantId, UserId};

use crate::error::ServiceError;
use crate::store::{self, Directory};

/// Issuer, token lifetime and lockout policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub issuer: String,
    pub token_ttl: Duration,
    pub lockout: LockoutPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            issuer: "warden".to_string(),
            token_ttl: Duration::hours(24),
            lockout: LockoutPolicy::default(),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

impl core::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("tenant_id", &self.tenant_id)
            .finish_non_exhaustive()
    }
}

/// A successfully issued session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginOutcome {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub claims: SessionClaims,
}

#[derive(Clone)]
pub struct SessionService {
    directory: Arc<dyn Directory>,
    hasher: Arc<dyn PasswordHasher>,
    signer: Arc<dyn TokenSigner>,
    settings: SessionSettings,
    policy: PasswordPolicy,
}

impl SessionService {
    pub fn new(
        directory: Arc<dyn Directory>,
        hasher: Arc<dyn PasswordHasher>,
        signer: Arc<dyn TokenSigner>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            directory,
            hasher,
            signer,
            settings,
            policy: PasswordPolicy::default(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn hasher(&self) -> &Arc<dyn PasswordHasher> {
        &self.hasher
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome, ServiceError> {
        self.login_at(request, Utc::now()).await
    }

    /// Authenticate at an explicit instant.
    ///
    /// Checks run in a fixed order and each is a hard stop: requested tenant,
    /// username, the account's own tenant, lock, active flag, password.
    #[instrument(skip(self, request), fields(username = %request.username), err)]
    pub async fn login_at(&self, request: &LoginRequest, now: DateTime<Utc>) -> Result<LoginOutcome, ServiceError> {
        let directory = self.directory.as_ref();

        if let Some(tenant_id) = request.tenant_id {
            match directory.get_tenant(tenant_id).await? {
                None => return Err(AuthError::InvalidTenant.into()),
                Some(t) if !t.is_active => return Err(AuthError::TenantDeactivated.into()),
                Some(_) => {}
            }
        }

        let Some(user) = directory
            .find_user_by_username(&request.username, request.tenant_id)
            .await?
        else {
            debug!("unknown username");
            return Err(AuthError::InvalidCredentials.into());
        };

        if let Some(tenant_id) = user.tenant_id {
            let active = directory.get_tenant(tenant_id).await?.is_some_and(|t| t.is_active);
            if !active {
                warn!(user_id = %user.id, "login blocked by deactivated tenant");
                return Err(AuthError::TenantDeactivated.into());
            }
        }

        if let LockState::Locked { until } = user.counters().state_at(now) {
            warn!(user_id = %user.id, %until, "login attempt on locked account");
            return Err(AuthError::AccountLocked { until }.into());
        }

        if !user.is_active {
            return Err(AuthError::AccountDeactivated.into());
        }

        if !self.hasher.verify(&request.password, &user.password_hash)? {
            let counters = directory
                .record_login_failure(user.id, &self.settings.lockout, now)
                .await?;
            warn!(
                user_id = %user.id,
                attempts = counters.login_attempts,
                locked = counters.locked_until.is_some(),
                "invalid password"
            );
            return Err(AuthError::InvalidCredentials.into());
        }

        directory.record_login_success(user.id, now).await?;

        let (roles, permissions) = self.effective_access(user.id).await?;
        let principal = Principal::new(user.id, user.tenant_id, roles, permissions);
        let claims = SessionClaims::issue(&principal, &user.username, &self.settings.issuer, now, self.settings.token_ttl);
        let access_token = self.signer.sign(&claims)?;

        info!(user_id = %user.id, tenant_id = ?user.tenant_id, "login succeeded");
        Ok(LoginOutcome {
            access_token,
            token_type: "Bearer",
            expires_in: claims.expires_in_secs(),
            claims,
        })
    }

    /// Role names and permission-key union across all assigned roles.
    pub async fn effective_access(&self, user_id: UserId) -> Result<(Vec<Role>, Vec<Permission>), ServiceError> {
        Ok(store::effective_access(self.directory.as_ref(), user_id).await?)
    }

    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.change_password_at(user_id, current_password, new_password, Utc::now()).await
    }

    /// Re-verify the current password, then store the new hash.
    #[instrument(skip(self, current_password, new_password), err)]
    pub async fn change_password_at(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let mut user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;

        if !self.hasher.verify(current_password, &user.password_hash)? {
            warn!(user_id = %user_id, "password change rejected");
            return Err(AuthError::CurrentPasswordIncorrect.into());
        }

        self.policy.validate(new_password)?;

        let version = user.version;
        user.password_hash = self.hasher.hash(new_password)?;
        user.password_changed_at = now;
        user.touch(Some(user_id), now);
        self.directory.update_user(user, ExpectedVersion::Exact(version)).await?;

        info!(user_id = %user_id, "password changed");
        Ok(())
    }
}

impl core::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionService")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
