use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use warden_auth::{Permission, Role, Tenant, User};
use warden_core::{ExpectedVersion, UserId};

use super::{NAME_MAX, USERNAME_MAX, USERNAME_MIN, email_field, optional_text, text_field};
use crate::error::ServiceError;
use crate::session::SessionService;
use crate::store::Directory;

/// The caller's own account with its effective access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub user: User,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub tenant: Option<Tenant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

/// Self-service operations; no decision-engine check beyond being the
/// authenticated subject.
#[derive(Clone)]
pub struct ProfileService {
    directory: Arc<dyn Directory>,
    sessions: SessionService,
}

impl ProfileService {
    pub fn new(directory: Arc<dyn Directory>, sessions: SessionService) -> Self {
        Self { directory, sessions }
    }

    pub async fn get_profile(&self, user_id: UserId) -> Result<Profile, ServiceError> {
        let user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        self.profile_of(user).await
    }

    #[instrument(skip(self, changes), err)]
    pub async fn update_profile(&self, user_id: UserId, changes: ProfileChanges) -> Result<Profile, ServiceError> {
        let mut user = self
            .directory
            .get_user(user_id)
            .await?
            .ok_or(ServiceError::not_found("user"))?;
        let version = user.version;

        if let Some(username) = changes.username {
            let username = text_field("username", &username, USERNAME_MIN, USERNAME_MAX)?;
            if username != user.username {
                if self.directory.find_user_by_username(&username, None).await?.is_some() {
                    return Err(ServiceError::conflict("username already exists"));
                }
                user.username = username;
            }
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

        user.touch(Some(user_id), Utc::now());
        let user = self.directory.update_user(user, ExpectedVersion::Exact(version)).await?;

        info!(user_id = %user_id, "profile updated");
        self.profile_of(user).await
    }

    pub async fn change_password(
        &self,
        user_id: UserId,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        self.sessions.change_password(user_id, current_password, new_password).await
    }

    async fn profile_of(&self, user: User) -> Result<Profile, ServiceError> {
        let (roles, permissions) = self.sessions.effective_access(user.id).await?;
        let tenant = match user.tenant_id {
            Some(id) => self.directory.get_tenant(id).await?,
            None => None,
        };
        Ok(Profile {
            user,
            roles,
            permissions,
            tenant,
        })
    }
}

#[cfg(test)]
mod tests {
    use warden_auth::AuthError;

    use super::*;
    use crate::testing::{CLIENT_PASSWORD, Fixture};

    #[tokio::test]
    async fn profile_carries_roles_permissions_and_tenant() {
        let fx = Fixture::seeded().await;
        let profile = fx.services().profile.get_profile(fx.seed.client).await.unwrap();

        assert_eq!(profile.user.username, "clientuser");
        assert_eq!(profile.roles, vec![Role::CLIENT]);
        assert_eq!(profile.permissions, vec![Permission::VIEW_USERS]);
        assert_eq!(profile.tenant.map(|t| t.name), Some("Acme Corp".to_string()));

        let missing = fx.services().profile.get_profile(UserId::new()).await.unwrap_err();
        assert_eq!(missing, ServiceError::not_found("user"));
    }

    #[tokio::test]
    async fn update_profile_checks_username_uniqueness() {
        let fx = Fixture::seeded().await;
        let profile = fx.services().profile;

        let err = profile
            .update_profile(
                fx.seed.client,
                ProfileChanges {
                    username: Some("superadmin".into()),
                    ..ProfileChanges::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);

        let updated = profile
            .update_profile(
                fx.seed.client,
                ProfileChanges {
                    first_name: Some("Cleo".into()),
                    email: Some("cleo@acme.test".into()),
                    ..ProfileChanges::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.user.first_name.as_deref(), Some("Cleo"));
        assert_eq!(updated.user.updated_by, Some(fx.seed.client));
    }

    #[tokio::test]
    async fn change_password_goes_through_the_session_service() {
        let fx = Fixture::seeded().await;
        let profile = fx.services().profile;

        let err = profile
            .change_password(fx.seed.client, "wrong", "N3w!Passw0rd")
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Unauthorized(AuthError::CurrentPasswordIncorrect));

        profile
            .change_password(fx.seed.client, CLIENT_PASSWORD, "N3w!Passw0rd")
            .await
            .unwrap();
    }
}
