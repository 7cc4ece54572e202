use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use warden_auth::{Permission, PermissionDefinition};

use super::{optional_text, text_field};
use crate::error::ServiceError;
use crate::store::Directory;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewPermission {
    pub key: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct PermissionService {
    directory: Arc<dyn Directory>,
}

impl PermissionService {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    /// The whole catalogue, ordered by key.
    pub async fn list(&self) -> Result<Vec<PermissionDefinition>, ServiceError> {
        Ok(self.directory.list_permissions().await?)
    }

    /// Keys are upper snake case (`MANAGE_REPORTS`).
    pub async fn create(&self, new: NewPermission) -> Result<PermissionDefinition, ServiceError> {
        let key = text_field("permission key", &new.key, 1, 100)?;
        if !key.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
            return Err(ServiceError::validation(
                "permission key may only contain A-Z, 0-9 and underscores",
            ));
        }
        if self.directory.find_permission_by_key(&key).await?.is_some() {
            return Err(ServiceError::conflict("permission key already exists"));
        }

        let description = optional_text("description", new.description, 500)?;
        let permission = PermissionDefinition::new(Permission::new(key), description, Utc::now());
        let permission = self.directory.insert_permission(permission).await?;

        info!(key = %permission.key, "permission created");
        Ok(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn catalogue_grows_with_unique_keys() {
        let fx = Fixture::seeded().await;
        let permissions = fx.services().permissions;
        assert_eq!(permissions.list().await.unwrap().len(), 10);

        let created = permissions
            .create(NewPermission {
                key: "MANAGE_REPORTS".into(),
                description: Some("Can manage reports".into()),
            })
            .await
            .unwrap();
        assert_eq!(created.key, Permission::new("MANAGE_REPORTS"));
        assert_eq!(permissions.list().await.unwrap().len(), 11);

        let dup = permissions
            .create(NewPermission {
                key: "VIEW_USERS".into(),
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(dup.kind(), crate::ErrorKind::Conflict);

        let bad = permissions
            .create(NewPermission {
                key: "view users".into(),
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(bad.kind(), crate::ErrorKind::Validation);
    }
}
