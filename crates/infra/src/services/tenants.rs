use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};

use warden_auth::{Principal, Tenant, is_super_admin};
use warden_core::{ExpectedVersion, TenantId};

use super::{ListQuery, text_field};
use crate::error::ServiceError;
use crate::guard::AccessGuard;
use crate::store::{Directory, ListFilter, Page, TenantScope};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewTenant {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantChanges {
    pub name: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Clone)]
pub struct TenantService {
    directory: Arc<dyn Directory>,
    guard: AccessGuard,
}

impl TenantService {
    pub fn new(directory: Arc<dyn Directory>, guard: AccessGuard) -> Self {
        Self { directory, guard }
    }

    #[instrument(skip(self, principal), fields(requester = %principal.subject_id), err)]
    pub async fn create(&self, principal: &Principal, new: NewTenant) -> Result<Tenant, ServiceError> {
        let name = text_field("tenant name", &new.name, 1, 255)?;
        if self.directory.find_tenant_by_name(&name).await?.is_some() {
            return Err(ServiceError::conflict("tenant name already exists"));
        }

        let mut tenant = Tenant::new(name, Utc::now());
        tenant.created_by = Some(principal.subject_id);
        tenant.updated_by = Some(principal.subject_id);
        let tenant = self.directory.insert_tenant(tenant).await?;

        info!(tenant_id = %tenant.id, name = %tenant.name, "tenant created");
        Ok(tenant)
    }

    pub async fn list(&self, principal: &Principal, query: &ListQuery) -> Result<Page<Tenant>, ServiceError> {
        let scope = if is_super_admin(&principal.roles) {
            TenantScope::All
        } else {
            TenantScope::Exactly(principal.tenant_id)
        };
        let tenants = self
            .directory
            .list_tenants(&ListFilter::new(scope, query.search.clone()))
            .await?;
        Ok(Page::from_items(tenants, query.pagination()))
    }

    pub async fn get(&self, principal: &Principal, id: TenantId) -> Result<Tenant, ServiceError> {
        let tenant = self
            .directory
            .get_tenant(id)
            .await?
            .ok_or(ServiceError::not_found("tenant"))?;
        self.guard.authorize_tenant(principal, Some(tenant.id))?;
        Ok(tenant)
    }

    #[instrument(skip(self, principal), fields(requester = %principal.subject_id), err)]
    pub async fn update(&self, principal: &Principal, id: TenantId, changes: TenantChanges) -> Result<Tenant, ServiceError> {
        let mut tenant = self.get(principal, id).await?;
        let version = tenant.version;

        if let Some(name) = changes.name {
            let name = text_field("tenant name", &name, 1, 255)?;
            if name != tenant.name {
                if self.directory.find_tenant_by_name(&name).await?.is_some() {
                    return Err(ServiceError::conflict("tenant name already exists"));
                }
                tenant.name = name;
            }
        }
        if let Some(active) = changes.is_active {
            tenant.is_active = active;
        }

        tenant.updated_at = Utc::now();
        tenant.updated_by = Some(principal.subject_id);
        let tenant = self.directory.update_tenant(tenant, ExpectedVersion::Exact(version)).await?;

        info!(tenant_id = %tenant.id, active = tenant.is_active, "tenant updated");
        Ok(tenant)
    }

    /// Blocks login for every account of the tenant.
    pub async fn deactivate(&self, principal: &Principal, id: TenantId) -> Result<(), ServiceError> {
        self.update(
            principal,
            id,
            TenantChanges {
                is_active: Some(false),
                ..TenantChanges::default()
            },
        )
        .await?;
        Ok(())
    }
}
