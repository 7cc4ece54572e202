use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use warden_auth::{PermissionDefinition, SessionClaims, Tenant, User};
use warden_core::{PermissionId, RoleId, TenantId, UserId};
use warden_infra::services::{Profile, RoleDetails};
use warden_infra::store::Page;
use warden_infra::{LoginOutcome, UserAccount};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl core::fmt::Debug for ChangePasswordRequest {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ChangePasswordRequest").finish_non_exhaustive()
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub has_more: bool,
}

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> PageResponse<T> {
    pub fn from_page<S>(page: Page<S>, f: impl FnMut(S) -> T) -> Self {
        let meta = PageMeta {
            total: page.total,
            page: page.pagination.page(),
            limit: page.pagination.limit,
            total_pages: page.total_pages(),
            has_more: page.has_more,
        };
        Self {
            data: page.items.into_iter().map(f).collect(),
            meta,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub id: RoleId,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub tenant_id: Option<TenantId>,
    pub is_active: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub avatar_url: Option<String>,
    pub roles: Vec<RoleRef>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    fn with_roles(user: User, roles: Vec<RoleRef>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            tenant_id: user.tenant_id,
            is_active: user.is_active,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            phone: user.phone,
            avatar_url: user.avatar_url,
            roles,
            last_login_at: user.last_login_at,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl From<UserAccount> for UserResponse {
    fn from(account: UserAccount) -> Self {
        let roles = account
            .roles
            .iter()
            .map(|r| RoleRef {
                id: r.id,
                name: r.name.as_str().to_string(),
            })
            .collect();
        Self::with_roles(account.user, roles)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    pub id: PermissionId,
    pub key: String,
    pub description: Option<String>,
}

impl From<PermissionDefinition> for PermissionResponse {
    fn from(def: PermissionDefinition) -> Self {
        Self {
            id: def.id,
            key: def.key.as_str().to_string(),
            description: def.description,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub permissions: Vec<PermissionResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<RoleDetails> for RoleResponse {
    fn from(details: RoleDetails) -> Self {
        let role = details.role;
        Self {
            id: role.id,
            name: role.name.as_str().to_string(),
            description: role.description,
            tenant_id: role.tenant_id,
            permissions: details.permissions.into_iter().map(PermissionResponse::from).collect(),
            created_at: role.created_at,
            updated_at: role.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantResponse {
    pub id: TenantId,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tenant> for TenantResponse {
    fn from(t: Tenant) -> Self {
        Self {
            id: t.id,
            name: t.name,
            is_active: t.is_active,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: UserId,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub tenant_id: Option<TenantId>,
    pub tenant_name: Option<String>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<Profile> for ProfileResponse {
    fn from(profile: Profile) -> Self {
        let user = profile.user;
        Self {
            id: user.id,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            tenant_id: user.tenant_id,
            tenant_name: profile.tenant.map(|t| t.name),
            roles: profile.roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions: profile.permissions.iter().map(|p| p.as_str().to_string()).collect(),
            last_login_at: user.last_login_at,
        }
    }
}

/// Claims as echoed back to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimsResponse {
    pub sub: UserId,
    pub username: String,
    pub tenant_id: Option<TenantId>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<SessionClaims> for ClaimsResponse {
    fn from(claims: SessionClaims) -> Self {
        Self {
            sub: claims.sub,
            username: claims.username,
            tenant_id: claims.tenant_id,
            roles: claims.roles.iter().map(|r| r.as_str().to_string()).collect(),
            permissions: claims.permissions.iter().map(|p| p.as_str().to_string()).collect(),
            issued_at: Utc.timestamp_opt(claims.iat, 0).single(),
            expires_at: Utc.timestamp_opt(claims.exp, 0).single(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: ClaimsResponse,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            access_token: outcome.access_token,
            token_type: outcome.token_type,
            expires_in: outcome.expires_in,
            user: ClaimsResponse::from(outcome.claims),
        }
    }
}
