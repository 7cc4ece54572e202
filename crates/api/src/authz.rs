//! Route-level access requirements.
//!
//! Handlers check these before calling into a service; the services
//! themselves apply the per-target decisions (tenant isolation, privileged
//! accounts, role escalation).

use warden_auth::{AccessRequirement, Principal, Role};
use warden_infra::services::Services;

use crate::app::errors;

/// User management: super admins and company admins.
pub fn users() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN, Role::COMPANY_ADMIN])
}

pub fn roles_read() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN, Role::COMPANY_ADMIN])
}

pub fn roles_write() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN])
}

pub fn tenants() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN])
}

pub fn permissions_read() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN, Role::COMPANY_ADMIN])
}

pub fn permissions_write() -> AccessRequirement {
    AccessRequirement::any_role([Role::SUPER_ADMIN])
}

/// Check `requirement` for the current request, rendering the denial.
pub fn require(
    services: &Services,
    principal: &Principal,
    requirement: &AccessRequirement,
) -> Result<(), axum::response::Response> {
    services
        .guard
        .authorize_route(principal, requirement)
        .map_err(errors::service_error_to_response)
}
