//! Route-level access requirements.

use crate::{AuthzError, Permission, Principal, Role, RoleHierarchy};

/// A disjunction of predicates a route places on its caller.
///
/// The caller passes if **any** of: holds one of `any_role`, ranks at or
/// above `role_at_least`, or holds one of `any_permission`. An empty
/// requirement is open to every authenticated caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessRequirement {
    any_role: Vec<Role>,
    role_at_least: Option<Role>,
    any_permission: Vec<Permission>,
}

impl AccessRequirement {
    pub fn open() -> Self {
        Self::default()
    }

    pub fn any_role(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            any_role: roles.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn at_least(role: Role) -> Self {
        Self {
            role_at_least: Some(role),
            ..Self::default()
        }
    }

    pub fn any_permission(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            any_permission: permissions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn or_role(mut self, role: Role) -> Self {
        self.any_role.push(role);
        self
    }

    pub fn or_permission(mut self, permission: Permission) -> Self {
        self.any_permission.push(permission);
        self
    }

    pub fn is_open(&self) -> bool {
        self.any_role.is_empty() && self.role_at_least.is_none() && self.any_permission.is_empty()
    }

    pub fn check(&self, principal: &Principal, hierarchy: &RoleHierarchy) -> Result<(), AuthzError> {
        if self.is_open() {
            return Ok(());
        }

        let by_role = self.any_role.iter().any(|r| principal.has_role(r));
        let by_level = self
            .role_at_least
            .as_ref()
            .is_some_and(|min| hierarchy.has_at_least(&principal.roles, min));
        let by_permission = self.any_permission.iter().any(|p| principal.has_permission(p));

        if by_role || by_level || by_permission {
            Ok(())
        } else {
            Err(AuthzError::InsufficientPermissions)
        }
    }
}

#[cfg(test)]
mod tests {
    use warden_core::UserId;

    use super::*;

    fn caller(roles: &[Role], perms: &[Permission]) -> Principal {
        Principal::new(UserId::new(), None, roles.to_vec(), perms.to_vec())
    }

    fn h() -> &'static RoleHierarchy {
        RoleHierarchy::standard()
    }

    #[test]
    fn open_requirement_admits_role_less_caller() {
        assert!(AccessRequirement::open().check(&caller(&[], &[]), h()).is_ok());
    }

    #[test]
    fn role_set_membership() {
        let req = AccessRequirement::any_role([Role::SUPER_ADMIN]).or_role(Role::COMPANY_ADMIN);
        assert!(req.check(&caller(&[Role::COMPANY_ADMIN], &[]), h()).is_ok());
        assert_eq!(
            req.check(&caller(&[Role::CLIENT], &[]), h()),
            Err(AuthzError::InsufficientPermissions)
        );
    }

    #[test]
    fn minimum_level_admits_higher_roles() {
        let req = AccessRequirement::at_least(Role::COMPANY_ADMIN);
        assert!(req.check(&caller(&[Role::SUPER_ADMIN], &[]), h()).is_ok());
        assert!(req.check(&caller(&[Role::CLIENT], &[]), h()).is_err());
    }

    #[test]
    fn permission_alternative_rescues_low_role() {
        let req = AccessRequirement::any_role([Role::SUPER_ADMIN]).or_permission(Permission::MANAGE_USERS);
        assert!(req.check(&caller(&[Role::CLIENT], &[Permission::MANAGE_USERS]), h()).is_ok());
        assert!(
            AccessRequirement::any_permission([Permission::VIEW_ROLES])
                .check(&caller(&[Role::CLIENT], &[Permission::VIEW_USERS]), h())
                .is_err()
        );
    }
}
