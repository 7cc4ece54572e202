//! `warden-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it owns the
//! role hierarchy, the decision engine, route requirements, the lockout state
//! machine, the session claims contract and the credential primitives.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod guard;
pub mod jwt;
pub mod lockout;
pub mod password;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod tenant;
pub mod user;

pub use authorize::{
    AccessDecision, AuthzError, DecisionEngine, DecisionReason, TargetUser, UserSubject,
    is_super_admin,
};
pub use claims::{SessionClaims, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use guard::AccessRequirement;
pub use jwt::{Hs256Jwt, TokenSigner, TokenVerifier};
pub use lockout::{LockState, LockoutPolicy, LoginCounters};
pub use password::{Argon2PasswordHasher, PasswordHasher, PasswordPolicy};
pub use permissions::{Permission, PermissionDefinition};
pub use principal::Principal;
pub use roles::{Role, RoleDefinition, RoleHierarchy};
pub use tenant::Tenant;
pub use user::User;
