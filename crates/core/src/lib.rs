//! `warden-core`: identity foundation building blocks.
//!
//! This crate contains **pure** primitives shared by every layer (no I/O).

pub mod entity;
pub mod error;
pub mod id;
pub mod version;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{PermissionId, RoleId, TenantId, UserId};
pub use version::ExpectedVersion;
