//! Infrastructure layer: storage, session/credential handling, resource
//! services, configuration and seed data.

pub mod config;
pub mod error;
pub mod guard;
pub mod seed;
pub mod services;
pub mod session;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, ServiceError};
pub use guard::{AccessGuard, UserAccount};
pub use session::{LoginOutcome, LoginRequest, SessionService, SessionSettings};
pub use store::{Directory, StoreError};
