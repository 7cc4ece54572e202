//! Infrastructure wiring: storage backend, hasher, token signer and services.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use warden_auth::{Argon2PasswordHasher, AuthError, DecisionEngine, Hs256Jwt, PasswordHasher, TokenVerifier};
use warden_infra::config::{AppConfig, StorageConfig};
use warden_infra::seed::seed_directory;
use warden_infra::services::Services;
use warden_infra::store::{Directory, InMemoryDirectory, PostgresDirectory, StoreError};
use warden_infra::ServiceError;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),

    #[error("password hasher: {0}")]
    Hasher(#[from] AuthError),

    #[error("seeding: {0}")]
    Seed(#[from] ServiceError),
}

/// Everything the handlers need, shared across requests.
#[derive(Clone)]
pub struct AppServices {
    pub services: Arc<Services>,
    pub verifier: Arc<dyn TokenVerifier>,
}

impl AppServices {
    pub fn new(
        directory: Arc<dyn Directory>,
        hasher: Arc<dyn PasswordHasher>,
        config: &AppConfig,
    ) -> Self {
        let jwt = Arc::new(Hs256Jwt::new(config.jwt_secret.as_bytes(), &config.session.issuer));
        let services = Services::new(
            directory,
            hasher,
            jwt.clone(),
            config.session.clone(),
            DecisionEngine::standard(),
        );
        Self {
            services: Arc::new(services),
            verifier: jwt,
        }
    }
}

/// Connect storage, build the hasher, seed if asked, and wire the services.
pub async fn build_services(config: &AppConfig) -> Result<AppServices, BootstrapError> {
    let directory: Arc<dyn Directory> = match &config.storage {
        StorageConfig::InMemory => {
            info!("using in-memory directory");
            Arc::new(InMemoryDirectory::new())
        }
        StorageConfig::Postgres { url, max_connections } => {
            let pg = PostgresDirectory::connect(url, *max_connections).await?;
            pg.ensure_schema().await?;
            info!(max_connections, "connected to postgres directory");
            Arc::new(pg)
        }
    };

    let hasher: Arc<dyn PasswordHasher> = match (config.hash_cost.memory_kib, config.hash_cost.iterations) {
        (None, None) => Arc::new(Argon2PasswordHasher::new(config.password_pepper.clone())),
        (memory_kib, iterations) => Arc::new(Argon2PasswordHasher::with_cost(
            config.password_pepper.clone(),
            memory_kib.unwrap_or(argon2_default::MEMORY_KIB),
            iterations.unwrap_or(argon2_default::ITERATIONS),
        )?),
    };

    if config.seed_on_start {
        let report = seed_directory(directory.as_ref(), hasher.as_ref(), &config.seed, Utc::now()).await?;
        info!(created = report.created, tenant_id = %report.tenant_id, "seed data ensured");
    }

    Ok(AppServices::new(directory, hasher, config))
}

/// Argon2id defaults used when only one cost knob is configured.
mod argon2_default {
    pub const MEMORY_KIB: u32 = 19 * 1024;
    pub const ITERATIONS: u32 = 2;
}
