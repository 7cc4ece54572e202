//! Process configuration from environment variables.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use warden_auth::LockoutPolicy;

use crate::seed::SeedOptions;
use crate::session::SessionSettings;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Where identity records live.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { url: String, max_connections: u32 },
}

impl core::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageConfig::InMemory => f.write_str("InMemory"),
            StorageConfig::Postgres { max_connections, .. } => f
                .debug_struct("Postgres")
                .field("max_connections", max_connections)
                .finish_non_exhaustive(),
        }
    }
}

/// Argon2 cost; `None` keeps the library defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashCost {
    pub memory_kib: Option<u32>,
    pub iterations: Option<u32>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_host: String,
    pub port: u16,
    pub environment: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub jwt_secret: String,
    pub session: SessionSettings,
    pub storage: StorageConfig,
    pub password_pepper: Option<String>,
    pub hash_cost: HashCost,
    pub seed_on_start: bool,
    pub seed: SeedOptions,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_host", &self.bind_host)
            .field("port", &self.port)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("session", &self.session)
            .field("storage", &self.storage)
            .field("hash_cost", &self.hash_cost)
            .field("seed_on_start", &self.seed_on_start)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = get("APP_ENV").unwrap_or_else(|| "development".to_string());
        let is_dev = environment == "development" || environment == "test";

        let jwt_secret = match get("JWT_SECRET") {
            Some(secret) => secret,
            None if is_dev => {
                warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            None | Some("json") => LogFormat::Json,
            Some("pretty") | Some("text") => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("expected json or pretty, got {other}"),
                });
            }
        };

        let session = SessionSettings {
            issuer: get("JWT_ISSUER").unwrap_or_else(|| "warden".to_string()),
            token_ttl: duration(&get, "JWT_EXPIRES_IN", Duration::from_secs(24 * 3600))?,
            lockout: LockoutPolicy {
                max_attempts: number(&get, "LOCKOUT_MAX_ATTEMPTS", 5)?,
                lock_duration: duration(&get, "LOCKOUT_DURATION", Duration::from_secs(15 * 60))?,
            },
        };
        if session.lockout.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "LOCKOUT_MAX_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let storage = storage(&get)?;
        let seed_default = matches!(storage, StorageConfig::InMemory);
        let defaults = SeedOptions::default();

        Ok(Self {
            bind_host: get("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: number(&get, "PORT", 3000)?,
            environment,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            jwt_secret,
            session,
            storage,
            password_pepper: get("PASSWORD_PEPPER"),
            hash_cost: HashCost {
                memory_kib: optional_number(&get, "PASSWORD_HASH_MEMORY_KIB")?,
                iterations: optional_number(&get, "PASSWORD_HASH_ITERATIONS")?,
            },
            seed_on_start: flag(&get, "SEED_ON_START", seed_default)?,
            seed: SeedOptions {
                admin_password: get("SEED_ADMIN_PASSWORD").unwrap_or(defaults.admin_password),
                client_password: get("SEED_CLIENT_PASSWORD").unwrap_or(defaults.client_password),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn storage(get: &impl Fn(&str) -> Option<String>) -> Result<StorageConfig, ConfigError> {
    let max_connections = number(get, "DB_MAX_CONNECTIONS", 10)?;

    if let Some(url) = get("DATABASE_URL") {
        return Ok(StorageConfig::Postgres { url, max_connections });
    }

    let Some(host) = get("DB_HOST") else {
        return Ok(StorageConfig::InMemory);
    };
    let port: u16 = number(get, "DB_PORT", 5432)?;
    let user = get("DB_USERNAME").unwrap_or_else(|| "postgres".to_string());
    let password = get("DB_PASSWORD").unwrap_or_default();
    let database = get("DB_DATABASE").unwrap_or_else(|| "warden".to_string());

    let credentials = if password.is_empty() {
        user
    } else {
        format!("{user}:{password}")
    };
    Ok(StorageConfig::Postgres {
        url: format!("postgres://{credentials}@{host}:{port}/{database}"),
        max_connections,
    })
}

fn number<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    Ok(optional_number(get, name)?.unwrap_or(default))
}

fn optional_number<T>(get: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    get(name)
        .map(|raw| {
            raw.parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn duration(
    get: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<chrono::Duration, ConfigError> {
    let std = match get(name) {
        Some(raw) => humantime::parse_duration(&raw).map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })?,
        None => default,
    };
    chrono::Duration::from_std(std).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn flag(get: &impl Fn(&str) -> Option<String>, name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match get(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            reason: format!("expected a boolean, got {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_are_development_friendly() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:3000");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.session.issuer, "warden");
        assert_eq!(cfg.session.token_ttl, chrono::Duration::hours(24));
        assert_eq!(cfg.session.lockout, LockoutPolicy::default());
        assert_eq!(cfg.storage, StorageConfig::InMemory);
        assert!(cfg.seed_on_start);
    }

    #[test]
    fn production_requires_a_jwt_secret() {
        assert_eq!(config(&[("APP_ENV", "production")]), Err(ConfigError::Missing("JWT_SECRET")));
        assert!(config(&[("APP_ENV", "production"), ("JWT_SECRET", "s3cr3t")]).is_ok());
    }

    #[test]
    fn durations_use_humantime() {
        let cfg = config(&[("JWT_EXPIRES_IN", "2h 30m"), ("LOCKOUT_DURATION", "5m")]).unwrap();
        assert_eq!(cfg.session.token_ttl, chrono::Duration::minutes(150));
        assert_eq!(cfg.session.lockout.lock_duration, chrono::Duration::minutes(5));

        let err = config(&[("JWT_EXPIRES_IN", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "JWT_EXPIRES_IN", .. }));
    }

    #[test]
    fn database_url_is_assembled_from_parts() {
        let cfg = config(&[
            ("DB_HOST", "db"),
            ("DB_USERNAME", "app"),
            ("DB_PASSWORD", "pw"),
            ("DB_DATABASE", "identity"),
        ])
        .unwrap();
        assert_eq!(
            cfg.storage,
            StorageConfig::Postgres {
                url: "postgres://app:pw@db:5432/identity".to_string(),
                max_connections: 10
            }
        );
        assert!(!cfg.seed_on_start);
    }

    #[test]
    fn bad_numbers_and_flags_are_errors() {
        assert!(matches!(config(&[("PORT", "http")]), Err(ConfigError::Invalid { name: "PORT", .. })));
        assert!(config(&[("SEED_ON_START", "maybe")]).is_err());
        assert!(config(&[("LOCKOUT_MAX_ATTEMPTS", "0")]).is_err());
        assert!(config(&[("LOG_FORMAT", "xml")]).is_err());
    }
}
