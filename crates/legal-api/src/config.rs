//! # Service Configuration
//!
//! Loaded from environment variables at startup. A variable that is set but
//! malformed is an error; only absent variables fall back to defaults.
//!
//! | Variable               | Default                                     |
//! |------------------------|---------------------------------------------|
//! | `PORT`                 | `8080`                                      |
//! | `DATABASE_URL`         | `sqlite://data/legalization.db?mode=rwc`    |
//! | `BASE_URL`             | `http://localhost:3000`                     |
//! | `QR_STORAGE_DIR`       | `uploads/qrcodes`                           |
//! | `SESSION_TTL_SECS`     | `86400` (at most one year)                  |
//! | `STORAGE_TIMEOUT_SECS` | `5`                                         |
//! | `PUBLIC_RATE_LIMIT`    | `120` (requests per minute per client)      |
//! | `ADMIN_USERNAME`       | unset                                       |
//! | `ADMIN_PASSWORD`       | unset                                       |
//!
//! `DATABASE_URL=memory` selects the in-memory store.

use std::path::PathBuf;
use std::time::Duration;

use legal_core::BaseUrl;

const DEFAULT_PORT: u16 = 8080;
/// Database used when `DATABASE_URL` is unset.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/legalization.db?mode=rwc";
/// Base URL used when `BASE_URL` is unset.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
/// Image directory used when `QR_STORAGE_DIR` is unset.
pub const DEFAULT_QR_STORAGE_DIR: &str = "uploads/qrcodes";
const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;
const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;
const DEFAULT_STORAGE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PUBLIC_RATE_LIMIT: u64 = 120;

/// A string that never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret. Callers must not log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Where records, users and sessions are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseConfig {
    /// Process-local maps. State does not survive restarts.
    Memory,
    /// SQLite database at the given sqlx connection URL.
    Sqlite(String),
}

/// Credentials for the administrator created on first start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminBootstrap {
    /// Username of the bootstrap admin.
    pub username: String,
    /// Initial password.
    pub password: SecretString,
}

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Storage backend.
    pub database: DatabaseConfig,
    /// Base of every verification URL.
    pub base_url: BaseUrl,
    /// Directory holding rendered QR images.
    pub qr_storage_dir: PathBuf,
    /// Lifetime of a login session.
    pub session_ttl: Duration,
    /// Upper bound on any single storage call.
    pub storage_timeout: Duration,
    /// Public route budget per client per minute.
    pub public_rate_limit: u64,
    /// Optional admin to create when none exists.
    pub admin: Option<AdminBootstrap>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database = match get("DATABASE_URL") {
            Some(url) if url.trim() == "memory" => DatabaseConfig::Memory,
            Some(url) => DatabaseConfig::Sqlite(url),
            None => DatabaseConfig::Sqlite(DEFAULT_DATABASE_URL.to_string()),
        };

        let raw_base = get("BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = BaseUrl::new(raw_base).map_err(|e| ConfigError::Invalid {
            var: "BASE_URL",
            reason: e.to_string(),
        })?;

        let admin = match (get("ADMIN_USERNAME"), get("ADMIN_PASSWORD")) {
            (Some(username), Some(password)) => Some(AdminBootstrap {
                username,
                password: SecretString::new(password),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteAdmin),
        };

        Ok(Self {
            port: parse_var(&get, "PORT", DEFAULT_PORT)?,
            database,
            base_url,
            qr_storage_dir: get("QR_STORAGE_DIR")
                .unwrap_or_else(|| DEFAULT_QR_STORAGE_DIR.to_string())
                .into(),
            session_ttl: Duration::from_secs(at_most(
                "SESSION_TTL_SECS",
                positive(&get, "SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
                MAX_SESSION_TTL_SECS,
            )?),
            storage_timeout: Duration::from_secs(positive(
                &get,
                "STORAGE_TIMEOUT_SECS",
                DEFAULT_STORAGE_TIMEOUT_SECS,
            )?),
            public_rate_limit: positive(&get, "PUBLIC_RATE_LIMIT", DEFAULT_PUBLIC_RATE_LIMIT)?,
            admin,
        })
    }

    /// In-memory configuration for tests and local experiments. No
    /// bootstrap admin.
    pub fn in_memory(base_url: BaseUrl, qr_storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            port: 0,
            database: DatabaseConfig::Memory,
            base_url,
            qr_storage_dir: qr_storage_dir.into(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            storage_timeout: Duration::from_secs(DEFAULT_STORAGE_TIMEOUT_SECS),
            public_rate_limit: DEFAULT_PUBLIC_RATE_LIMIT,
            admin: None,
        }
    }
}

fn parse_var<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

fn positive(
    get: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_var(get, var, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

fn at_most(var: &'static str, value: u64, max: u64) -> Result<u64, ConfigError> {
    if value > max {
        return Err(ConfigError::Invalid {
            var,
            reason: format!("must be at most {max}"),
        });
    }
    Ok(value)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used.
    #[error("invalid value for {var}: {reason}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Why it was rejected.
        reason: String,
    },
    /// Only one of the two bootstrap admin variables is set.
    #[error("ADMIN_USERNAME and ADMIN_PASSWORD must be set together")]
    IncompleteAdmin,
}
