//! # Startup
//!
//! Opens the configured storage backend and creates the bootstrap admin
//! when the environment asks for one and no admin exists yet.

use crate::auth::{hash_password, Role};
use crate::config::{AdminBootstrap, AppConfig, DatabaseConfig};
use crate::db;
use crate::error::AppError;
use crate::state::AppState;
use crate::store::{bounded, NewUser, SqliteStore, StoreError, Stores};

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The database could not be opened or migrated.
    #[error("database initialization failed: {0}")]
    Database(#[from] sqlx::Error),

    /// A storage call during bootstrap failed.
    #[error("storage error during bootstrap: {0}")]
    Storage(#[from] StoreError),

    /// Admin password hashing failed.
    #[error("admin bootstrap failed: {0}")]
    Admin(String),
}

impl From<AppError> for BootstrapError {
    fn from(err: AppError) -> Self {
        Self::Admin(err.to_string())
    }
}

/// Open the configured backend.
pub async fn open_stores(database: &DatabaseConfig) -> Result<Stores, BootstrapError> {
    match database {
        DatabaseConfig::Memory => {
            tracing::warn!("using in-memory storage; data will not survive a restart");
            Ok(Stores::memory())
        }
        DatabaseConfig::Sqlite(url) => {
            let pool = db::init_pool(url).await?;
            Ok(Stores::from_backend(SqliteStore::new(pool)))
        }
    }
}

/// Build application state from configuration.
pub async fn bootstrap(config: AppConfig) -> Result<AppState, BootstrapError> {
    let stores = open_stores(&config.database).await?;
    ensure_admin(&stores, config.admin.as_ref(), config.storage_timeout).await?;
    Ok(AppState::new(config, stores))
}

/// Create the bootstrap admin if no admin account exists.
///
/// Returns whether an account was created.
pub async fn ensure_admin(
    stores: &Stores,
    admin: Option<&AdminBootstrap>,
    timeout: std::time::Duration,
) -> Result<bool, BootstrapError> {
    let admins = bounded(timeout, stores.users.count_admins()).await?;
    if admins > 0 {
        return Ok(false);
    }
    let Some(admin) = admin else {
        tracing::warn!(
            "no admin account exists; set ADMIN_USERNAME and ADMIN_PASSWORD to create one"
        );
        return Ok(false);
    };

    let password_hash = hash_password(admin.password.expose().to_string()).await?;
    let user = bounded(
        timeout,
        stores.users.create(NewUser {
            username: admin.username.clone(),
            email: None,
            role: Role::Admin,
            password_hash,
        }),
    )
    .await?;
    tracing::info!(user_id = %user.id, username = %user.username, "bootstrap admin created");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::verify_password;
    use crate::config::SecretString;
    use std::time::Duration;

    fn admin() -> AdminBootstrap {
        AdminBootstrap {
            username: "root".into(),
            password: SecretString::new("first-login-pass"),
        }
    }

    #[tokio::test]
    async fn creates_admin_once() {
        let stores = Stores::memory();
        let t = Duration::from_secs(1);
        assert!(ensure_admin(&stores, Some(&admin()), t).await.unwrap());
        assert!(!ensure_admin(&stores, Some(&admin()), t).await.unwrap());

        let creds = stores.users.find_by_username("root").await.unwrap().unwrap();
        assert_eq!(creds.user.role, Role::Admin);
        assert!(verify_password("first-login-pass".into(), creds.password_hash)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn without_credentials_nothing_is_created() {
        let stores = Stores::memory();
        assert!(!ensure_admin(&stores, None, Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(stores.users.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_backend_opens_in_memory() {
        let stores = open_stores(&DatabaseConfig::Sqlite("sqlite::memory:".into()))
            .await
            .unwrap();
        stores.records.ping().await.unwrap();
    }
}
