//! # Database Persistence Layer
//!
//! SQLite persistence via sqlx. Each submodule owns one table family and
//! exposes plain async functions over a `&SqlitePool`;
//! [`crate::store::SqliteStore`] adapts them to the storage traits.
//!
//! ## Tables
//!
//! - `users`: accounts with Argon2 password hashes.
//! - `sessions`: SHA-256 digests of bearer tokens with expiry.
//! - `records`: legalization records, `qr_code` unique.
//! - `issued_identifiers`: every identifier ever assigned, never pruned.
//!
//! Migrations under `migrations/` are embedded at compile time and applied
//! by [`init_pool`].

pub mod records;
pub mod sessions;
pub mod users;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

const MAX_CONNECTIONS: u32 = 8;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the database at `url`, creating it if missing, and run migrations.
///
/// In-memory URLs (`sqlite::memory:`) get a single long-lived connection,
/// since every SQLite in-memory connection is a separate database.
pub async fn init_pool(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    if !in_memory {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(sqlx::Error::Io)?;
            }
        }
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    };

    let pool = pool_options
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;
    tracing::info!(in_memory, "connected to SQLite");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");

    Ok(pool)
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    init_pool("sqlite::memory:").await.unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_tables() {
        let pool = test_pool().await;
        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        for expected in ["issued_identifiers", "records", "sessions", "users"] {
            assert!(
                tables.iter().any(|t| t == expected),
                "missing table {expected}: {tables:?}"
            );
        }
    }

    #[tokio::test]
    async fn init_pool_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("registry.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let pool = init_pool(&url).await.unwrap();
        pool.close().await;
        assert!(path.exists());
    }
}
