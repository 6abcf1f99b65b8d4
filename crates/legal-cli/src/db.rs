//! # Database Subcommand
//!
//! Creates the SQLite database if missing and applies the embedded
//! migrations. The server does the same at startup; this lets operators
//! prepare a database before the first deploy.

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};

use legal_api::config::DEFAULT_DATABASE_URL;
use legal_api::db::init_pool;
use legal_api::store::SqliteStore;

/// Arguments for `legal db`.
#[derive(Args, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommand,
}

/// Database subcommands.
#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Create the database if missing and apply migrations.
    Migrate {
        /// sqlx SQLite connection URL.
        #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
        database_url: String,
    },
}

/// Execute the db subcommand.
pub fn run_db(args: &DbArgs) -> Result<u8> {
    match &args.command {
        DbCommand::Migrate { database_url } => {
            crate::runtime()?.block_on(open_store(database_url))?;
            println!("OK: database ready at {database_url}");
            Ok(0)
        }
    }
}

/// Open and migrate the database at `url`.
pub(crate) async fn open_store(url: &str) -> Result<SqliteStore> {
    if url.trim() == "memory" {
        bail!("DATABASE_URL=memory selects the server's in-memory store; the CLI needs a SQLite URL");
    }
    let pool = init_pool(url)
        .await
        .with_context(|| format!("failed to open database {url}"))?;
    tracing::info!(database_url = url, "database migrated");
    Ok(SqliteStore::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("registry.db");
        let args = DbArgs {
            command: DbCommand::Migrate {
                database_url: format!("sqlite://{}", path.display()),
            },
        };
        assert_eq!(run_db(&args).unwrap(), 0);
        assert!(path.exists());
        // Migrations are idempotent.
        assert_eq!(run_db(&args).unwrap(), 0);
    }

    #[test]
    fn memory_url_is_rejected() {
        let args = DbArgs {
            command: DbCommand::Migrate {
                database_url: "memory".into(),
            },
        };
        assert!(run_db(&args).is_err());
    }
}
