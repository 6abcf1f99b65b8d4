//! # User Subcommand
//!
//! Account creation from the command line. The password is read from an
//! environment variable so it never appears in shell history or `ps`.

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};

use legal_api::auth::{hash_password, Role};
use legal_api::config::DEFAULT_DATABASE_URL;
use legal_api::routes::auth::validate_password;
use legal_api::store::{NewUser, StoreError, UserStore};

use crate::db::open_store;

/// Arguments for `legal user`.
#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,

    /// sqlx SQLite connection URL.
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
    pub database_url: String,
}

/// User subcommands.
#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create an account.
    Create {
        /// Login name.
        #[arg(value_name = "USERNAME")]
        username: String,
        /// Name of the environment variable holding the password.
        #[arg(long, value_name = "VAR")]
        password_env: String,
        /// Contact address.
        #[arg(long)]
        email: Option<String>,
        /// Grant the admin role.
        #[arg(long)]
        admin: bool,
    },
}

/// Execute the user subcommand. Exit code 1 if the username is taken.
pub fn run_user(args: &UserArgs) -> Result<u8> {
    match &args.command {
        UserCommand::Create {
            username,
            password_env,
            email,
            admin,
        } => {
            let password = std::env::var(password_env)
                .with_context(|| format!("environment variable {password_env} is not set"))?;
            let role = if *admin { Role::Admin } else { Role::User };
            crate::runtime()?.block_on(create_user(
                &args.database_url,
                username,
                password,
                email.clone(),
                role,
            ))
        }
    }
}

async fn create_user(
    database_url: &str,
    username: &str,
    password: String,
    email: Option<String>,
    role: Role,
) -> Result<u8> {
    let username = username.trim();
    if username.is_empty() {
        return Err(anyhow!("username must not be empty"));
    }
    validate_password(&password).map_err(|e| anyhow!(e))?;

    let store = open_store(database_url).await?;
    let password_hash = hash_password(password).await?;
    let new = NewUser {
        username: username.to_string(),
        email: email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
        role,
        password_hash,
    };
    match store.create(new).await {
        Ok(user) => {
            tracing::info!(user_id = %user.id, username = %user.username, "user created");
            println!(
                "OK: created user {} (id {}, role {})",
                user.username,
                user.id,
                user.role.as_str()
            );
            Ok(0)
        }
        Err(StoreError::DuplicateUsername) => {
            eprintln!("EXISTS: username {username} is already taken");
            Ok(1)
        }
        Err(e) => Err(e).context("failed to create user"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legal_api::auth::verify_password;

    #[test]
    fn creates_user_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("users.db").display());
        let rt = crate::runtime().unwrap();

        let code = rt
            .block_on(create_user(&url, "clerk", "clerk-pass-1".into(), None, Role::Admin))
            .unwrap();
        assert_eq!(code, 0);

        let code = rt
            .block_on(create_user(&url, "clerk", "other-pass-2".into(), None, Role::User))
            .unwrap();
        assert_eq!(code, 1);

        let creds = rt.block_on(async {
            let store = open_store(&url).await.unwrap();
            store.find_by_username("clerk").await.unwrap().unwrap()
        });
        assert_eq!(creds.user.role, Role::Admin);
        assert!(rt
            .block_on(verify_password("clerk-pass-1".into(), creds.password_hash))
            .unwrap());
    }

    #[test]
    fn short_password_is_rejected_before_touching_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("never.db");
        let url = format!("sqlite://{}", path.display());
        let rt = crate::runtime().unwrap();
        assert!(rt
            .block_on(create_user(&url, "clerk", "short".into(), None, Role::User))
            .is_err());
        assert!(!path.exists());
    }
}
