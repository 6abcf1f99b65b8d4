//! # legal-cli: Operator CLI for the Legalization Registry
//!
//! Provides the `legal` command-line interface for work that does not go
//! through the HTTP service.
//!
//! ## Subcommands
//!
//! - `legal encode`: print the verification URL for a code.
//! - `legal extract`: recover the code from scanned QR content.
//! - `legal generate`: print fresh identifiers.
//! - `legal render`: write a QR PNG for arbitrary content.
//! - `legal db migrate`: create or migrate the SQLite database.
//! - `legal user create`: add an account.
//! - `legal qr regenerate`: re-render stored images under the current base URL.
//!
//! Every handler returns the process exit code; errors bubble up as
//! `anyhow::Error` and are reported by `main`.
//!
//! ```bash
//! legal encode zVtgAi18NOlvLivHYMjj --base-url https://legal.example.org
//! legal user create clerk --password-env CLERK_PASSWORD
//! legal qr regenerate --all
//! ```

pub mod db;
pub mod encode;
pub mod extract;
pub mod generate;
pub mod qr;
pub mod render;
pub mod user;

use anyhow::{Context, Result};

/// Runtime for the subcommands that talk to the database.
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
