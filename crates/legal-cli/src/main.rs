//! # legal CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use legal_cli::db::{run_db, DbArgs};
use legal_cli::encode::{run_encode, EncodeArgs};
use legal_cli::extract::{run_extract, ExtractArgs};
use legal_cli::generate::{run_generate, GenerateArgs};
use legal_cli::qr::{run_qr, QrArgs};
use legal_cli::render::{run_render, RenderArgs};
use legal_cli::user::{run_user, UserArgs};

/// Legalization registry operator CLI.
///
/// Identifier and verification URL tooling, QR rendering, database
/// migration, account creation, and bulk QR regeneration.
#[derive(Parser, Debug)]
#[command(name = "legal", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the verification URL for a code.
    Encode(EncodeArgs),

    /// Recover the code from a scanned verification URL.
    Extract(ExtractArgs),

    /// Print fresh random identifiers.
    Generate(GenerateArgs),

    /// Write a QR PNG for arbitrary content.
    Render(RenderArgs),

    /// Database maintenance.
    Db(DbArgs),

    /// Account management.
    User(UserArgs),

    /// QR image maintenance.
    Qr(QrArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Encode(args) => run_encode(&args),
        Commands::Extract(args) => run_extract(&args),
        Commands::Generate(args) => run_generate(&args),
        Commands::Render(args) => run_render(&args),
        Commands::Db(args) => run_db(&args),
        Commands::User(args) => run_user(&args),
        Commands::Qr(args) => run_qr(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}
