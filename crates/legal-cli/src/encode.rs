//! # Encode Subcommand
//!
//! Prints the verification URL a sticker for the given code carries.

use anyhow::{Context, Result};
use clap::Args;

use legal_api::config::DEFAULT_BASE_URL;
use legal_core::{encode_verification_url, BaseUrl, Identifier};

/// Arguments for `legal encode`.
#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// 20-character identifier.
    #[arg(value_name = "CODE")]
    pub code: String,

    /// Base of the verification URL.
    #[arg(long, env = "BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,
}

/// Execute the encode subcommand.
pub fn run_encode(args: &EncodeArgs) -> Result<u8> {
    let url = encode(args)?;
    println!("{url}");
    Ok(0)
}

fn encode(args: &EncodeArgs) -> Result<String> {
    let identifier = Identifier::new(args.code.trim()).context("invalid code")?;
    let base_url = BaseUrl::new(args.base_url.as_str()).context("invalid base URL")?;
    Ok(encode_verification_url(&identifier, &base_url))
}
