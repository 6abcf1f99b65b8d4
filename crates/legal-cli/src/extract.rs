//! # Extract Subcommand
//!
//! Recovers the identifier from scanned QR content: a verification URL
//! under any base, or a bare code.

use anyhow::Result;
use clap::Args;

use legal_core::extract_identifier;

/// Arguments for `legal extract`.
#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Scanned content: a verification URL or a bare code.
    #[arg(value_name = "URL|CODE")]
    pub content: String,
}

/// Execute the extract subcommand. Exit code 1 on malformed input.
pub fn run_extract(args: &ExtractArgs) -> Result<u8> {
    match extract_identifier(&args.content) {
        Ok(identifier) => {
            println!("{identifier}");
            Ok(0)
        }
        Err(e) => {
            eprintln!("INVALID: {e}");
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes() {
        let ok = ExtractArgs {
            content: "http://localhost:3000/check/sticker?qr=zVtgAi18NOlvLivHYMjj".into(),
        };
        assert_eq!(run_extract(&ok).unwrap(), 0);

        let bad = ExtractArgs {
            content: "https://example.org/elsewhere?qr=zVtgAi18NOlvLivHYMjj".into(),
        };
        assert_eq!(run_extract(&bad).unwrap(), 1);
    }
}
