//! # Generate Subcommand
//!
//! Prints fresh random identifiers. Uniqueness against issued codes is
//! only enforced when a record is stored.

use anyhow::{bail, Result};
use clap::Args;

use legal_core::{Identifier, IdentifierGenerator, RandomIdentifierGenerator};

/// Largest batch printed at once.
const MAX_COUNT: u32 = 10_000;

/// Arguments for `legal generate`.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// How many identifiers to print.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,
}

/// Execute the generate subcommand.
pub fn run_generate(args: &GenerateArgs) -> Result<u8> {
    for identifier in generate(&RandomIdentifierGenerator, args.count)? {
        println!("{identifier}");
    }
    Ok(0)
}

fn generate(generator: &dyn IdentifierGenerator, count: u32) -> Result<Vec<Identifier>> {
    if count == 0 || count > MAX_COUNT {
        bail!("count must be between 1 and {MAX_COUNT}");
    }
    Ok((0..count).map(|_| generator.generate()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_requested_count() {
        let codes = generate(&RandomIdentifierGenerator, 5).unwrap();
        assert_eq!(codes.len(), 5);
        assert!(codes.iter().all(|c| c.as_str().len() == 20));
    }

    #[test]
    fn count_bounds() {
        assert!(generate(&RandomIdentifierGenerator, 0).is_err());
        assert!(generate(&RandomIdentifierGenerator, MAX_COUNT + 1).is_err());
    }
}
