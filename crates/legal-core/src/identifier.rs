//! # QR Identifiers
//!
//! A record's public identifier is a 20-character code drawn uniformly from
//! the 62-character alphanumeric alphabet. It names the record, keys its
//! image file, and is the lookup key embedded in the printed QR code.
//!
//! ## Collisions
//!
//! The space is 62^20 (about 7×10^35), so collisions are not expected. The
//! generator still makes no uniqueness promise: storage enforces uniqueness
//! and the creation path retries a bounded number of times.

use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of characters in an identifier.
pub const IDENTIFIER_LEN: usize = 20;

/// The 62-character alphabet identifiers are drawn from.
pub const IDENTIFIER_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Extension of rendered QR images.
const IMAGE_EXTENSION: &str = "png";

/// A validated record identifier.
///
/// Immutable once assigned. Serializes as a plain string; deserialization
/// runs the same validation as [`Identifier::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Create an identifier from a string, validating length and alphabet.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidIdentifier`] unless the input is
    /// exactly [`IDENTIFIER_LEN`] ASCII alphanumeric characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.len() != IDENTIFIER_LEN || !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidIdentifier(s));
        }
        Ok(Self(s))
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identifier {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Filename of the rendered image for an identifier: `<identifier>.png`.
pub fn image_filename(identifier: &Identifier) -> String {
    format!("{identifier}.{IMAGE_EXTENSION}")
}

/// Source of fresh identifiers.
///
/// Injected into the creation path so tests can script collisions. The
/// trait is object-safe and implementations must be shareable across
/// request tasks.
pub trait IdentifierGenerator: Send + Sync {
    /// Produce a new identifier. Infallible.
    fn generate(&self) -> Identifier;
}

/// Uniform random generator over [`IDENTIFIER_ALPHABET`] using the thread RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdentifierGenerator;

impl IdentifierGenerator for RandomIdentifierGenerator {
    fn generate(&self) -> Identifier {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(IDENTIFIER_LEN)
            .map(char::from)
            .collect();
        Identifier(code)
    }
}
