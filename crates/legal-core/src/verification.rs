//! # Verification URLs
//!
//! The Content Encoder embeds an identifier into the public verification
//! URL printed inside every QR code:
//!
//! ```text
//! <base_url>/check/sticker?qr=<identifier>
//! ```
//!
//! The base URL comes from deployment configuration. It is never hardcoded
//! here, and the URL is always reproducible from `(identifier, base_url)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ValidationError;
use crate::identifier::{Identifier, IDENTIFIER_LEN};

/// Path of the public verification page, relative to the base URL.
pub const VERIFICATION_PATH: &str = "/check/sticker";

/// Query parameter carrying the identifier.
pub const VERIFICATION_QUERY_PARAM: &str = "qr";

/// A normalized http(s) base URL without trailing slash, query, or fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BaseUrl(String);

impl BaseUrl {
    /// Parse and normalize a base URL.
    ///
    /// The host is lowercased and default ports are dropped (via
    /// [`url::Url`]); a trailing `/` is removed so that joining with
    /// [`VERIFICATION_PATH`] never produces `//`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidBaseUrl`] if the value does not
    /// parse, is not http/https, or carries a query string or fragment.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = value.into();
        let invalid = |reason: &str| ValidationError::InvalidBaseUrl {
            value: raw.clone(),
            reason: reason.to_string(),
        };

        let parsed = Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
        match parsed.scheme() {
            "http" | "https" => {}
            other => return Err(invalid(&format!("unsupported scheme {other}"))),
        }
        if parsed.host_str().is_none() {
            return Err(invalid("missing host"));
        }
        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(invalid("query and fragment are not allowed"));
        }

        let normalized = parsed.as_str().trim_end_matches('/').to_string();
        Ok(Self(normalized))
    }

    /// Return the normalized URL as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BaseUrl {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for BaseUrl {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BaseUrl> for String {
    fn from(b: BaseUrl) -> Self {
        b.0
    }
}

/// Build the verification URL for an identifier.
///
/// Pure: `base_url + "/check/sticker?qr=" + identifier`. Identifiers are
/// alphanumeric, so no percent-encoding is needed.
pub fn encode_verification_url(identifier: &Identifier, base_url: &BaseUrl) -> String {
    format!(
        "{}{}?{}={}",
        base_url.as_str(),
        VERIFICATION_PATH,
        VERIFICATION_QUERY_PARAM,
        identifier.as_str()
    )
}

/// Recover the identifier from scanned QR content.
///
/// Accepts either a full verification URL (any base) or a bare 20-character
/// code. The URL path must end in [`VERIFICATION_PATH`].
///
/// # Errors
///
/// [`ValidationError::InvalidVerificationUrl`] when the content is neither a
/// verification URL nor a bare code; [`ValidationError::InvalidIdentifier`]
/// when the `qr` value is present but malformed.
pub fn extract_identifier(content: &str) -> Result<Identifier, ValidationError> {
    let content = content.trim();
    if content.len() == IDENTIFIER_LEN && !content.contains(['/', '?', ':']) {
        return Identifier::new(content);
    }

    let invalid = || ValidationError::InvalidVerificationUrl(content.to_string());
    let url = Url::parse(content).map_err(|_| invalid())?;
    if !url.path().trim_end_matches('/').ends_with(VERIFICATION_PATH) {
        return Err(invalid());
    }
    let code = url
        .query_pairs()
        .find(|(k, _)| k == VERIFICATION_QUERY_PARAM)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(invalid)?;
    Identifier::new(code)
}
