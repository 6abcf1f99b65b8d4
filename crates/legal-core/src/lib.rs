#![deny(missing_docs)]

//! # legal-core: Domain Types for the Legalization Registry
//!
//! Foundational types shared by the HTTP service and the operator CLI. The
//! crate performs no I/O; it depends only on `serde`, `thiserror`, `chrono`,
//! `rand`, and `url`.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** An [`Identifier`] is always
//!    20 alphanumeric characters; a [`RecordId`] cannot be confused with a
//!    [`UserId`].
//!
//! 2. **The verification URL is derived, never authoritative.** It is computed
//!    by [`encode_verification_url`] from an identifier and the configured
//!    [`BaseUrl`]. The copy stored on a [`Record`] is a creation-time snapshot.
//!
//! 3. **Public visibility is a single gate.** Only [`VisibilityStatus::Active`]
//!    records can be projected into a [`PublicRecord`].

pub mod error;
pub mod identifier;
pub mod record;
pub mod verification;

pub use error::ValidationError;
pub use identifier::{
    image_filename, Identifier, IdentifierGenerator, RandomIdentifierGenerator,
    IDENTIFIER_ALPHABET, IDENTIFIER_LEN,
};
pub use record::{
    PublicRecord, Record, RecordFields, RecordFieldsPatch, RecordId, UserId, VisibilityStatus,
};
pub use verification::{
    encode_verification_url, extract_identifier, BaseUrl, VERIFICATION_PATH,
    VERIFICATION_QUERY_PARAM,
};
