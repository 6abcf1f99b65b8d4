//! # legal-qr: QR Rendering and Image Storage
//!
//! Turns a verification URL into a scannable PNG and persists it under the
//! record's identifier:
//!
//! - **Rendering** ([`QrRenderer`]): error-correction level M, 300 px wide,
//!   2-module quiet zone, black on white. Empty or oversized payloads are
//!   rejected with a [`RenderError`], never rendered into a corrupt image.
//! - **Storage** ([`QrImageStore`]): `<base_dir>/<identifier>.png`, written
//!   through a temporary file and an atomic rename so concurrent writers of
//!   the same identifier never expose a torn file.
//!
//! Rendering is deterministic in payload only. Tests compare images by
//! decoding them, not by bytes.

pub mod error;
pub mod render;
pub mod store;

pub use error::{RenderError, StoreError};
pub use render::{QrRenderer, RenderOptions};
pub use store::QrImageStore;

/// Error-correction levels, re-exported from the `qrcode` crate.
pub use qrcode::EcLevel;
