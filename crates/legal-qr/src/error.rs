//! # QR Error Types
//!
//! Rendering and storage failures are separate enums so callers can map a
//! bad payload and a filesystem fault to different responses.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from rasterizing content into a QR image.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Nothing to encode.
    #[error("QR content is empty")]
    EmptyContent,

    /// Content exceeds the QR capacity at the configured error-correction level.
    #[error("QR content of {len} bytes exceeds capacity")]
    TooLong {
        /// Length of the rejected content in bytes.
        len: usize,
    },

    /// The QR encoder or PNG encoder failed.
    #[error("QR encoding failed: {0}")]
    Encode(String),
}

/// Errors from the on-disk image store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("image store I/O error at {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_long_display() {
        let err = RenderError::TooLong { len: 5000 };
        assert_eq!(err.to_string(), "QR content of 5000 bytes exceeds capacity");
    }

    #[test]
    fn store_error_includes_path() {
        let err = StoreError::io(
            "/tmp/qrcodes/x.png",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/qrcodes/x.png"));
        assert!(msg.contains("denied"));
    }
}
