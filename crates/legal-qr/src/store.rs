//! # QR Image Store
//!
//! Rendered images live at `{base_dir}/{identifier}.png`. The directory is
//! created on first write.
//!
//! Writes go to a uniquely named temporary file in the same directory and
//! are then renamed over the target. Rename within a directory is atomic,
//! so readers see either the previous image or the new one, and concurrent
//! writers for the same identifier simply race to an equivalent result.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use legal_core::{image_filename, Identifier};

use crate::error::StoreError;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Filesystem store for rendered QR images, keyed by identifier.
#[derive(Debug, Clone)]
pub struct QrImageStore {
    base_dir: PathBuf,
}

impl QrImageStore {
    /// Create a store rooted at `base_dir`. The directory need not exist yet.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Root directory of the store.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of the image for `identifier`.
    pub fn path_for(&self, identifier: &Identifier) -> PathBuf {
        self.base_dir.join(image_filename(identifier))
    }

    /// Write (or replace) the image for `identifier`.
    pub fn write(&self, identifier: &Identifier, png: &[u8]) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.base_dir).map_err(|e| StoreError::io(&self.base_dir, e))?;

        let target = self.path_for(identifier);
        let temp = self.base_dir.join(format!(
            ".{}.{}.{}.tmp",
            image_filename(identifier),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));

        let written = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp)
            .and_then(|mut f| {
                f.write_all(png)?;
                f.sync_all()
            });
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::io(&temp, e));
        }

        if let Err(e) = fs::rename(&temp, &target) {
            let _ = fs::remove_file(&temp);
            return Err(StoreError::io(&target, e));
        }

        tracing::debug!(identifier = %identifier, path = %target.display(), "stored QR image");
        Ok(target)
    }

    /// Read the image for `identifier`, or `None` if it has not been rendered.
    pub fn read(&self, identifier: &Identifier) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.path_for(identifier);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Remove the image for `identifier`. Returns whether a file was removed.
    pub fn remove(&self, identifier: &Identifier) -> Result<bool, StoreError> {
        let path = self.path_for(identifier);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}
