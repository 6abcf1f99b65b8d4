//! # QR Image Orchestration
//!
//! Serves a record's PNG from the image store, rendering and persisting it
//! first when it is missing. Images are always rendered from the URL
//! computed against the *current* base URL, never from the stored snapshot.
//! Rendering and file I/O run on the blocking pool.

use std::sync::Arc;

use legal_core::{BaseUrl, Identifier, Record};
use legal_qr::{QrImageStore, QrRenderer};

use crate::error::AppError;

/// Render-on-demand access to QR images.
#[derive(Debug, Clone)]
pub struct ImageService {
    renderer: Arc<QrRenderer>,
    store: Arc<QrImageStore>,
    base_url: BaseUrl,
}

impl ImageService {
    /// Create a service writing under `store` and encoding against `base_url`.
    pub fn new(renderer: QrRenderer, store: QrImageStore, base_url: BaseUrl) -> Self {
        Self {
            renderer: Arc::new(renderer),
            store: Arc::new(store),
            base_url,
        }
    }

    /// The image store.
    pub fn store(&self) -> &QrImageStore {
        &self.store
    }

    /// Cached PNG for the record, rendering it first if absent.
    pub async fn ensure(&self, record: &Record) -> Result<Vec<u8>, AppError> {
        let store = self.store.clone();
        let identifier = record.identifier.clone();
        let cached = blocking(move || store.read(&identifier).map_err(AppError::from)).await?;
        if let Some(bytes) = cached {
            return Ok(bytes);
        }
        self.regenerate(record).await
    }

    /// Render the record's PNG from the current URL and overwrite the cache.
    pub async fn regenerate(&self, record: &Record) -> Result<Vec<u8>, AppError> {
        if record.url_drifted(&self.base_url) {
            tracing::warn!(
                identifier = %record.identifier,
                stored = %record.encoded_url,
                current = %record.current_url(&self.base_url),
                "stored verification URL differs from current base URL"
            );
        }
        let content = record.current_url(&self.base_url);
        let renderer = self.renderer.clone();
        let store = self.store.clone();
        let identifier = record.identifier.clone();

        blocking(move || {
            let png = renderer.render_png(&content).map_err(|e| {
                tracing::error!(identifier = %identifier, error = %e, "QR render failed");
                AppError::from(e)
            })?;
            let path = store.write(&identifier, &png)?;
            tracing::info!(identifier = %identifier, path = %path.display(), "QR image written");
            Ok(png)
        })
        .await
    }

    /// Delete cached images. Missing files are skipped; failures are logged
    /// and do not abort the remaining removals.
    pub async fn remove(&self, identifiers: Vec<Identifier>) {
        let store = self.store.clone();
        let result = blocking(move || {
            for identifier in &identifiers {
                if let Err(e) = store.remove(identifier) {
                    tracing::warn!(
                        identifier = %identifier,
                        error = %e,
                        "failed to remove QR image"
                    );
                }
            }
            Ok(())
        })
        .await;
        if let Err(e) = result {
            tracing::warn!(error = %e, "QR image cleanup task failed");
        }
    }
}

async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> Result<T, AppError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
}
