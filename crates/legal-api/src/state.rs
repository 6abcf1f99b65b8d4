//! # Application State
//!
//! Shared state handed to every handler through `State<AppState>`. All
//! fields are cheap to clone: stores are behind `Arc<dyn ...>` and the
//! registry and image service share their internals.

use std::sync::Arc;
use std::time::Duration;

use legal_core::{IdentifierGenerator, RandomIdentifierGenerator};
use legal_qr::{QrImageStore, QrRenderer};

use crate::auth::AuthContext;
use crate::config::AppConfig;
use crate::images::ImageService;
use crate::registry::RecordRegistry;
use crate::store::Stores;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Record creation and lookup.
    pub registry: RecordRegistry,
    /// QR image cache.
    pub images: ImageService,
    /// Raw store handles, for accounts and sessions.
    pub stores: Stores,
}

impl AppState {
    /// Assemble state over the given stores with the random identifier
    /// generator.
    pub fn new(config: AppConfig, stores: Stores) -> Self {
        Self::with_generator(config, stores, Arc::new(RandomIdentifierGenerator))
    }

    /// Assemble state with a specific identifier generator.
    pub fn with_generator(
        config: AppConfig,
        stores: Stores,
        generator: Arc<dyn IdentifierGenerator>,
    ) -> Self {
        let registry = RecordRegistry::new(
            stores.records.clone(),
            generator,
            config.base_url.clone(),
            config.storage_timeout,
        );
        let images = ImageService::new(
            QrRenderer::default(),
            QrImageStore::new(config.qr_storage_dir.clone()),
            config.base_url.clone(),
        );
        Self {
            config: Arc::new(config),
            registry,
            images,
            stores,
        }
    }

    /// Bound applied to each storage call.
    pub fn storage_timeout(&self) -> Duration {
        self.config.storage_timeout
    }

    /// Store handles for the auth middleware.
    pub fn auth_context(&self) -> AuthContext {
        AuthContext {
            users: self.stores.users.clone(),
            sessions: self.stores.sessions.clone(),
            timeout: self.config.storage_timeout,
        }
    }
}
