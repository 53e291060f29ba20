//! Application handle

use std::sync::Arc;

use tracing::info;

use crate::auth::{AuthBackend, RxAuth};
use crate::config::FirestreamConfig;
use crate::database::RxDatabase;
use crate::storage::{RxStorage, StorageBackend};

/// Bundles the adapters for one configured app
#[derive(Clone)]
pub struct Firestream {
    config: FirestreamConfig,
    database: RxDatabase,
    auth: RxAuth,
    storage: RxStorage,
}

impl Firestream {
    pub fn new(
        config: FirestreamConfig,
        auth: Arc<dyn AuthBackend>,
        storage: Arc<dyn StorageBackend>,
    ) -> Self {
        info!(
            "Initializing firestream app '{}' (bucket: {})",
            config.app_name,
            config.storage.bucket.as_deref().unwrap_or("none")
        );
        Self {
            database: RxDatabase::new(),
            auth: RxAuth::new(auth),
            storage: RxStorage::new(storage, config.storage.clone()),
            config,
        }
    }

    pub fn config(&self) -> &FirestreamConfig {
        &self.config
    }

    pub fn database(&self) -> &RxDatabase {
        &self.database
    }

    pub fn auth(&self) -> &RxAuth {
        &self.auth
    }

    pub fn storage(&self) -> &RxStorage {
        &self.storage
    }
}
