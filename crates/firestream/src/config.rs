//! Configuration
//!
//! Loaded from `config.toml` in the user's config directory
//! (`~/.config/firestream/config.toml` on Linux). Every field is optional.

use anyhow::{bail, Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirestreamConfig {
    /// Name used in log output
    pub app_name: String,
    /// Realtime database URL, e.g. `https://my-app.firebaseio.com`
    pub database_url: Option<String>,
    pub storage: StorageConfig,
}

impl Default for FirestreamConfig {
    fn default() -> Self {
        Self {
            app_name: "[DEFAULT]".to_string(),
            database_url: None,
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bucket for upload targets given as bare object paths
    pub bucket: Option<String>,
    /// Cancel an in-flight upload when its stream is dropped
    pub cancel_on_unsubscribe: bool,
}

impl FirestreamConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("firestream").join("config.toml"))
    }

    /// Parse a TOML config string and validate it
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse firestream config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded firestream config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.database_url {
            let parsed = Url::parse(url).with_context(|| format!("Invalid database_url '{}'", url))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                bail!("database_url must use http or https, got '{}'", parsed.scheme());
            }
        }
        if let Some(bucket) = &self.storage.bucket {
            if bucket.is_empty() {
                bail!("storage.bucket must not be empty");
            }
            if bucket.contains("://") || bucket.contains('/') {
                bail!("storage.bucket must be a bare bucket name, got '{}'", bucket);
            }
        }
        Ok(())
    }
}
