use anyhow::Context;
use creds::{CacheConfig, RetryConfig};
use serde::Deserialize;
use std::path::Path;

/// Contents of the `--config` file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CredsConfig {
    /// Manager name to its backend-specific settings.
    pub managers: serde_json::Map<String, serde_json::Value>,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl CredsConfig {
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        Ok(json5::from_str(raw)?)
    }
}
