//! TTL cache in front of a secrets backend
//!
//! Keys are resolved backend paths. Found and not-found results have separate
//! TTLs; errors are never cached.

use crate::error::CredsError;
use crate::lookup::SecretLookupPath;
use crate::secrets::{Secret, Secrets};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(with = "crate::duration")]
    pub duration: Duration,
    #[serde(with = "crate::duration")]
    pub duration_not_found: Duration,
    #[serde(with = "crate::duration")]
    pub purge_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: Duration::from_secs(60),
            duration_not_found: Duration::from_secs(10),
            purge_interval: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    secret: Option<Secret>,
    expires_at: Instant,
}

type Store = DashMap<String, CacheEntry>;

pub struct CachedSecrets {
    inner: Arc<dyn Secrets>,
    store: Arc<Store>,
    config: CacheConfig,
}

impl CachedSecrets {
    /// Must be called within a tokio runtime: it spawns the purge task.
    pub fn new(inner: Arc<dyn Secrets>, config: CacheConfig) -> Self {
        let store = Arc::new(Store::new());
        if !config.purge_interval.is_zero() {
            tokio::spawn(purge_loop(Arc::downgrade(&store), config.purge_interval));
        }
        Self { inner, store, config }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn ttl_for(&self, secret: &Option<Secret>) -> Duration {
        let Some(secret) = secret else {
            return self.config.duration_not_found;
        };
        match secret.expiration {
            Some(expiration) => {
                let remaining = (expiration - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                remaining.min(self.config.duration)
            }
            None => self.config.duration,
        }
    }
}

#[async_trait]
impl Secrets for CachedSecrets {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        self.inner.new_secret_lookup_paths(team, pipeline, allow_root_path)
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        if let Some(entry) = self.store.get(path) {
            if entry.expires_at > Instant::now() {
                debug!(path = %path, found = entry.secret.is_some(), "Cache hit for secret");
                return Ok(entry.secret.clone());
            }
        }

        let secret = self.inner.get(path).await?;
        let ttl = self.ttl_for(&secret);
        if !ttl.is_zero() {
            debug!(path = %path, ttl_ms = ttl.as_millis() as u64, "Caching secret lookup");
            self.store.insert(
                path.to_string(),
                CacheEntry {
                    secret: secret.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }
        Ok(secret)
    }
}

async fn purge_loop(store: Weak<Store>, interval: Duration) {
    loop {
        tokio::time::sleep(interval).await;
        let Some(store) = store.upgrade() else {
            break;
        };
        let now = Instant::now();
        let before = store.len();
        store.retain(|_, entry| entry.expires_at > now);
        let purged = before.saturating_sub(store.len());
        if purged > 0 {
            debug!(purged, "Purged expired secret cache entries");
        }
    }
}
