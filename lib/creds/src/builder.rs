// lib/creds/src/builder.rs

use crate::cache::{CacheConfig, CachedSecrets};
use crate::retry::{RetryConfig, RetryableSecrets};
use crate::secrets::Secrets;
use std::sync::Arc;

/// Wraps a backend in its decorators.
///
/// Retry always sits directly on the backend and the cache always sits on
/// top, so only definitive outcomes ever reach the cache.
pub struct SecretsBuilder {
    backend: Arc<dyn Secrets>,
    retry: Option<RetryConfig>,
    cache: Option<CacheConfig>,
}

impl SecretsBuilder {
    pub fn new(backend: Arc<dyn Secrets>) -> Self {
        Self {
            backend,
            retry: None,
            cache: None,
        }
    }

    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = Some(config);
        self
    }

    /// Disabled configs are ignored.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config.enabled.then_some(config);
        self
    }

    pub fn build(self) -> Arc<dyn Secrets> {
        let mut secrets = self.backend;
        if let Some(retry) = self.retry {
            secrets = Arc::new(RetryableSecrets::new(secrets, retry));
        }
        if let Some(cache) = self.cache {
            secrets = Arc::new(CachedSecrets::new(secrets, cache));
        }
        secrets
    }
}
