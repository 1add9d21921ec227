// lib/creds/src/retry.rs

use crate::error::CredsError;
use crate::lookup::SecretLookupPath;
use crate::secrets::{Secret, Secrets};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total number of calls, the first one included.
    pub attempts: u32,
    #[serde(with = "crate::duration")]
    pub interval: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_secs(1),
        }
    }
}

/// Retries transient failures of the wrapped backend at a fixed interval.
pub struct RetryableSecrets {
    inner: Arc<dyn Secrets>,
    config: RetryConfig,
}

impl RetryableSecrets {
    pub fn new(inner: Arc<dyn Secrets>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Secrets for RetryableSecrets {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        self.inner.new_secret_lookup_paths(team, pipeline, allow_root_path)
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        let attempts = self.config.attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.get(path).await {
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(
                        path = %path,
                        attempt,
                        attempts,
                        error = %e,
                        "retrying secret lookup"
                    );
                    tokio::time::sleep(self.config.interval).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        results: Mutex<VecDeque<Result<Option<Secret>, CredsError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(results: Vec<Result<Option<Secret>, CredsError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Secrets for Scripted {
        fn new_secret_lookup_paths(&self, _: &str, _: &str, _: bool) -> Vec<SecretLookupPath> {
            vec![SecretLookupPath::with_prefix("/")]
        }

        async fn get(&self, _path: &str) -> Result<Option<Secret>, CredsError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(None))
        }
    }

    fn config(attempts: u32) -> RetryConfig {
        RetryConfig {
            attempts,
            interval: Duration::from_secs(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let inner = Scripted::new(vec![
            Err(CredsError::transient("timeout")),
            Err(CredsError::transient("timeout")),
            Ok(Some(Secret::new(serde_json::json!("bar")))),
        ]);
        let secrets = RetryableSecrets::new(inner.clone(), config(5));

        let started = tokio::time::Instant::now();
        let secret = secrets.get("/foo").await.unwrap().unwrap();

        assert_eq!(secret.value, "bar");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempts() {
        let inner = Scripted::new(
            (0..10)
                .map(|_| Err(CredsError::transient("unavailable")))
                .collect(),
        );
        let secrets = RetryableSecrets::new(inner.clone(), config(3));

        let result = secrets.get("/foo").await;

        assert!(matches!(result, Err(CredsError::Transient { .. })));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_not_retried() {
        let inner = Scripted::new(vec![Ok(None)]);
        let secrets = RetryableSecrets::new(inner.clone(), config(5));

        assert!(secrets.get("/foo").await.unwrap().is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_errors_are_not_retried() {
        let inner = Scripted::new(vec![
            Err(CredsError::configuration("bad prefix")),
            Ok(Some(Secret::new(serde_json::json!("unreachable")))),
        ]);
        let secrets = RetryableSecrets::new(inner.clone(), config(5));

        assert!(matches!(
            secrets.get("/foo").await,
            Err(CredsError::Configuration { .. })
        ));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_calls_once() {
        let inner = Scripted::new(vec![Err(CredsError::transient("timeout"))]);
        let secrets = RetryableSecrets::new(inner.clone(), config(0));

        assert!(secrets.get("/foo").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
