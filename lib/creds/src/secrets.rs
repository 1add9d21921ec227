// lib/creds/src/secrets.rs

use crate::error::CredsError;
use crate::lookup::SecretLookupPath;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A resolved secret value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Secret {
    pub value: serde_json::Value,
    /// When the value stops being valid, if the backend says so.
    pub expiration: Option<DateTime<Utc>>,
}

impl Secret {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value, expiration: None }
    }

    pub fn expiring(value: serde_json::Value, expiration: DateTime<Utc>) -> Self {
        Self {
            value,
            expiration: Some(expiration),
        }
    }
}

/// A secret backend as seen by the pipeline engine.
///
/// `get` is tri-state: `Ok(Some(_))` found, `Ok(None)` not found, `Err(_)` failure.
#[async_trait]
pub trait Secrets: Send + Sync {
    /// Candidate paths in precedence order, most specific first.
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        allow_root_path: bool,
    ) -> Vec<SecretLookupPath>;

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError>;
}

#[async_trait]
pub trait SecretsFactory: Send + Sync {
    async fn new_secrets(&self) -> Arc<dyn Secrets>;
}

/// Factory that hands out the same instance every time.
pub struct SharedSecretsFactory(Arc<dyn Secrets>);

impl SharedSecretsFactory {
    pub fn new(secrets: Arc<dyn Secrets>) -> Self {
        Self(secrets)
    }
}

#[async_trait]
impl SecretsFactory for SharedSecretsFactory {
    async fn new_secrets(&self) -> Arc<dyn Secrets> {
        Arc::clone(&self.0)
    }
}
