// lib/creds/src/dummy.rs

use crate::error::CredsError;
use crate::lookup::SecretLookupPath;
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{Secret, Secrets, SecretsFactory, SharedSecretsFactory};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAME: &str = "dummy";

/// Static variables from configuration, for local runs and tests.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DummyConfig {
    pub vars: BTreeMap<String, serde_json::Value>,
}

pub struct DummyManager {
    config: DummyConfig,
}

impl DummyManager {
    pub fn new(config: DummyConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Manager for DummyManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({ "vars": self.config.vars.keys().collect::<Vec<_>>() })
    }

    fn is_configured(&self) -> bool {
        !self.config.vars.is_empty()
    }

    async fn init(&mut self) -> Result<(), CredsError> {
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let secrets = DummySecrets {
            vars: self.config.vars.clone(),
        };
        Ok(Arc::new(SharedSecretsFactory::new(Arc::new(secrets))))
    }

    async fn health(&self) -> Result<HealthResponse, CredsError> {
        Ok(HealthResponse::healthy(
            "static",
            serde_json::json!({ "vars": self.config.vars.len() }),
        ))
    }

    async fn close(&mut self) {}
}

pub struct DummySecrets {
    vars: BTreeMap<String, serde_json::Value>,
}

impl DummySecrets {
    pub fn new(vars: BTreeMap<String, serde_json::Value>) -> Self {
        Self { vars }
    }
}

#[async_trait]
impl Secrets for DummySecrets {
    fn new_secret_lookup_paths(&self, _: &str, _: &str, _: bool) -> Vec<SecretLookupPath> {
        vec![SecretLookupPath::with_prefix("")]
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        Ok(self.vars.get(path).cloned().map(Secret::new))
    }
}

pub struct DummyManagerFactory;

impl ManagerFactory for DummyManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(DummyManager::new(parse_config(NAME, config)?)))
    }
}
