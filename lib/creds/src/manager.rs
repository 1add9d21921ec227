// lib/creds/src/manager.rs

use crate::error::CredsError;
use crate::secrets::SecretsFactory;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of probing a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub method: String,
}

impl HealthResponse {
    pub fn healthy(method: impl Into<String>, response: serde_json::Value) -> Self {
        Self {
            response: Some(response),
            error: None,
            method: method.into(),
        }
    }

    pub fn unhealthy(method: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            response: None,
            error: Some(error.to_string()),
            method: method.into(),
        }
    }
}

/// Where a manager is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ManagerState {
    Unconfigured,
    Initialized,
    Validated,
    Ready,
}

/// Configuration and lifecycle of one secret backend.
#[async_trait]
pub trait Manager: Send + Sync {
    fn name(&self) -> &'static str;

    /// Configuration with credentials stripped.
    fn config(&self) -> serde_json::Value;

    /// True when the required fields are set.
    fn is_configured(&self) -> bool;

    /// Sets up clients and starts background tasks.
    async fn init(&mut self) -> Result<(), CredsError>;

    fn validate(&self) -> Result<(), CredsError>;

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError>;

    async fn health(&self) -> Result<HealthResponse, CredsError>;

    /// Stops whatever `init` started.
    async fn close(&mut self);
}

pub trait ManagerFactory: Send + Sync {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError>;
}

impl<F> ManagerFactory for F
where
    F: Fn(serde_json::Value) -> Result<Box<dyn Manager>, CredsError> + Send + Sync,
{
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        self(config)
    }
}

/// Deserializes a manager config, reporting failures as configuration errors.
pub fn parse_config<T: serde::de::DeserializeOwned>(
    manager: &str,
    config: serde_json::Value,
) -> Result<T, CredsError> {
    let config = if config.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        config
    };
    serde_json::from_value(config)
        .map_err(|e| CredsError::configuration(format!("{} config: {}", manager, e)))
}

/// Name-keyed manager factories. Built once at startup and passed around.
#[derive(Default)]
pub struct ManagerRegistry {
    factories: BTreeMap<&'static str, Arc<dyn ManagerFactory>>,
}

impl ManagerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend shipped with this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(crate::vault::NAME, Arc::new(crate::vault::VaultManagerFactory));
        registry.register(crate::conjur::NAME, Arc::new(crate::conjur::ConjurManagerFactory));
        registry.register(crate::credhub::NAME, Arc::new(crate::credhub::CredHubManagerFactory));
        registry.register(
            crate::kubernetes::NAME,
            Arc::new(crate::kubernetes::KubernetesManagerFactory),
        );
        registry.register(
            crate::secretsmanager::NAME,
            Arc::new(crate::secretsmanager::SecretsManagerFactory),
        );
        registry.register(crate::dummy::NAME, Arc::new(crate::dummy::DummyManagerFactory));
        registry
    }

    /// Replaces any factory already registered under `name`.
    pub fn register(&mut self, name: &'static str, factory: Arc<dyn ManagerFactory>) {
        tracing::debug!(manager = name, "Registering credential manager");
        self.factories.insert(name, factory);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagerFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl std::fmt::Debug for ManagerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagerRegistry")
            .field("managers", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let registry = ManagerRegistry::builtin();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec!["conjur", "credhub", "dummy", "kubernetes", "secretsmanager", "vault"]
        );
    }

    #[test]
    fn test_closure_factory() {
        let mut registry = ManagerRegistry::new();
        registry.register(
            "custom",
            Arc::new(|config: serde_json::Value| crate::dummy::DummyManagerFactory.new_instance(config)),
        );

        let manager = registry
            .get("custom")
            .unwrap()
            .new_instance(serde_json::json!({"vars": {"foo": "bar"}}))
            .unwrap();
        assert!(manager.is_configured());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_parse_config_accepts_null() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct Config {
            url: String,
        }

        let config: Config = parse_config("test", serde_json::Value::Null).unwrap();
        assert!(config.url.is_empty());

        let result: Result<Config, _> = parse_config("test", serde_json::json!({"url": 5}));
        assert!(matches!(result, Err(CredsError::Configuration { .. })));
    }

    #[test]
    fn test_health_response_serialization() {
        let health = HealthResponse::unhealthy("/v1/sys/health", "connection refused");
        assert_eq!(
            serde_json::to_value(&health).unwrap(),
            serde_json::json!({"error": "connection refused", "method": "/v1/sys/health"})
        );
    }
}
