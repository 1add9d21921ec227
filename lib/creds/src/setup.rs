// lib/creds/src/setup.rs

use crate::builder::SecretsBuilder;
use crate::cache::CacheConfig;
use crate::error::CredsError;
use crate::manager::{HealthResponse, Manager, ManagerRegistry, ManagerState};
use crate::noop::NoopSecrets;
use crate::retry::RetryConfig;
use crate::secrets::Secrets;
use std::sync::Arc;
use tracing::Instrument;

/// Every manager named in the configuration, instantiated but not started.
pub struct CredentialManagers {
    managers: Vec<Box<dyn Manager>>,
}

impl CredentialManagers {
    pub fn from_config(
        registry: &ManagerRegistry,
        configs: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, CredsError> {
        let mut managers = Vec::with_capacity(configs.len());
        for (name, config) in configs {
            let factory = registry.get(name).ok_or_else(|| {
                CredsError::configuration(format!(
                    "unknown credential manager {:?} (known: {})",
                    name,
                    registry.names().collect::<Vec<_>>().join(", ")
                ))
            })?;
            managers.push(factory.new_instance(config.clone())?);
        }
        Ok(Self { managers })
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Manager> {
        self.managers.iter().map(|m| m.as_ref())
    }

    /// The single configured manager, if any. Configuring several is an error.
    pub fn select(self) -> Result<Option<Box<dyn Manager>>, CredsError> {
        let mut configured: Vec<Box<dyn Manager>> = self
            .managers
            .into_iter()
            .filter(|m| m.is_configured())
            .collect();

        match configured.len() {
            0 => Ok(None),
            1 => Ok(configured.pop()),
            _ => Err(CredsError::configuration(format!(
                "multiple credential managers configured: {}",
                configured
                    .iter()
                    .map(|m| m.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

/// A started manager and the decorated secrets built from it.
pub struct ActiveCredentials {
    manager: Option<Box<dyn Manager>>,
    state: ManagerState,
    secrets: Arc<dyn Secrets>,
}

impl ActiveCredentials {
    /// Runs init, validate and factory construction. Without a manager,
    /// every lookup reports not found.
    pub async fn start(
        manager: Option<Box<dyn Manager>>,
        retry: RetryConfig,
        cache: CacheConfig,
    ) -> Result<Self, CredsError> {
        let Some(mut manager) = manager else {
            tracing::info!("no credential manager configured");
            return Ok(Self {
                manager: None,
                state: ManagerState::Unconfigured,
                secrets: Arc::new(NoopSecrets),
            });
        };

        let span = tracing::info_span!("credential_manager", manager = manager.name());
        let started = Self::bring_up(manager.as_mut(), retry, cache)
            .instrument(span)
            .await;

        match started {
            Ok(secrets) => {
                tracing::info!(config = %manager.config(), "credential manager ready");
                Ok(Self {
                    manager: Some(manager),
                    state: ManagerState::Ready,
                    secrets,
                })
            }
            Err((state, e)) => {
                tracing::error!(state = ?state, error = %e, "credential manager failed to start");
                manager.close().await;
                Err(e)
            }
        }
    }

    async fn bring_up(
        manager: &mut dyn Manager,
        retry: RetryConfig,
        cache: CacheConfig,
    ) -> Result<Arc<dyn Secrets>, (ManagerState, CredsError)> {
        manager
            .init()
            .await
            .map_err(|e| (ManagerState::Unconfigured, e))?;
        manager
            .validate()
            .map_err(|e| (ManagerState::Initialized, e))?;
        let factory = manager
            .new_secrets_factory()
            .await
            .map_err(|e| (ManagerState::Validated, e))?;

        let backend = factory.new_secrets().await;
        Ok(SecretsBuilder::new(backend).retry(retry).cache(cache).build())
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn manager_name(&self) -> Option<&'static str> {
        self.manager.as_ref().map(|m| m.name())
    }

    pub fn secrets(&self) -> Arc<dyn Secrets> {
        Arc::clone(&self.secrets)
    }

    pub async fn health(&self) -> Result<Option<HealthResponse>, CredsError> {
        match &self.manager {
            Some(manager) => manager.health().await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn close(mut self) {
        if let Some(mut manager) = self.manager.take() {
            tracing::info!(manager = manager.name(), "closing credential manager");
            manager.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secrets::{SecretsFactory, SharedSecretsFactory};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn configs(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_unknown_manager_is_rejected() {
        let registry = ManagerRegistry::builtin();
        let result = CredentialManagers::from_config(&registry, &configs(json!({"lastpass": {}})));
        assert!(matches!(result, Err(CredsError::Configuration { .. })));
    }

    #[test]
    fn test_select_single_configured() {
        let registry = ManagerRegistry::builtin();
        let managers = CredentialManagers::from_config(
            &registry,
            &configs(json!({
                "dummy": {"vars": {"foo": "bar"}},
                "vault": {}
            })),
        )
        .unwrap();
        assert_eq!(managers.iter().count(), 2);

        let selected = managers.select().unwrap().unwrap();
        assert_eq!(selected.name(), "dummy");
    }

    #[test]
    fn test_select_rejects_multiple() {
        let registry = ManagerRegistry::builtin();
        let managers = CredentialManagers::from_config(
            &registry,
            &configs(json!({
                "dummy": {"vars": {"foo": "bar"}},
                "vault": {"url": "http://127.0.0.1:8200", "auth": {"client_token": "t"}}
            })),
        )
        .unwrap();

        let err = managers.select().err().unwrap();
        assert!(err.to_string().contains("dummy"));
        assert!(err.to_string().contains("vault"));
    }

    #[tokio::test]
    async fn test_no_manager_means_noop() {
        let active = ActiveCredentials::start(None, RetryConfig::default(), CacheConfig::default())
            .await
            .unwrap();
        assert_eq!(active.state(), ManagerState::Unconfigured);
        assert!(active.secrets().get("/anything").await.unwrap().is_none());
        assert!(active.health().await.unwrap().is_none());
    }

    /// Records lifecycle calls; optionally fails validation.
    struct Recording {
        calls: Arc<Mutex<Vec<&'static str>>>,
        invalid: bool,
    }

    #[async_trait]
    impl Manager for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn config(&self) -> serde_json::Value {
            json!({})
        }

        fn is_configured(&self) -> bool {
            true
        }

        async fn init(&mut self) -> Result<(), CredsError> {
            self.calls.lock().unwrap().push("init");
            Ok(())
        }

        fn validate(&self) -> Result<(), CredsError> {
            self.calls.lock().unwrap().push("validate");
            if self.invalid {
                return Err(CredsError::configuration("invalid"));
            }
            Ok(())
        }

        async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
            self.calls.lock().unwrap().push("factory");
            Ok(Arc::new(SharedSecretsFactory::new(Arc::new(NoopSecrets))))
        }

        async fn health(&self) -> Result<HealthResponse, CredsError> {
            Ok(HealthResponse::healthy("test", json!({})))
        }

        async fn close(&mut self) {
            self.calls.lock().unwrap().push("close");
        }
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = Box::new(Recording {
            calls: calls.clone(),
            invalid: false,
        });

        let active = ActiveCredentials::start(Some(manager), RetryConfig::default(), CacheConfig::default())
            .await
            .unwrap();
        assert_eq!(active.state(), ManagerState::Ready);
        assert_eq!(active.manager_name(), Some("recording"));
        assert!(active.health().await.unwrap().is_some());

        active.close().await;
        assert_eq!(*calls.lock().unwrap(), vec!["init", "validate", "factory", "close"]);
    }

    #[tokio::test]
    async fn test_failed_validation_closes_manager() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let manager = Box::new(Recording {
            calls: calls.clone(),
            invalid: true,
        });

        let result =
            ActiveCredentials::start(Some(manager), RetryConfig::default(), CacheConfig::default()).await;
        assert!(matches!(result, Err(CredsError::Configuration { .. })));
        assert_eq!(*calls.lock().unwrap(), vec!["init", "validate", "close"]);
    }
}
