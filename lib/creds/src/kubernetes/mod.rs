// lib/creds/src/kubernetes/mod.rs

mod secrets;

pub use secrets::{KubernetesSecrets, TokenSource};

use crate::error::CredsError;
use crate::http::{HttpSettings, status_error};
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{SecretsFactory, SharedSecretsFactory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const NAME: &str = "kubernetes";

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// Use the pod's service account and the in-cluster API address.
    pub in_cluster: bool,
    pub api_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub token_file: Option<PathBuf>,
    pub ca_cert: Option<PathBuf>,
    pub insecure_skip_verify: bool,
    pub namespace_prefix: String,
    #[serde(with = "crate::duration")]
    pub query_timeout: Duration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            in_cluster: false,
            api_url: String::new(),
            token: None,
            token_file: None,
            ca_cert: None,
            insecure_skip_verify: false,
            namespace_prefix: "concourse-".to_string(),
            query_timeout: Duration::ZERO,
        }
    }
}

struct Connection {
    http: reqwest::Client,
    api_url: String,
    token: TokenSource,
}

pub struct KubernetesManager {
    config: KubernetesConfig,
    connection: Option<Connection>,
}

impl KubernetesManager {
    pub fn new(config: KubernetesConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    fn connect(&self) -> Result<Connection, CredsError> {
        let config = &self.config;
        let (api_url, token, ca_cert) = if config.in_cluster {
            let host = std::env::var("KUBERNETES_SERVICE_HOST").map_err(|_| {
                CredsError::configuration("in-cluster mode requires KUBERNETES_SERVICE_HOST")
            })?;
            let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());
            let dir = PathBuf::from(SERVICE_ACCOUNT_DIR);
            (
                format!("https://{}:{}", host, port),
                TokenSource::File(dir.join("token")),
                Some(config.ca_cert.clone().unwrap_or_else(|| dir.join("ca.crt"))),
            )
        } else {
            let token = match (&config.token, &config.token_file) {
                (Some(token), _) => TokenSource::Static(token.clone()),
                (None, Some(path)) => TokenSource::File(path.clone()),
                (None, None) => TokenSource::None,
            };
            (config.api_url.clone(), token, config.ca_cert.clone())
        };

        let http = HttpSettings {
            ca_certs: ca_cert.into_iter().collect(),
            insecure_skip_verify: config.insecure_skip_verify,
            timeout: (!config.query_timeout.is_zero()).then_some(config.query_timeout),
            ..HttpSettings::default()
        }
        .build()?;

        Ok(Connection { http, api_url, token })
    }
}

#[async_trait]
impl Manager for KubernetesManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn is_configured(&self) -> bool {
        self.config.in_cluster || !self.config.api_url.is_empty()
    }

    async fn init(&mut self) -> Result<(), CredsError> {
        let connection = self.connect()?;
        tracing::info!(api_url = %connection.api_url, "Kubernetes client initialized");
        self.connection = Some(connection);
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        if self.config.in_cluster && !self.config.api_url.is_empty() {
            return Err(CredsError::configuration(
                "kubernetes in_cluster and api_url are mutually exclusive",
            ));
        }
        if !self.config.in_cluster {
            url::Url::parse(&self.config.api_url).map_err(|e| {
                CredsError::configuration(format!("invalid kubernetes api_url: {}", e))
            })?;
        }
        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| CredsError::configuration("kubernetes manager is not initialized"))?;

        let secrets = KubernetesSecrets::new(
            connection.http.clone(),
            &connection.api_url,
            connection.token.clone(),
            &self.config.namespace_prefix,
        );
        Ok(Arc::new(SharedSecretsFactory::new(Arc::new(secrets))))
    }

    async fn health(&self) -> Result<HealthResponse, CredsError> {
        const METHOD: &str = "/version";
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| CredsError::configuration("kubernetes manager is not initialized"))?;

        let probe = async {
            let response = connection
                .http
                .get(format!("{}{}", connection.api_url.trim_end_matches('/'), METHOD))
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }
            Ok::<_, CredsError>(response.json::<serde_json::Value>().await?)
        };

        Ok(match probe.await {
            Ok(version) => HealthResponse::healthy(METHOD, version),
            Err(e) => HealthResponse::unhealthy(METHOD, e),
        })
    }

    async fn close(&mut self) {
        self.connection = None;
    }
}

pub struct KubernetesManagerFactory;

impl ManagerFactory for KubernetesManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(KubernetesManager::new(parse_config(NAME, config)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(config: serde_json::Value) -> KubernetesManager {
        KubernetesManager::new(parse_config(NAME, config).unwrap())
    }

    #[test]
    fn test_in_cluster_and_url_conflict() {
        let manager = manager(json!({"in_cluster": true, "api_url": "https://k8s:6443"}));
        assert!(manager.is_configured());
        assert!(manager.validate().is_err());
    }

    #[test]
    fn test_explicit_url() {
        let manager = manager(json!({"api_url": "https://k8s:6443", "token": "abc"}));
        manager.validate().unwrap();
        assert_eq!(manager.config.namespace_prefix, "concourse-");
        assert!(manager.config().get("token").is_none());
    }

    #[test]
    fn test_unconfigured_by_default() {
        assert!(!manager(json!({})).is_configured());
    }
}
