// lib/creds/src/credhub/mod.rs

mod secrets;

pub use secrets::{CredHubClient, CredHubSecrets, UaaClient};

use crate::error::CredsError;
use crate::http::HttpSettings;
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{SecretsFactory, SharedSecretsFactory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const NAME: &str = "credhub";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredHubConfig {
    pub url: String,
    pub path_prefix: String,
    pub ca_certs: Vec<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub insecure_skip_verify: bool,
    pub client_id: Option<String>,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
}

impl Default for CredHubConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path_prefix: "/concourse".to_string(),
            ca_certs: Vec::new(),
            client_cert: None,
            client_key: None,
            insecure_skip_verify: false,
            client_id: None,
            client_secret: None,
        }
    }
}

impl CredHubConfig {
    fn uaa(&self) -> Option<UaaClient> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Some(UaaClient {
                client_id: id.clone(),
                client_secret: secret.clone(),
            }),
            _ => None,
        }
    }
}

pub struct CredHubManager {
    config: CredHubConfig,
    client: Option<Arc<CredHubClient>>,
}

impl CredHubManager {
    pub fn new(config: CredHubConfig) -> Self {
        Self { config, client: None }
    }

    fn client(&self) -> Result<&Arc<CredHubClient>, CredsError> {
        self.client
            .as_ref()
            .ok_or_else(|| CredsError::configuration("credhub manager is not initialized"))
    }
}

#[async_trait]
impl Manager for CredHubManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn is_configured(&self) -> bool {
        !self.config.url.is_empty()
    }

    async fn init(&mut self) -> Result<(), CredsError> {
        let http = HttpSettings {
            ca_certs: self.config.ca_certs.clone(),
            client_cert: self.config.client_cert.clone(),
            client_key: self.config.client_key.clone(),
            insecure_skip_verify: self.config.insecure_skip_verify,
            timeout: None,
        }
        .build()?;

        self.client = Some(Arc::new(CredHubClient::new(
            http,
            &self.config.url,
            self.config.uaa(),
        )));
        tracing::info!(url = %self.config.url, "CredHub client initialized");
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        url::Url::parse(&self.config.url)
            .map_err(|e| CredsError::configuration(format!("invalid credhub url: {}", e)))?;
        if self.config.path_prefix.is_empty() {
            return Err(CredsError::configuration("credhub path_prefix must not be empty"));
        }
        if self.config.client_cert.is_some() != self.config.client_key.is_some() {
            return Err(CredsError::configuration(
                "credhub client_cert and client_key must be set together",
            ));
        }
        if self.config.client_id.is_some() != self.config.client_secret.is_some() {
            return Err(CredsError::configuration(
                "credhub client_id and client_secret must be set together",
            ));
        }
        if self.config.client_cert.is_none() && self.config.client_id.is_none() {
            return Err(CredsError::configuration(
                "credhub requires a client certificate or UAA client credentials",
            ));
        }
        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let secrets = CredHubSecrets::new(Arc::clone(self.client()?), &self.config.path_prefix);
        Ok(Arc::new(SharedSecretsFactory::new(Arc::new(secrets))))
    }

    async fn health(&self) -> Result<HealthResponse, CredsError> {
        const METHOD: &str = "/info";
        Ok(match self.client()?.info().await {
            Ok(info) => HealthResponse::healthy(METHOD, info),
            Err(e) => HealthResponse::unhealthy(METHOD, e),
        })
    }

    async fn close(&mut self) {
        self.client = None;
    }
}

pub struct CredHubManagerFactory;

impl ManagerFactory for CredHubManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(CredHubManager::new(parse_config(NAME, config)?)))
    }
}
