// lib/creds/src/vault/mod.rs

mod secrets;

pub use secrets::VaultSecrets;

use crate::error::CredsError;
use crate::lookup::join_path;
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{Secrets, SecretsFactory};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use vault_client::{
    ApiClient, AuthConfig, LoggedIn, ReAuther, ReAutherConfig, SecretReader, TlsConfig,
};

pub const NAME: &str = "vault";

const HEALTH_METHOD: &str = "/v1/sys/health";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultTlsConfig {
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultAuthConfig {
    #[serde(skip_serializing)]
    pub client_token: Option<String>,
    pub backend: Option<String>,
    #[serde(skip_serializing)]
    pub params: HashMap<String, String>,
    /// Forces a fresh login once a token is this old; zero disables.
    #[serde(with = "crate::duration")]
    pub backend_max_ttl: Duration,
    #[serde(with = "crate::duration")]
    pub retry_max: Duration,
    #[serde(with = "crate::duration")]
    pub retry_initial: Duration,
}

impl Default for VaultAuthConfig {
    fn default() -> Self {
        Self {
            client_token: None,
            backend: None,
            params: HashMap::new(),
            backend_max_ttl: Duration::ZERO,
            retry_max: Duration::from_secs(5 * 60),
            retry_initial: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub url: String,
    pub path_prefix: String,
    /// Relative to `path_prefix`, in precedence order.
    pub lookup_templates: Vec<String>,
    pub shared_path: String,
    pub namespace: String,
    pub tls: VaultTlsConfig,
    pub auth: VaultAuthConfig,
    #[serde(with = "crate::duration")]
    pub login_timeout: Duration,
    #[serde(with = "crate::duration")]
    pub query_timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            path_prefix: "/concourse".to_string(),
            lookup_templates: vec![
                "/{{.Team}}/{{.Pipeline}}/{{.Secret}}".to_string(),
                "/{{.Team}}/{{.Secret}}".to_string(),
            ],
            shared_path: String::new(),
            namespace: String::new(),
            tls: VaultTlsConfig::default(),
            auth: VaultAuthConfig::default(),
            login_timeout: Duration::from_secs(5),
            query_timeout: Duration::ZERO,
        }
    }
}

impl VaultConfig {
    fn templates(&self) -> Result<Vec<Arc<SecretTemplate>>, CredsError> {
        self.lookup_templates
            .iter()
            .enumerate()
            .map(|(i, template)| {
                let full = join_path(&[&self.path_prefix, template]);
                SecretTemplate::build(&format!("lookup-template-{}", i + 1), &full)
                    .map(Arc::new)
                    .map_err(CredsError::from)
            })
            .collect()
    }

    fn tls(&self) -> TlsConfig {
        TlsConfig {
            ca_cert_files: self.tls.ca_cert.iter().cloned().collect(),
            client_cert_file: self.tls.client_cert.clone(),
            client_key_file: self.tls.client_key.clone(),
            server_name: self.tls.server_name.clone(),
            insecure_skip_verify: self.tls.insecure_skip_verify,
        }
    }

    fn auth(&self) -> AuthConfig {
        AuthConfig {
            client_token: self.auth.client_token.clone(),
            backend: self.auth.backend.clone(),
            params: self.auth.params.clone(),
        }
    }

    fn reauther(&self) -> ReAutherConfig {
        ReAutherConfig {
            max_ttl: self.auth.backend_max_ttl,
            retry_initial: self.auth.retry_initial,
            retry_max: self.auth.retry_max,
            ..ReAutherConfig::default()
        }
    }
}

struct Running {
    client: Arc<ApiClient>,
    reauther: ReAuther,
}

pub struct VaultManager {
    config: VaultConfig,
    running: Option<Running>,
}

impl VaultManager {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }
}

#[async_trait]
impl Manager for VaultManager {
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
        let mut builder = ApiClient::builder()
            .base_url(&self.config.url)
            .tls(self.config.tls())
            .auth(self.config.auth())
            .namespace(&self.config.namespace);
        if !self.config.query_timeout.is_zero() {
            builder = builder.query_timeout(self.config.query_timeout);
        }

        let client = Arc::new(builder.build().await?);
        let reauther = ReAuther::spawn(client.clone(), self.config.reauther());
        tracing::info!(url = %self.config.url, "Vault client initialized");

        self.running = Some(Running { client, reauther });
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        let config = &self.config;

        url::Url::parse(&config.url)
            .map_err(|e| CredsError::configuration(format!("invalid vault url {:?}: {}", config.url, e)))?;

        if config.path_prefix.is_empty() {
            return Err(CredsError::configuration("vault path prefix must not be empty"));
        }

        config.templates()?;

        let has_token = config.auth.client_token.as_ref().is_some_and(|t| !t.is_empty());
        let has_backend = config.auth.backend.as_ref().is_some_and(|b| !b.is_empty());
        match (has_token, has_backend) {
            (true, true) => {
                return Err(CredsError::configuration(
                    "only one of vault client token or auth backend may be configured",
                ));
            }
            (false, false) => {
                return Err(CredsError::configuration(
                    "vault requires a client token or an auth backend",
                ));
            }
            _ => {}
        }

        if config.tls.client_cert.is_some() != config.tls.client_key.is_some() {
            return Err(CredsError::configuration(
                "vault client certificate and key must be configured together",
            ));
        }

        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| CredsError::configuration("vault manager is not initialized"))?;

        Ok(Arc::new(VaultFactory {
            reader: running.client.clone(),
            logged_in: running.reauther.logged_in(),
            login_timeout: self.config.login_timeout,
            prefix: self.config.path_prefix.clone(),
            templates: self.config.templates()?,
            shared_path: self.config.shared_path.clone(),
        }))
    }

    async fn health(&self) -> Result<HealthResponse, CredsError> {
        let running = self
            .running
            .as_ref()
            .ok_or_else(|| CredsError::configuration("vault manager is not initialized"))?;

        Ok(match running.client.health().await {
            Ok(response) => HealthResponse::healthy(HEALTH_METHOD, response),
            Err(e) => HealthResponse::unhealthy(HEALTH_METHOD, e),
        })
    }

    async fn close(&mut self) {
        if let Some(mut running) = self.running.take() {
            running.reauther.stop().await;
        }
    }
}

pub struct VaultFactory {
    reader: Arc<dyn SecretReader>,
    logged_in: LoggedIn,
    login_timeout: Duration,
    prefix: String,
    templates: Vec<Arc<SecretTemplate>>,
    shared_path: String,
}

#[async_trait]
impl SecretsFactory for VaultFactory {
    /// Waits up to the login timeout for the first login. On timeout the
    /// secrets are handed out anyway and reads go out unauthenticated until
    /// a login succeeds.
    async fn new_secrets(&self) -> Arc<dyn Secrets> {
        match tokio::time::timeout(self.login_timeout, self.logged_in.wait()).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("vault re-auth loop stopped before logging in"),
            Err(_) => tracing::warn!(
                timeout = ?self.login_timeout,
                "vault login not confirmed in time; continuing without authentication"
            ),
        }

        Arc::new(VaultSecrets::new(
            self.reader.clone(),
            &self.prefix,
            self.templates.clone(),
            Some(&self.shared_path),
        ))
    }
}

pub struct VaultManagerFactory;

impl ManagerFactory for VaultManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(VaultManager::new(parse_config(NAME, config)?)))
    }
}
