// lib/creds/src/conjur/mod.rs

mod secrets;

pub use secrets::{ConjurClient, ConjurCredentials, ConjurSecrets};

use crate::error::CredsError;
use crate::http::HttpSettings;
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{SecretsFactory, SharedSecretsFactory};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

pub const NAME: &str = "conjur";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConjurConfig {
    pub url: String,
    pub account: String,
    pub login: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub token_file: Option<PathBuf>,
    pub cert_file: Option<PathBuf>,
    pub pipeline_secret_template: String,
    pub team_secret_template: String,
    /// Tried last, for secrets shared across teams.
    pub secret_template: String,
}

impl Default for ConjurConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            account: String::new(),
            login: None,
            api_key: None,
            token_file: None,
            cert_file: None,
            pipeline_secret_template: "concourse/{{.Team}}/{{.Pipeline}}/{{.Secret}}".to_string(),
            team_secret_template: "concourse/{{.Team}}/{{.Secret}}".to_string(),
            secret_template: "vaultName/{{.Secret}}".to_string(),
        }
    }
}

impl ConjurConfig {
    fn templates(&self) -> Result<Vec<Arc<SecretTemplate>>, CredsError> {
        [
            ("pipeline-secret-template", &self.pipeline_secret_template),
            ("team-secret-template", &self.team_secret_template),
            ("secret-template", &self.secret_template),
        ]
        .into_iter()
        .map(|(name, source)| Ok(Arc::new(SecretTemplate::build(name, source)?)))
        .collect()
    }

    fn credentials(&self) -> Result<ConjurCredentials, CredsError> {
        match (&self.login, &self.api_key, &self.token_file) {
            (Some(login), Some(api_key), None) => Ok(ConjurCredentials::ApiKey {
                login: login.clone(),
                api_key: api_key.clone(),
            }),
            (None, None, Some(path)) => Ok(ConjurCredentials::TokenFile(path.clone())),
            _ => Err(CredsError::configuration(
                "conjur requires either login and api_key or token_file",
            )),
        }
    }
}

pub struct ConjurManager {
    config: ConjurConfig,
    client: Option<Arc<ConjurClient>>,
}

impl ConjurManager {
    pub fn new(config: ConjurConfig) -> Self {
        Self { config, client: None }
    }

    fn client(&self) -> Result<&Arc<ConjurClient>, CredsError> {
        self.client
            .as_ref()
            .ok_or_else(|| CredsError::configuration("conjur manager is not initialized"))
    }
}

#[async_trait]
impl Manager for ConjurManager {
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
        let base_url = Url::parse(&self.config.url)
            .map_err(|e| CredsError::configuration(format!("invalid conjur url: {}", e)))?;
        let http = HttpSettings {
            ca_certs: self.config.cert_file.iter().cloned().collect(),
            ..HttpSettings::default()
        }
        .build()?;

        self.client = Some(Arc::new(ConjurClient::new(
            http,
            base_url,
            &self.config.account,
            self.config.credentials()?,
        )));
        tracing::info!(url = %self.config.url, account = %self.config.account, "Conjur client initialized");
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        if self.config.url.is_empty() {
            return Err(CredsError::configuration("conjur url is required"));
        }
        if self.config.account.is_empty() {
            return Err(CredsError::configuration("conjur account is required"));
        }
        self.config.credentials()?;
        self.config.templates()?;
        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let secrets = ConjurSecrets::new(Arc::clone(self.client()?), self.config.templates()?);
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

pub struct ConjurManagerFactory;

impl ManagerFactory for ConjurManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(ConjurManager::new(parse_config(NAME, config)?)))
    }
}
