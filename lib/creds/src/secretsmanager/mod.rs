// lib/creds/src/secretsmanager/mod.rs

mod api;
mod secrets;
pub mod sigv4;

pub use api::{HttpSecretsManagerApi, SecretValue, SecretsManagerApi};
pub use secrets::AwsSecretsManager;
pub use sigv4::AwsCredentials;

use crate::error::CredsError;
use crate::http::HttpSettings;
use crate::manager::{HealthResponse, Manager, ManagerFactory, parse_config};
use crate::secrets::{SecretsFactory, SharedSecretsFactory};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const NAME: &str = "secretsmanager";

/// Looked up by the health probe; not-found counts as healthy.
const HEALTH_SECRET: &str = "__concourse-health-check";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsManagerConfig {
    pub region: Option<String>,
    /// Overrides the regional endpoint, e.g. for a VPC endpoint.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
    #[serde(skip_serializing)]
    pub session_token: Option<String>,
    pub pipeline_secret_template: String,
    pub team_secret_template: String,
    pub shared_path: Option<String>,
}

impl Default for SecretsManagerConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint: None,
            access_key: None,
            secret_key: None,
            session_token: None,
            pipeline_secret_template: "/concourse/{{.Team}}/{{.Pipeline}}/{{.Secret}}".to_string(),
            team_secret_template: "/concourse/{{.Team}}/{{.Secret}}".to_string(),
            shared_path: None,
        }
    }
}

impl SecretsManagerConfig {
    fn region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .filter(|r| !r.is_empty())
    }

    fn credentials(&self) -> Result<AwsCredentials, CredsError> {
        let (access_key_id, secret_access_key, session_token) =
            match (&self.access_key, &self.secret_key) {
                (Some(key), Some(secret)) => (key.clone(), secret.clone(), self.session_token.clone()),
                (None, None) => {
                    let key = std::env::var("AWS_ACCESS_KEY_ID").ok();
                    let secret = std::env::var("AWS_SECRET_ACCESS_KEY").ok();
                    match (key, secret) {
                        (Some(key), Some(secret)) => {
                            (key, secret, std::env::var("AWS_SESSION_TOKEN").ok())
                        }
                        _ => {
                            return Err(CredsError::configuration(
                                "secretsmanager credentials not found in config or AWS_* environment",
                            ));
                        }
                    }
                }
                _ => {
                    return Err(CredsError::configuration(
                        "secretsmanager access_key and secret_key must be set together",
                    ));
                }
            };
        Ok(AwsCredentials {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }

    fn templates(&self) -> Result<Vec<Arc<SecretTemplate>>, CredsError> {
        Ok(vec![
            Arc::new(SecretTemplate::build(
                "pipeline-secret-template",
                &self.pipeline_secret_template,
            )?),
            Arc::new(SecretTemplate::build("team-secret-template", &self.team_secret_template)?),
        ])
    }
}

pub struct SecretsManager {
    config: SecretsManagerConfig,
    api: Option<Arc<dyn SecretsManagerApi>>,
}

impl SecretsManager {
    pub fn new(config: SecretsManagerConfig) -> Self {
        Self { config, api: None }
    }

    /// Uses a caller-provided API instead of the HTTP client.
    pub fn with_api(config: SecretsManagerConfig, api: Arc<dyn SecretsManagerApi>) -> Self {
        Self {
            config,
            api: Some(api),
        }
    }

    fn api(&self) -> Result<&Arc<dyn SecretsManagerApi>, CredsError> {
        self.api
            .as_ref()
            .ok_or_else(|| CredsError::configuration("secretsmanager manager is not initialized"))
    }
}

#[async_trait]
impl Manager for SecretsManager {
    fn name(&self) -> &'static str {
        NAME
    }

    fn config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or_default()
    }

    fn is_configured(&self) -> bool {
        self.config.region.is_some() || self.config.access_key.is_some()
    }

    async fn init(&mut self) -> Result<(), CredsError> {
        if self.api.is_some() {
            return Ok(());
        }

        let region = self
            .config
            .region()
            .ok_or_else(|| CredsError::configuration("secretsmanager region is required"))?;
        let endpoint = match &self.config.endpoint {
            Some(endpoint) => url::Url::parse(endpoint).map_err(|e| {
                CredsError::configuration(format!("invalid secretsmanager endpoint: {}", e))
            })?,
            None => HttpSecretsManagerApi::default_endpoint(&region)?,
        };
        let http = HttpSettings::default().build()?;

        tracing::info!(region = %region, endpoint = %endpoint, "AWS Secrets Manager client initialized");
        self.api = Some(Arc::new(HttpSecretsManagerApi::new(
            http,
            endpoint,
            region,
            self.config.credentials()?,
        )));
        Ok(())
    }

    fn validate(&self) -> Result<(), CredsError> {
        if self.config.region().is_none() {
            return Err(CredsError::configuration("secretsmanager region is required"));
        }
        self.config.templates()?;
        Ok(())
    }

    async fn new_secrets_factory(&mut self) -> Result<Arc<dyn SecretsFactory>, CredsError> {
        let secrets = AwsSecretsManager::new(
            Arc::clone(self.api()?),
            self.config.templates()?,
            self.config.shared_path.as_deref(),
        );
        Ok(Arc::new(SharedSecretsFactory::new(Arc::new(secrets))))
    }

    async fn health(&self) -> Result<HealthResponse, CredsError> {
        const METHOD: &str = "GetSecretValue";
        Ok(match self.api()?.get_secret_value(HEALTH_SECRET).await {
            Ok(_) => HealthResponse::healthy(METHOD, serde_json::json!("ok")),
            Err(e) => HealthResponse::unhealthy(METHOD, e),
        })
    }

    async fn close(&mut self) {
        self.api = None;
    }
}

pub struct SecretsManagerFactory;

impl ManagerFactory for SecretsManagerFactory {
    fn new_instance(&self, config: serde_json::Value) -> Result<Box<dyn Manager>, CredsError> {
        Ok(Box::new(SecretsManager::new(parse_config(NAME, config)?)))
    }
}
