// lib/creds/src/secretsmanager/api.rs

use super::sigv4::{AwsCredentials, SignableRequest, sign};
use crate::error::CredsError;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use url::Url;

const SERVICE: &str = "secretsmanager";
const TARGET: &str = "secretsmanager.GetSecretValue";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

/// Payload of a stored secret version.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretValue {
    String(String),
    Binary(Vec<u8>),
}

/// The slice of the Secrets Manager API this crate uses.
#[async_trait]
pub trait SecretsManagerApi: Send + Sync {
    /// `Ok(None)` when the secret does not exist or is scheduled for deletion.
    async fn get_secret_value(&self, secret_id: &str) -> Result<Option<SecretValue>, CredsError>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueRequest<'a> {
    secret_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetSecretValueResponse {
    secret_string: Option<String>,
    secret_binary: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl ErrorResponse {
    /// `__type` may carry a namespace prefix ("com.amazonaws...#Name").
    fn short_kind(&self) -> &str {
        self.kind.rsplit('#').next().unwrap_or(&self.kind)
    }

    fn is_not_found(&self) -> bool {
        match self.short_kind() {
            "ResourceNotFoundException" => true,
            "InvalidRequestException" => self.message.contains("marked for deletion"),
            _ => false,
        }
    }
}

/// JSON-protocol client signed with SigV4.
pub struct HttpSecretsManagerApi {
    http: reqwest::Client,
    endpoint: Url,
    region: String,
    credentials: AwsCredentials,
}

impl HttpSecretsManagerApi {
    pub fn new(
        http: reqwest::Client,
        endpoint: Url,
        region: impl Into<String>,
        credentials: AwsCredentials,
    ) -> Self {
        Self {
            http,
            endpoint,
            region: region.into(),
            credentials,
        }
    }

    /// Regional endpoint for `region`.
    pub fn default_endpoint(region: &str) -> Result<Url, CredsError> {
        Url::parse(&format!("https://secretsmanager.{}.amazonaws.com/", region))
            .map_err(|e| CredsError::configuration(format!("invalid region {}: {}", region, e)))
    }

    fn host(&self) -> Result<String, CredsError> {
        let host = self
            .endpoint
            .host_str()
            .ok_or_else(|| CredsError::configuration("secretsmanager endpoint has no host"))?;
        Ok(match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        })
    }
}

#[async_trait]
impl SecretsManagerApi for HttpSecretsManagerApi {
    async fn get_secret_value(&self, secret_id: &str) -> Result<Option<SecretValue>, CredsError> {
        let body = serde_json::to_vec(&GetSecretValueRequest { secret_id })?;

        let mut signable = SignableRequest::new("POST", self.endpoint.path(), &body)
            .header("host", self.host()?)
            .header("content-type", CONTENT_TYPE)
            .header("x-amz-target", TARGET);
        sign(
            &mut signable,
            &self.credentials,
            &self.region,
            SERVICE,
            chrono::Utc::now(),
        )?;

        let mut request = self.http.post(self.endpoint.clone());
        for (name, value) in &signable.headers {
            if name != "host" {
                request = request.header(name.as_str(), value.as_str());
            }
        }
        let response = request.body(body.clone()).send().await?;

        let status = response.status();
        if status.is_success() {
            let payload: GetSecretValueResponse = response.json().await?;
            return match (payload.secret_string, payload.secret_binary) {
                (Some(s), _) => Ok(Some(SecretValue::String(s))),
                (None, Some(b)) => STANDARD
                    .decode(b)
                    .map(|bytes| Some(SecretValue::Binary(bytes)))
                    .map_err(|e| CredsError::backend(format!("invalid SecretBinary: {}", e))),
                (None, None) => Ok(None),
            };
        }

        let text = response.text().await.unwrap_or_default();
        let error: ErrorResponse = serde_json::from_str(&text).unwrap_or(ErrorResponse {
            kind: String::new(),
            message: text.clone(),
        });
        if error.is_not_found() {
            return Ok(None);
        }
        if error.short_kind().contains("Throttling") {
            return Err(CredsError::transient(format!(
                "{}: {}",
                error.short_kind(),
                error.message
            )));
        }
        Err(CredsError::from_status(
            status.as_u16(),
            format!("{}: {}", error.short_kind(), error.message),
        ))
    }
}
