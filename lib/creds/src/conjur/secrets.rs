// lib/creds/src/conjur/secrets.rs

use crate::error::CredsError;
use crate::http::status_error;
use crate::lookup::{SecretLookupPath, template_chain};
use crate::secrets::{Secret, Secrets};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

/// Access tokens are valid for eight minutes; refresh well before that.
const TOKEN_LIFETIME: Duration = Duration::from_secs(4 * 60);

/// How the client proves its identity to Conjur.
#[derive(Debug, Clone)]
pub enum ConjurCredentials {
    ApiKey { login: String, api_key: String },
    /// Token written by an authenticator sidecar, re-read on every request.
    TokenFile(PathBuf),
}

struct CachedToken {
    header: String,
    fetched_at: Instant,
}

/// Connection to a Conjur appliance.
pub struct ConjurClient {
    http: reqwest::Client,
    base_url: Url,
    account: String,
    credentials: ConjurCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl ConjurClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        account: impl Into<String>,
        credentials: ConjurCredentials,
    ) -> Self {
        Self {
            http,
            base_url,
            account: account.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, CredsError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CredsError::configuration("conjur url cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn authorization(&self) -> Result<String, CredsError> {
        let (login, api_key) = match &self.credentials {
            ConjurCredentials::TokenFile(path) => {
                let raw = tokio::fs::read(path).await.map_err(|e| {
                    CredsError::auth(format!("failed to read conjur token {}: {}", path.display(), e))
                })?;
                return Ok(token_header(&raw));
            }
            ConjurCredentials::ApiKey { login, api_key } => (login, api_key),
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.fetched_at.elapsed() < TOKEN_LIFETIME {
                return Ok(token.header.clone());
            }
        }

        let url = self.url(&["authn", self.account.as_str(), login.as_str(), "authenticate"])?;
        let response = self.http.post(url).body(api_key.clone()).send().await?;
        if !response.status().is_success() {
            return Err(match status_error(response).await {
                CredsError::Backend { message } => CredsError::auth(message),
                other => other,
            });
        }

        let header = token_header(&response.bytes().await?);
        tracing::debug!(account = %self.account, login = %login, "Conjur access token refreshed");
        *cached = Some(CachedToken {
            header: header.clone(),
            fetched_at: Instant::now(),
        });
        Ok(header)
    }

    /// Reads one variable; `None` when it does not exist.
    pub async fn retrieve(&self, id: &str) -> Result<Option<String>, CredsError> {
        let url = self.url(&["secrets", self.account.as_str(), "variable", id])?;
        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.authorization().await?)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.text().await?)),
            _ => Err(status_error(response).await),
        }
    }

    /// Unauthenticated server info, used as the health probe.
    pub async fn info(&self) -> Result<serde_json::Value, CredsError> {
        let response = self
            .http
            .get(self.url(&["info"])?)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }
}

fn token_header(raw: &[u8]) -> String {
    let trimmed = String::from_utf8_lossy(raw);
    format!("Token token=\"{}\"", STANDARD.encode(trimmed.trim()))
}

/// Conjur variables addressed through pipeline, team and fallback templates.
pub struct ConjurSecrets {
    client: Arc<ConjurClient>,
    templates: Vec<Arc<SecretTemplate>>,
}

impl ConjurSecrets {
    pub fn new(client: Arc<ConjurClient>, templates: Vec<Arc<SecretTemplate>>) -> Self {
        Self { client, templates }
    }
}

#[async_trait]
impl Secrets for ConjurSecrets {
    /// Root lookups are not supported; the fallback template plays that role.
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        _allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        template_chain(&self.templates, team, pipeline, None, None, false)
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        Ok(self
            .client
            .retrieve(path)
            .await?
            .map(|value| Secret::new(serde_json::Value::String(value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ConjurClient {
        ConjurClient::new(
            reqwest::Client::new(),
            Url::parse("https://conjur.example.com/api/").unwrap(),
            "myorg",
            ConjurCredentials::TokenFile(PathBuf::from("/nonexistent")),
        )
    }

    #[test]
    fn test_variable_ids_are_path_escaped() {
        let url = client()
            .url(&["secrets", "myorg", "variable", "concourse/main/db password"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://conjur.example.com/api/secrets/myorg/variable/concourse%2Fmain%2Fdb%20password"
        );
    }

    #[test]
    fn test_token_header_is_base64() {
        assert_eq!(token_header(b"{\"a\":1}\n"), "Token token=\"eyJhIjoxfQ==\"");
    }

    #[tokio::test]
    async fn test_missing_token_file_is_auth_error() {
        let err = client().retrieve("foo").await.unwrap_err();
        assert!(matches!(err, CredsError::Auth { .. }));
    }
}
