// lib/creds/src/credhub/secrets.rs

use crate::error::CredsError;
use crate::http::status_error;
use crate::lookup::{SecretLookupPath, join_path};
use crate::secrets::{Secret, Secrets};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Tokens are refreshed this long before UAA says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct UaaClient {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Deserialize)]
struct Info {
    #[serde(rename = "auth-server")]
    auth_server: AuthServer,
}

#[derive(Deserialize)]
struct AuthServer {
    url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Deserialize)]
struct DataResponse {
    #[serde(default)]
    data: Vec<Credential>,
}

#[derive(Deserialize)]
struct Credential {
    value: serde_json::Value,
}

struct AccessToken {
    token: String,
    valid_until: Instant,
}

/// CredHub API client. Authenticates with the mTLS identity baked into
/// `http` and, when configured, a UAA bearer token.
pub struct CredHubClient {
    http: reqwest::Client,
    url: String,
    uaa: Option<UaaClient>,
    token: Mutex<Option<AccessToken>>,
}

impl CredHubClient {
    pub fn new(http: reqwest::Client, url: &str, uaa: Option<UaaClient>) -> Self {
        Self {
            http,
            url: url.trim_end_matches('/').to_string(),
            uaa,
            token: Mutex::new(None),
        }
    }

    /// Server info; also tells us where the UAA lives.
    pub async fn info(&self) -> Result<serde_json::Value, CredsError> {
        let response = self.http.get(format!("{}/info", self.url)).send().await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn bearer(&self) -> Result<Option<String>, CredsError> {
        let Some(uaa) = &self.uaa else {
            return Ok(None);
        };

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.valid_until {
                return Ok(Some(token.token.clone()));
            }
        }

        let info: Info = serde_json::from_value(self.info().await?)?;
        let response = self
            .http
            .post(format!("{}/oauth/token", info.auth_server.url.trim_end_matches('/')))
            .basic_auth(&uaa.client_id, Some(&uaa.client_secret))
            .form(&[("grant_type", "client_credentials"), ("response_type", "token")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(match status_error(response).await {
                CredsError::Backend { message } => CredsError::auth(message),
                other => other,
            });
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!(client_id = %uaa.client_id, expires_in = token.expires_in, "UAA token refreshed");
        *cached = Some(AccessToken {
            token: token.access_token.clone(),
            valid_until: Instant::now() + lifetime,
        });
        Ok(Some(token.access_token))
    }

    /// Current value of the named credential.
    pub async fn get_latest(&self, name: &str) -> Result<Option<serde_json::Value>, CredsError> {
        let mut request = self
            .http
            .get(format!("{}/api/v1/data", self.url))
            .query(&[("name", name), ("current", "true")]);
        if let Some(token) = self.bearer().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body: DataResponse = response.json().await?;
                Ok(body.data.into_iter().next().map(|c| c.value))
            }
            _ => Err(status_error(response).await),
        }
    }
}

pub struct CredHubSecrets {
    client: Arc<CredHubClient>,
    prefix: String,
}

impl CredHubSecrets {
    pub fn new(client: Arc<CredHubClient>, prefix: &str) -> Self {
        Self {
            client,
            prefix: prefix.to_string(),
        }
    }

    fn scoped(&self, parts: &[&str]) -> String {
        let mut all = vec![self.prefix.as_str()];
        all.extend_from_slice(parts);
        let joined = join_path(&all);
        if joined.ends_with('/') {
            joined
        } else {
            format!("{}/", joined)
        }
    }
}

#[async_trait]
impl Secrets for CredHubSecrets {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        let mut paths = Vec::with_capacity(3);
        if !pipeline.is_empty() {
            paths.push(SecretLookupPath::with_prefix(self.scoped(&[team, pipeline])));
        }
        paths.push(SecretLookupPath::with_prefix(self.scoped(&[team])));
        if allow_root_path {
            paths.push(SecretLookupPath::with_prefix(self.scoped(&[])));
        }
        paths
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        Ok(self.client.get_latest(path).await?.map(Secret::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(secrets: &CredHubSecrets, team: &str, pipeline: &str, root: bool) -> Vec<String> {
        secrets
            .new_secret_lookup_paths(team, pipeline, root)
            .iter()
            .map(|p| p.variable_to_secret_path("foo").unwrap())
            .collect()
    }

    #[test]
    fn test_lookup_paths() {
        let client = Arc::new(CredHubClient::new(reqwest::Client::new(), "https://credhub", None));
        let secrets = CredHubSecrets::new(client, "/concourse");

        assert_eq!(
            rendered(&secrets, "main", "deploy", true),
            vec![
                "/concourse/main/deploy/foo",
                "/concourse/main/foo",
                "/concourse/foo"
            ]
        );
        assert_eq!(rendered(&secrets, "main", "", false), vec!["/concourse/main/foo"]);
    }
}
