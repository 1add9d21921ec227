// lib/creds/src/kubernetes/secrets.rs

use crate::error::CredsError;
use crate::http::status_error;
use crate::lookup::SecretLookupPath;
use crate::secrets::{Secret, Secrets};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bearer token for the API server.
#[derive(Debug, Clone)]
pub enum TokenSource {
    None,
    Static(String),
    /// Re-read on every request so projected tokens can rotate.
    File(PathBuf),
}

impl TokenSource {
    async fn token(&self) -> Result<Option<String>, CredsError> {
        match self {
            Self::None => Ok(None),
            Self::Static(token) => Ok(Some(token.clone())),
            Self::File(path) => tokio::fs::read_to_string(path)
                .await
                .map(|t| Some(t.trim().to_string()))
                .map_err(|e| {
                    CredsError::auth(format!("failed to read token {}: {}", path.display(), e))
                }),
        }
    }
}

#[derive(Deserialize)]
struct KubeSecret {
    #[serde(default)]
    data: BTreeMap<String, String>,
}

/// Secrets stored as Kubernetes `Secret` objects, one namespace per team.
pub struct KubernetesSecrets {
    http: reqwest::Client,
    api_url: String,
    token: TokenSource,
    namespace_prefix: String,
}

impl KubernetesSecrets {
    pub fn new(
        http: reqwest::Client,
        api_url: &str,
        token: TokenSource,
        namespace_prefix: &str,
    ) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            namespace_prefix: namespace_prefix.to_string(),
        }
    }

    async fn find_secret(&self, namespace: &str, name: &str) -> Result<Option<KubeSecret>, CredsError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/secrets/{}",
            self.api_url, namespace, name
        );
        let mut request = self.http.get(url);
        if let Some(token) = self.token.token().await? {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            _ => Err(status_error(response).await),
        }
    }
}

fn decode(encoded: &str) -> Result<String, CredsError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| CredsError::backend(format!("invalid base64 in secret data: {}", e)))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl Secrets for KubernetesSecrets {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        _allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        let namespace = format!("{}{}", self.namespace_prefix, team);
        let mut paths = Vec::with_capacity(2);
        if !pipeline.is_empty() {
            paths.push(SecretLookupPath::with_prefix(format!("{}:{}.", namespace, pipeline)));
        }
        paths.push(SecretLookupPath::with_prefix(format!("{}:", namespace)));
        paths
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        let (namespace, name) = match path.split(':').collect::<Vec<_>>().as_slice() {
            [namespace, name] => (*namespace, *name),
            _ => {
                return Err(CredsError::backend(format!(
                    "unable to split kubernetes secret path into [namespace]:[secret]: {}",
                    path
                )));
            }
        };

        let Some(secret) = self.find_secret(namespace, name).await? else {
            return Ok(None);
        };

        if let Some(value) = secret.data.get("value") {
            return Ok(Some(Secret::new(serde_json::Value::String(decode(value)?))));
        }

        let mut fields = serde_json::Map::new();
        for (key, value) in &secret.data {
            fields.insert(key.clone(), serde_json::Value::String(decode(value)?));
        }
        Ok(Some(Secret::new(serde_json::Value::Object(fields))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> KubernetesSecrets {
        KubernetesSecrets::new(
            reqwest::Client::new(),
            "https://k8s:6443/",
            TokenSource::None,
            "concourse-",
        )
    }

    #[test]
    fn test_lookup_paths() {
        let rendered: Vec<String> = secrets()
            .new_secret_lookup_paths("main", "deploy", true)
            .iter()
            .map(|p| p.variable_to_secret_path("foo").unwrap())
            .collect();
        assert_eq!(rendered, vec!["concourse-main:deploy.foo", "concourse-main:foo"]);

        let team_only = secrets().new_secret_lookup_paths("main", "", false);
        assert_eq!(team_only.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_path_is_rejected() {
        let result = secrets().get("no-namespace").await;
        assert!(matches!(result, Err(CredsError::Backend { .. })));
    }

    #[test]
    fn test_decode() {
        assert_eq!(decode("aHVudGVyMg==").unwrap(), "hunter2");
        assert!(decode("not base64!").is_err());
    }
}
