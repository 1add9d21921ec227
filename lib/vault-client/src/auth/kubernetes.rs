use super::{AuthMethod, TokenInfo, login::login};
use crate::client::Endpoint;
use crate::VaultError;
use async_trait::async_trait;
use std::collections::HashMap;

const DEFAULT_JWT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Kubernetes authentication: exchanges the pod's service account JWT for a token.
///
/// The JWT is re-read on every login so rotated service account tokens are picked up.
pub struct KubernetesAuth {
    pub backend: String,
    pub params: HashMap<String, String>,
    pub jwt_path: String,
}

impl KubernetesAuth {
    pub fn new(backend: String, role: String) -> Self {
        Self {
            backend,
            params: HashMap::from([("role".to_string(), role)]),
            jwt_path: DEFAULT_JWT_PATH.to_string(),
        }
    }

    /// Used for the `kubernetes` backend when no inline `jwt` param is given.
    pub(crate) fn applies_to(backend: &str, params: &HashMap<String, String>) -> bool {
        backend.trim_matches('/') == "kubernetes" && !params.contains_key("jwt")
    }

    pub(crate) fn from_params(backend: &str, params: &HashMap<String, String>) -> Self {
        let mut params = params.clone();
        let jwt_path = params
            .remove("jwt_path")
            .unwrap_or_else(|| DEFAULT_JWT_PATH.to_string());
        Self {
            backend: backend.to_string(),
            params,
            jwt_path,
        }
    }

    pub fn with_jwt_path(mut self, path: String) -> Self {
        self.jwt_path = path;
        self
    }

    fn read_jwt(&self) -> Result<String, VaultError> {
        std::fs::read_to_string(&self.jwt_path)
            .map(|s| s.trim().to_string())
            .map_err(|e| {
                VaultError::AuthError(format!(
                    "Failed to read JWT from {}: {}",
                    self.jwt_path, e
                ))
            })
    }
}

#[async_trait]
impl AuthMethod for KubernetesAuth {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn authenticate(&self, endpoint: &Endpoint) -> Result<TokenInfo, VaultError> {
        let mut body = self.params.clone();
        body.insert("jwt".to_string(), self.read_jwt()?);
        login(endpoint, &self.backend, &body).await
    }
}
