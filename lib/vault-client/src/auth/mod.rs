mod backoff;
mod kubernetes;
mod login;
mod reauther;
mod token;

pub use backoff::ExponentialBackoff;
pub use kubernetes::KubernetesAuth;
pub use login::BackendLoginAuth;
pub use reauther::{LoggedIn, ReAuther};
pub use token::StaticTokenAuth;

use crate::client::Endpoint;
use crate::config::AuthConfig;
use crate::VaultError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Token returned by a successful authentication.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub token: String,
    pub accessor: Option<String>,
    /// Zero means the token never expires.
    pub lease_duration: Duration,
    pub renewable: bool,
}

/// One way of obtaining a token from Vault.
#[async_trait]
pub trait AuthMethod: Send + Sync {
    fn name(&self) -> &'static str;

    /// Token usable before `authenticate` has talked to the server.
    fn static_token(&self) -> Option<&str> {
        None
    }

    async fn authenticate(&self, endpoint: &Endpoint) -> Result<TokenInfo, VaultError>;
}

/// Something whose credentials the [`ReAuther`] keeps alive.
///
/// Both calls return the lease of the resulting token; `Duration::ZERO`
/// means the token does not expire.
#[async_trait]
pub trait Auther: Send + Sync {
    async fn login(&self) -> Result<Duration, VaultError>;

    async fn renew(&self) -> Result<Duration, VaultError>;
}

pub(crate) fn auth_method_from_config(config: &AuthConfig) -> Option<Arc<dyn AuthMethod>> {
    if let Some(token) = config.client_token.as_ref().filter(|t| !t.is_empty()) {
        return Some(Arc::new(StaticTokenAuth::new(token.clone())));
    }

    let backend = config.backend.as_ref().filter(|b| !b.is_empty())?;
    if KubernetesAuth::applies_to(backend, &config.params) {
        return Some(Arc::new(KubernetesAuth::from_params(backend, &config.params)));
    }
    Some(Arc::new(BackendLoginAuth::new(backend.clone(), config.params.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_token_wins_over_backend() {
        let mut config = AuthConfig::with_backend("approle", HashMap::new());
        config.client_token = Some("s.token".to_string());
        let method = auth_method_from_config(&config).unwrap();
        assert_eq!(method.name(), "token");
    }

    #[test]
    fn test_kubernetes_backend_without_jwt_reads_file() {
        let params = HashMap::from([("role".to_string(), "concourse".to_string())]);
        let method = auth_method_from_config(&AuthConfig::with_backend("kubernetes", params)).unwrap();
        assert_eq!(method.name(), "kubernetes");
    }

    #[test]
    fn test_generic_backend_login() {
        let params = HashMap::from([
            ("role_id".to_string(), "r".to_string()),
            ("secret_id".to_string(), "s".to_string()),
        ]);
        let method = auth_method_from_config(&AuthConfig::with_backend("approle", params)).unwrap();
        assert_eq!(method.name(), "backend");
    }

    #[test]
    fn test_no_auth_configured() {
        assert!(auth_method_from_config(&AuthConfig::default()).is_none());
    }
}
