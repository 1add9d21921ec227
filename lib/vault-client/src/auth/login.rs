use super::{AuthMethod, TokenInfo};
use crate::client::Endpoint;
use crate::models::RenewResponse;
use crate::VaultError;
use async_trait::async_trait;
use reqwest::Method;
use std::collections::HashMap;

/// Login against `auth/<backend>/login` with the configured parameters
/// (approle, cert, userpass, ...).
pub struct BackendLoginAuth {
    backend: String,
    params: HashMap<String, String>,
}

impl BackendLoginAuth {
    pub fn new(backend: String, params: HashMap<String, String>) -> Self {
        Self { backend, params }
    }
}

pub(super) async fn login(
    endpoint: &Endpoint,
    backend: &str,
    body: &HashMap<String, String>,
) -> Result<TokenInfo, VaultError> {
    let path = format!("auth/{}/login", backend.trim_matches('/'));
    let request = endpoint.request(Method::POST, &path, None).json(body);

    let response: RenewResponse = endpoint
        .send(request)
        .await?
        .ok_or_else(|| VaultError::AuthError(format!("no auth info returned by {}", path)))?;

    Ok(response.auth.into_token_info())
}

#[async_trait]
impl AuthMethod for BackendLoginAuth {
    fn name(&self) -> &'static str {
        "backend"
    }

    async fn authenticate(&self, endpoint: &Endpoint) -> Result<TokenInfo, VaultError> {
        login(endpoint, &self.backend, &self.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApiClient;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_approle_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(body_json(serde_json::json!({"role_id": "r", "secret_id": "s"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "auth": {
                    "client_token": "s.new",
                    "accessor": "acc",
                    "lease_duration": 60,
                    "renewable": true
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::builder().base_url(server.uri()).build().await.unwrap();
        let params = HashMap::from([
            ("role_id".to_string(), "r".to_string()),
            ("secret_id".to_string(), "s".to_string()),
        ]);
        let auth = BackendLoginAuth::new("approle".to_string(), params);

        let info = auth.authenticate(client.endpoint()).await.unwrap();
        assert_eq!(info.token, "s.new");
        assert_eq!(info.lease_duration, Duration::from_secs(60));
        assert!(info.renewable);
    }

    #[tokio::test]
    async fn test_login_failure_is_client_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid role_id"))
            .mount(&server)
            .await;

        let client = ApiClient::builder().base_url(server.uri()).build().await.unwrap();
        let auth = BackendLoginAuth::new("approle".to_string(), HashMap::new());

        let result = auth.authenticate(client.endpoint()).await;
        assert!(matches!(result, Err(VaultError::ClientError { status: 400, .. })));
    }
}
