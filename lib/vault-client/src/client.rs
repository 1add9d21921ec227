use crate::auth::{AuthMethod, Auther, TokenInfo, auth_method_from_config};
use crate::config::{AuthConfig, TlsConfig};
use crate::error::VaultError;
use crate::models::{MountInfo, RawSecret, RenewResponse, VaultSecret};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use url::Url;

const NAMESPACE_HEADER: &str = "X-Vault-Namespace";
const TOKEN_HEADER: &str = "X-Vault-Token";

/// Reads a secret by its full logical path (mount included).
#[async_trait]
pub trait SecretReader: Send + Sync {
    /// `Ok(None)` when nothing lives at `path`.
    async fn read(&self, path: &str) -> Result<Option<VaultSecret>, VaultError>;
}

/// Base URL, namespace and TLS-configured HTTP client shared by every request.
#[derive(Clone)]
pub struct Endpoint {
    http: reqwest::Client,
    base_url: String,
    namespace: Option<String>,
}

impl Endpoint {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let url = format!("{}/v1/{}", self.base_url, path.trim_start_matches('/'));
        let mut request = self.http.request(method, url);
        if let Some(namespace) = &self.namespace {
            request = request.header(NAMESPACE_HEADER, namespace);
        }
        if let Some(token) = token {
            request = request.header(TOKEN_HEADER, token);
        }
        request
    }

    /// Sends the request and decodes the body. 404 maps to `Ok(None)`.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<T>, VaultError> {
        let response = request.send().await.map_err(VaultError::from_reqwest)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(VaultError::ClientError { status, message });
        }

        let body = response.text().await.map_err(VaultError::from_reqwest)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&body)?))
    }
}

/// A token bound to an endpoint. Instances are immutable once published.
pub struct AuthenticatedClient {
    endpoint: Endpoint,
    token: Option<String>,
}

impl AuthenticatedClient {
    fn new(endpoint: Endpoint, token: Option<String>) -> Self {
        Self { endpoint, token }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, VaultError> {
        let request = self.endpoint.request(Method::GET, path, self.token());
        self.endpoint.send(request).await
    }

    async fn mount_info(&self, path: &str) -> Result<Option<MountInfo>, VaultError> {
        #[derive(serde::Deserialize)]
        struct MountResponse {
            data: MountInfo,
        }

        let response: Option<MountResponse> =
            self.get(&format!("sys/internal/ui/mounts/{}", path)).await?;
        Ok(response.map(|r| r.data))
    }

    async fn read(&self, path: &str) -> Result<Option<VaultSecret>, VaultError> {
        let path = path.trim_start_matches('/');

        match self.mount_info(path).await? {
            Some(mount) if mount.is_kv_v2() => {
                let relative = path.strip_prefix(mount.path.as_str()).unwrap_or(path);
                let data_path = format!("{}data/{}", mount.path, relative);
                let raw: Option<RawSecret> = self.get(&data_path).await?;
                Ok(raw.and_then(RawSecret::into_kv2))
            }
            _ => {
                let raw: Option<RawSecret> = self.get(path).await?;
                Ok(raw.and_then(RawSecret::into_kv1))
            }
        }
    }

    async fn renew_self(&self) -> Result<RenewResponse, VaultError> {
        let request = self
            .endpoint
            .request(Method::POST, "auth/token/renew-self", self.token())
            .json(&serde_json::json!({}));
        self.endpoint
            .send(request)
            .await?
            .ok_or_else(|| VaultError::AuthError("empty renewal response".to_string()))
    }
}

pub struct ApiClientBuilder {
    base_url: Option<String>,
    tls: TlsConfig,
    auth: AuthConfig,
    namespace: Option<String>,
    query_timeout: Option<Duration>,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            base_url: None,
            tls: TlsConfig::default(),
            auth: AuthConfig::default(),
            namespace: None,
            query_timeout: None,
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.namespace = (!namespace.is_empty()).then_some(namespace);
        self
    }

    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub async fn build(self) -> Result<ApiClient, VaultError> {
        let raw_url = self
            .base_url
            .ok_or_else(|| VaultError::InvalidConfig("Vault URL is required".to_string()))?;
        let mut url = Url::parse(&raw_url)
            .map_err(|e| VaultError::InvalidConfig(format!("invalid URL {}: {}", raw_url, e)))?;

        let resolve = match &self.tls.server_name {
            Some(server_name) => Some(override_server_name(&mut url, server_name).await?),
            None => None,
        };

        let http = build_http(&self.tls, self.query_timeout, resolve.as_ref())?;
        let endpoint = Endpoint {
            http,
            base_url: url.as_str().trim_end_matches('/').to_string(),
            namespace: self.namespace,
        };

        let auth_method = auth_method_from_config(&self.auth);
        let unauthenticated = AuthenticatedClient::new(endpoint.clone(), None);

        Ok(ApiClient {
            endpoint,
            tls: self.tls,
            query_timeout: self.query_timeout,
            resolve,
            auth_method,
            current: ArcSwap::from_pointee(unauthenticated),
            renewable: AtomicBool::new(true),
        })
    }
}

/// Vault API access with a lock-free cell holding the current client.
///
/// The cell has a single writer: [`Auther::login`] / [`Auther::renew`], which
/// are only ever driven by one `ReAuther` task. Any number of tasks may read
/// through [`SecretReader::read`] concurrently; they observe the most recently
/// completed publish.
pub struct ApiClient {
    endpoint: Endpoint,
    tls: TlsConfig,
    query_timeout: Option<Duration>,
    resolve: Option<(String, SocketAddr)>,
    auth_method: Option<Arc<dyn AuthMethod>>,
    current: ArcSwap<AuthenticatedClient>,
    renewable: AtomicBool,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current client. Before the first login this carries no token.
    pub fn client(&self) -> Arc<AuthenticatedClient> {
        self.current.load_full()
    }

    fn set_client(&self, token: String) {
        self.current
            .store(Arc::new(AuthenticatedClient::new(self.endpoint.clone(), Some(token))));
    }

    /// False once the server has reported the lease cannot be renewed.
    pub fn is_renewable(&self) -> bool {
        self.renewable.load(Ordering::Acquire)
    }

    fn mark_non_renewable(&self) {
        if self.renewable.swap(false, Ordering::AcqRel) {
            tracing::info!("Vault token is not renewable; falling back to re-login on expiry");
        }
    }

    /// Probes `sys/health` with a throwaway unauthenticated client.
    pub async fn health(&self) -> Result<serde_json::Value, VaultError> {
        let http = build_http(&self.tls, self.query_timeout, self.resolve.as_ref())?;
        let response = http
            .get(format!("{}/v1/sys/health", self.endpoint.base_url))
            .query(&[("standbyok", "true"), ("perfstandbyok", "true")])
            .send()
            .await
            .map_err(VaultError::from_reqwest)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(VaultError::from_reqwest)?;
        serde_json::from_str(&body).map_err(|_| VaultError::ClientError {
            status,
            message: body,
        })
    }

    fn apply_token_info(&self, info: &TokenInfo) {
        if !info.renewable {
            self.mark_non_renewable();
        }
    }
}

#[async_trait]
impl SecretReader for ApiClient {
    async fn read(&self, path: &str) -> Result<Option<VaultSecret>, VaultError> {
        self.client().read(path).await
    }
}

#[async_trait]
impl Auther for ApiClient {
    async fn login(&self) -> Result<Duration, VaultError> {
        let auth_method = self
            .auth_method
            .as_ref()
            .ok_or_else(|| VaultError::InvalidConfig("no Vault auth method configured".to_string()))?;

        if let Some(token) = auth_method.static_token() {
            if self.client().token() != Some(token) {
                self.set_client(token.to_string());
            }
        }

        let info = auth_method.authenticate(&self.endpoint).await?;
        tracing::info!(
            method = auth_method.name(),
            accessor = info.accessor.as_deref().unwrap_or(""),
            lease_duration = info.lease_duration.as_secs(),
            renewable = info.renewable,
            "Vault login succeeded"
        );

        self.apply_token_info(&info);
        self.set_client(info.token);
        Ok(info.lease_duration)
    }

    async fn renew(&self) -> Result<Duration, VaultError> {
        if !self.is_renewable() {
            return Err(VaultError::NotRenewable);
        }

        let client = self.client();
        let response = match client.renew_self().await {
            Ok(response) => response,
            Err(VaultError::ClientError { status, message })
                if status == 400 && message.contains("not renewable") =>
            {
                self.mark_non_renewable();
                return Err(VaultError::NotRenewable);
            }
            Err(e) => return Err(e),
        };

        let info = response.auth.into_token_info();
        self.apply_token_info(&info);
        if client.token() != Some(info.token.as_str()) {
            self.set_client(info.token.clone());
        }

        tracing::debug!(lease_duration = info.lease_duration.as_secs(), "Vault token renewed");
        Ok(info.lease_duration)
    }
}

fn build_http(
    tls: &TlsConfig,
    timeout: Option<Duration>,
    resolve: Option<&(String, SocketAddr)>,
) -> Result<reqwest::Client, VaultError> {
    let mut builder = tls.apply(reqwest::Client::builder())?;
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if let Some((host, addr)) = resolve {
        builder = builder.resolve(host, *addr);
    }

    builder
        .build()
        .map_err(|e| VaultError::InvalidConfig(format!("failed to build HTTP client: {}", e)))
}

/// Points `url` at `server_name` while pinning the connection to the original host's address.
async fn override_server_name(
    url: &mut Url,
    server_name: &str,
) -> Result<(String, SocketAddr), VaultError> {
    let host = url
        .host_str()
        .ok_or_else(|| VaultError::InvalidConfig(format!("URL {} has no host", url)))?
        .to_string();
    let port = url
        .port_or_known_default()
        .ok_or_else(|| VaultError::InvalidConfig(format!("URL {} has no port", url)))?;

    let addr = tokio::net::lookup_host((host.as_str(), port))
        .await?
        .next()
        .ok_or_else(|| VaultError::InvalidConfig(format!("could not resolve {}", host)))?;

    url.set_host(Some(server_name))
        .map_err(|e| VaultError::InvalidConfig(format!("invalid server name {}: {}", server_name, e)))?;

    Ok((server_name.to_string(), addr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_builder_requires_url() {
        let result = ApiClient::builder().build().await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_builder_rejects_invalid_url() {
        let result = ApiClient::builder().base_url("not a url").build().await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_initial_client_is_unauthenticated() {
        let client = ApiClient::builder()
            .base_url("http://vault:8200/")
            .build()
            .await
            .unwrap();

        assert_eq!(client.base_url(), "http://vault:8200");
        assert!(client.client().token().is_none());
        assert!(client.is_renewable());
    }

    #[tokio::test]
    async fn test_login_without_auth_method_fails() {
        let client = ApiClient::builder()
            .base_url("http://vault:8200")
            .build()
            .await
            .unwrap();

        let result = client.login().await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_client_cert_without_key_is_rejected() {
        let tls = TlsConfig {
            client_cert_file: Some("/tmp/cert.pem".into()),
            ..TlsConfig::default()
        };
        let result = ApiClient::builder()
            .base_url("https://vault:8200")
            .tls(tls)
            .build()
            .await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_missing_ca_file_is_invalid_config() {
        let tls = TlsConfig {
            ca_cert_files: vec!["/nonexistent/ca.pem".into()],
            ..TlsConfig::default()
        };
        let result = ApiClient::builder()
            .base_url("https://vault:8200")
            .tls(tls)
            .build()
            .await;
        assert!(matches!(result, Err(VaultError::InvalidConfig(msg)) if msg.contains("/nonexistent/ca.pem")));
    }

    #[tokio::test]
    async fn test_empty_namespace_is_ignored() {
        let client = ApiClient::builder()
            .base_url("http://vault:8200")
            .namespace("")
            .build()
            .await
            .unwrap();
        assert!(client.endpoint.namespace.is_none());
    }
}
