use crate::VaultError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// TLS material used for every connection to Vault.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM bundles of CA certificates trusted in addition to the system roots.
    pub ca_cert_files: Vec<PathBuf>,
    /// Client certificate presented for mutual TLS (e.g. the `cert` auth backend).
    pub client_cert_file: Option<PathBuf>,
    pub client_key_file: Option<PathBuf>,
    /// Name used for SNI and certificate verification instead of the URL host.
    pub server_name: Option<String>,
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Adds the CA roots, client identity and verification mode to `builder`.
    ///
    /// `server_name` is not applied here; it needs the resolved address.
    pub fn apply(
        &self,
        mut builder: reqwest::ClientBuilder,
    ) -> Result<reqwest::ClientBuilder, VaultError> {
        for path in &self.ca_cert_files {
            let cert = reqwest::Certificate::from_pem(&read_pem(path)?).map_err(|e| {
                VaultError::InvalidConfig(format!("invalid CA certificate {}: {}", path.display(), e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        match (&self.client_cert_file, &self.client_key_file) {
            (Some(cert), Some(key)) => {
                let mut pem = read_pem(cert)?;
                pem.push(b'\n');
                pem.extend(read_pem(key)?);
                let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                    VaultError::InvalidConfig(format!("invalid client certificate: {}", e))
                })?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(VaultError::InvalidConfig(
                    "client certificate and key must be configured together".to_string(),
                ));
            }
        }

        Ok(builder.danger_accept_invalid_certs(self.insecure_skip_verify))
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, VaultError> {
    std::fs::read(path).map_err(|e| {
        VaultError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
    })
}

/// How the client obtains a token.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Pre-issued token; no login round-trip is made.
    pub client_token: Option<String>,
    /// Auth backend mount used for `auth/<backend>/login`.
    pub backend: Option<String>,
    /// Login payload for the backend (role_id, secret_id, role, jwt, ...).
    pub params: HashMap<String, String>,
}

impl AuthConfig {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            client_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn with_backend(backend: impl Into<String>, params: HashMap<String, String>) -> Self {
        Self {
            client_token: None,
            backend: Some(backend.into()),
            params,
        }
    }
}

/// Tunables of the background re-authentication loop.
#[derive(Debug, Clone)]
pub struct ReAutherConfig {
    /// Forces a fresh login once a token is this old. Zero disables the limit.
    pub max_ttl: Duration,
    pub retry_initial: Duration,
    pub retry_max: Duration,
    /// After this much time of consecutive failures the delay stops growing.
    pub retry_max_elapsed: Duration,
}

impl Default for ReAutherConfig {
    fn default() -> Self {
        Self {
            max_ttl: Duration::ZERO,
            retry_initial: Duration::from_secs(1),
            retry_max: Duration::from_secs(300),
            retry_max_elapsed: Duration::from_secs(15 * 60),
        }
    }
}
