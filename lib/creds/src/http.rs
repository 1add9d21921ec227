// lib/creds/src/http.rs

use crate::error::CredsError;
use std::path::PathBuf;
use std::time::Duration;
use vault_client::TlsConfig;

/// TLS and timeout settings shared by the HTTP-based backends.
#[derive(Debug, Clone, Default)]
pub(crate) struct HttpSettings {
    pub ca_certs: Vec<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub insecure_skip_verify: bool,
    pub timeout: Option<Duration>,
}

impl HttpSettings {
    pub fn build(&self) -> Result<reqwest::Client, CredsError> {
        let tls = TlsConfig {
            ca_cert_files: self.ca_certs.clone(),
            client_cert_file: self.client_cert.clone(),
            client_key_file: self.client_key.clone(),
            server_name: None,
            insecure_skip_verify: self.insecure_skip_verify,
        };

        let mut builder = tls.apply(reqwest::Client::builder())?;
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map_err(|e| CredsError::configuration(format!("failed to build HTTP client: {}", e)))
    }
}

/// Reads an error response body, mapping the status to an error.
pub(crate) async fn status_error(response: reqwest::Response) -> CredsError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CredsError::from_status(status, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_ca_file_is_configuration_error() {
        let settings = HttpSettings {
            ca_certs: vec![PathBuf::from("/nonexistent/ca.pem")],
            ..HttpSettings::default()
        };
        assert!(matches!(settings.build(), Err(CredsError::Configuration { .. })));
    }

    #[test]
    fn test_cert_without_key_is_rejected() {
        let settings = HttpSettings {
            client_cert: Some(PathBuf::from("/tmp/cert.pem")),
            ..HttpSettings::default()
        };
        assert!(matches!(settings.build(), Err(CredsError::Configuration { .. })));
    }

    #[test]
    fn test_default_client_builds() {
        assert!(HttpSettings::default().build().is_ok());
    }
}
