use super::{AuthMethod, TokenInfo};
use crate::client::Endpoint;
use crate::VaultError;
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use std::time::Duration;

/// Lease reported when the lookup fails, so the renew loop retries it soon.
const PROVISIONAL_LEASE: Duration = Duration::from_secs(1);

/// Pre-issued token. Authentication looks the token up to learn its TTL.
///
/// The token is usable without the lookup; a failed lookup yields a short
/// provisional lease instead of an error.
pub struct StaticTokenAuth {
    token: String,
}

impl StaticTokenAuth {
    pub fn new(token: String) -> Self {
        Self { token }
    }

    async fn lookup(&self, endpoint: &Endpoint) -> Result<LookupData, VaultError> {
        let request = endpoint.request(Method::GET, "auth/token/lookup-self", Some(&self.token));
        let lookup: LookupResponse = endpoint
            .send(request)
            .await?
            .ok_or_else(|| VaultError::AuthError("token lookup returned nothing".to_string()))?;
        Ok(lookup.data)
    }
}

#[derive(Deserialize)]
struct LookupResponse {
    data: LookupData,
}

#[derive(Deserialize)]
struct LookupData {
    #[serde(default)]
    accessor: Option<String>,
    #[serde(default)]
    ttl: u64,
    #[serde(default)]
    renewable: bool,
}

#[async_trait]
impl AuthMethod for StaticTokenAuth {
    fn name(&self) -> &'static str {
        "token"
    }

    fn static_token(&self) -> Option<&str> {
        Some(self.token.as_str())
    }

    async fn authenticate(&self, endpoint: &Endpoint) -> Result<TokenInfo, VaultError> {
        match self.lookup(endpoint).await {
            Ok(data) => Ok(TokenInfo {
                token: self.token.clone(),
                accessor: data.accessor,
                lease_duration: Duration::from_secs(data.ttl),
                renewable: data.renewable,
            }),
            Err(e) => {
                tracing::warn!(error = %e, "token lookup failed; using a provisional lease");
                Ok(TokenInfo {
                    token: self.token.clone(),
                    accessor: None,
                    lease_duration: PROVISIONAL_LEASE,
                    renewable: true,
                })
            }
        }
    }
}
