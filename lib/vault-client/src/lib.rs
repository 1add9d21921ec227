//! vault-client - HashiCorp Vault access for credential lookups
//!
//! [`ApiClient`] reads KV v1/v2 secrets through whichever token was last
//! published, and [`ReAuther`] keeps that token alive in the background:
//! login with backoff, renewal at half-lease, forced re-login at max TTL.

mod auth;
mod client;
mod config;
mod error;
mod models;

pub use auth::{
    AuthMethod, Auther, BackendLoginAuth, ExponentialBackoff, KubernetesAuth, LoggedIn,
    ReAuther, StaticTokenAuth, TokenInfo,
};
pub use client::{ApiClient, ApiClientBuilder, AuthenticatedClient, Endpoint, SecretReader};
pub use config::{AuthConfig, ReAutherConfig, TlsConfig};
pub use error::VaultError;
pub use models::VaultSecret;
