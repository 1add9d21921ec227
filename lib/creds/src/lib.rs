// lib/creds/src/lib.rs
pub mod builder;
pub mod cache;
pub mod conjur;
pub mod credhub;
pub mod dummy;
pub mod duration;
pub mod error;
mod http;
pub mod kubernetes;
pub mod lookup;
pub mod manager;
pub mod noop;
pub mod retry;
pub mod secrets;
pub mod secretsmanager;
pub mod setup;
pub mod template;
pub mod variables;
pub mod vault;

pub use builder::SecretsBuilder;
pub use cache::{CacheConfig, CachedSecrets};
pub use error::{CredsError, TemplateError};
pub use lookup::SecretLookupPath;
pub use manager::{HealthResponse, Manager, ManagerFactory, ManagerRegistry, ManagerState};
pub use noop::NoopSecrets;
pub use retry::{RetryConfig, RetryableSecrets};
pub use secrets::{Secret, Secrets, SecretsFactory, SharedSecretsFactory};
pub use setup::{ActiveCredentials, CredentialManagers};
pub use template::SecretTemplate;
pub use variables::{VariableReference, Variables};
