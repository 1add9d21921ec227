// lib/creds/src/vault/secrets.rs

use crate::error::CredsError;
use crate::lookup::{SecretLookupPath, template_chain};
use crate::secrets::{Secret, Secrets};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use vault_client::SecretReader;

/// Lookups against Vault through whatever client is currently published.
pub struct VaultSecrets {
    reader: Arc<dyn SecretReader>,
    templates: Vec<Arc<SecretTemplate>>,
    shared_prefix: Option<String>,
    root_prefix: String,
}

impl VaultSecrets {
    /// `templates` must already include the path prefix.
    pub fn new(
        reader: Arc<dyn SecretReader>,
        prefix: &str,
        templates: Vec<Arc<SecretTemplate>>,
        shared_path: Option<&str>,
    ) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            reader,
            templates,
            shared_prefix: shared_path
                .filter(|p| !p.is_empty())
                .map(|p| format!("{}/{}/", prefix, p.trim_matches('/'))),
            root_prefix: format!("{}/", prefix),
        }
    }
}

#[async_trait]
impl Secrets for VaultSecrets {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        template_chain(
            &self.templates,
            team,
            pipeline,
            self.shared_prefix.as_deref(),
            Some(&self.root_prefix),
            allow_root_path,
        )
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        let Some(secret) = self.reader.read(path).await? else {
            return Ok(None);
        };

        let mut data = secret.data;
        let value = match data.remove("value") {
            Some(value) => value,
            None => serde_json::Value::Object(data),
        };

        let expiration = if secret.lease_duration.is_zero() {
            None
        } else {
            chrono::Duration::from_std(secret.lease_duration / 2)
                .ok()
                .map(|half| Utc::now() + half)
        };

        Ok(Some(Secret { value, expiration }))
    }
}
