// lib/creds/src/secretsmanager/secrets.rs

use super::api::{SecretValue, SecretsManagerApi};
use crate::error::CredsError;
use crate::lookup::{SecretLookupPath, template_chain};
use crate::secrets::{Secret, Secrets};
use crate::template::SecretTemplate;
use async_trait::async_trait;
use std::sync::Arc;

pub struct AwsSecretsManager {
    api: Arc<dyn SecretsManagerApi>,
    templates: Vec<Arc<SecretTemplate>>,
    shared_prefix: Option<String>,
}

impl AwsSecretsManager {
    pub fn new(
        api: Arc<dyn SecretsManagerApi>,
        templates: Vec<Arc<SecretTemplate>>,
        shared_path: Option<&str>,
    ) -> Self {
        Self {
            api,
            templates,
            shared_prefix: shared_path
                .filter(|p| !p.is_empty())
                .map(|p| format!("{}/", p.trim_end_matches('/'))),
        }
    }
}

/// JSON objects become maps; anything else is returned as text.
fn decode(value: SecretValue) -> serde_json::Value {
    match value {
        SecretValue::String(text) => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(object @ serde_json::Value::Object(_)) => object,
            _ => serde_json::Value::String(text),
        },
        SecretValue::Binary(bytes) => {
            serde_json::Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

#[async_trait]
impl Secrets for AwsSecretsManager {
    fn new_secret_lookup_paths(
        &self,
        team: &str,
        pipeline: &str,
        _allow_root_path: bool,
    ) -> Vec<SecretLookupPath> {
        template_chain(
            &self.templates,
            team,
            pipeline,
            self.shared_prefix.as_deref(),
            None,
            false,
        )
    }

    async fn get(&self, path: &str) -> Result<Option<Secret>, CredsError> {
        Ok(self
            .api
            .get_secret_value(path)
            .await?
            .map(|value| Secret::new(decode(value))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockApi {
        values: HashMap<String, SecretValue>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SecretsManagerApi for MockApi {
        async fn get_secret_value(&self, secret_id: &str) -> Result<Option<SecretValue>, CredsError> {
            self.calls.lock().unwrap().push(secret_id.to_string());
            if secret_id.contains("throttled") {
                return Err(CredsError::transient("ThrottlingException"));
            }
            Ok(self.values.get(secret_id).cloned())
        }
    }

    fn templates() -> Vec<Arc<SecretTemplate>> {
        vec![
            Arc::new(SecretTemplate::build("pipeline", "/concourse/{{.Team}}/{{.Pipeline}}/{{.Secret}}").unwrap()),
            Arc::new(SecretTemplate::build("team", "/concourse/{{.Team}}/{{.Secret}}").unwrap()),
        ]
    }

    #[test]
    fn test_decode() {
        assert_eq!(
            decode(SecretValue::String(r#"{"user":"u","pass":"p"}"#.to_string())),
            json!({"user": "u", "pass": "p"})
        );
        assert_eq!(decode(SecretValue::String("[1,2]".to_string())), json!("[1,2]"));
        assert_eq!(decode(SecretValue::String("plain".to_string())), json!("plain"));
        assert_eq!(decode(SecretValue::Binary(b"bytes".to_vec())), json!("bytes"));
    }

    #[test]
    fn test_lookup_paths_with_shared() {
        let secrets = AwsSecretsManager::new(Arc::new(MockApi::default()), templates(), Some("/concourse/shared"));
        let rendered: Vec<String> = secrets
            .new_secret_lookup_paths("main", "deploy", true)
            .iter()
            .map(|p| p.variable_to_secret_path("foo").unwrap())
            .collect();
        assert_eq!(
            rendered,
            vec![
                "/concourse/main/deploy/foo",
                "/concourse/main/foo",
                "/concourse/shared/foo"
            ]
        );
    }

    #[tokio::test]
    async fn test_team_secret_found_after_pipeline_miss() {
        let mut api = MockApi::default();
        api.values.insert(
            "/concourse/main/foo".to_string(),
            SecretValue::String("bar".to_string()),
        );
        let api = Arc::new(api);
        let secrets: Arc<dyn Secrets> = Arc::new(AwsSecretsManager::new(api.clone(), templates(), None));

        let vars = crate::variables::Variables::new(secrets, "main", "deploy", false);
        let value = vars
            .get(&crate::variables::VariableReference::parse("foo").unwrap())
            .await
            .unwrap();

        assert_eq!(value, Some(json!("bar")));
        assert_eq!(
            *api.calls.lock().unwrap(),
            vec!["/concourse/main/deploy/foo", "/concourse/main/foo"]
        );
    }

    #[tokio::test]
    async fn test_errors_propagate() {
        let secrets = AwsSecretsManager::new(Arc::new(MockApi::default()), templates(), None);
        assert!(secrets.get("/concourse/main/throttled").await.unwrap_err().is_retryable());
    }
}
