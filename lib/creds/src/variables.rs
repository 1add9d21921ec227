// lib/creds/src/variables.rs

use crate::error::CredsError;
use crate::secrets::Secrets;
use std::sync::Arc;

/// `name.field.subfield` as written in a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableReference {
    pub name: String,
    pub fields: Vec<String>,
}

impl VariableReference {
    pub fn parse(reference: &str) -> Result<Self, CredsError> {
        let mut parts = reference.trim().split('.');
        let name = parts.next().unwrap_or_default().to_string();
        let fields: Vec<String> = parts.map(str::to_string).collect();

        if name.is_empty() || fields.iter().any(String::is_empty) {
            return Err(CredsError::configuration(format!(
                "invalid variable reference {:?}",
                reference
            )));
        }
        Ok(Self { name, fields })
    }
}

impl std::fmt::Display for VariableReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)?;
        for field in &self.fields {
            write!(f, ".{}", field)?;
        }
        Ok(())
    }
}

/// Resolves variables for one team/pipeline scope by walking the lookup paths in precedence order.
pub struct Variables {
    secrets: Arc<dyn Secrets>,
    team: String,
    pipeline: String,
    allow_root_path: bool,
}

impl Variables {
    pub fn new(
        secrets: Arc<dyn Secrets>,
        team: impl Into<String>,
        pipeline: impl Into<String>,
        allow_root_path: bool,
    ) -> Self {
        Self {
            secrets,
            team: team.into(),
            pipeline: pipeline.into(),
            allow_root_path,
        }
    }

    pub async fn get(
        &self,
        reference: &VariableReference,
    ) -> Result<Option<serde_json::Value>, CredsError> {
        let paths = self
            .secrets
            .new_secret_lookup_paths(&self.team, &self.pipeline, self.allow_root_path);

        for lookup in paths {
            let path = lookup.variable_to_secret_path(&reference.name)?;
            if let Some(secret) = self.secrets.get(&path).await? {
                tracing::debug!(variable = %reference.name, path = %path, "resolved variable");
                return descend(secret.value, reference).map(Some);
            }
        }
        Ok(None)
    }
}

fn descend(
    mut value: serde_json::Value,
    reference: &VariableReference,
) -> Result<serde_json::Value, CredsError> {
    for field in &reference.fields {
        value = match value {
            serde_json::Value::Object(mut map) => map.remove(field),
            _ => None,
        }
        .ok_or_else(|| CredsError::MissingField {
            name: reference.name.clone(),
            field: field.clone(),
        })?;
    }
    Ok(value)
}
