// lib/creds/src/lookup.rs

use crate::error::CredsError;
use crate::template::SecretTemplate;
use std::sync::Arc;

/// Turns a variable name into a backend path for one precedence level.
#[derive(Debug, Clone)]
pub enum SecretLookupPath {
    /// `prefix + name`, for namespace-style backends.
    Prefix(String),
    /// A template rendered with a fixed team and pipeline.
    Template {
        template: Arc<SecretTemplate>,
        team: String,
        pipeline: String,
    },
}

impl SecretLookupPath {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// `None` when the template needs a pipeline but none is in scope.
    pub fn with_template(template: &Arc<SecretTemplate>, team: &str, pipeline: &str) -> Option<Self> {
        if template.references_pipeline() && pipeline.is_empty() {
            return None;
        }
        Some(Self::Template {
            template: Arc::clone(template),
            team: team.to_string(),
            pipeline: pipeline.to_string(),
        })
    }

    pub fn variable_to_secret_path(&self, var: &str) -> Result<String, CredsError> {
        if var.is_empty() {
            return Err(CredsError::configuration("variable name is empty"));
        }
        Ok(match self {
            Self::Prefix(prefix) => format!("{}{}", prefix, var),
            Self::Template {
                template,
                team,
                pipeline,
            } => template.render(team, pipeline, var),
        })
    }
}

/// Joins path fragments with single slashes, keeping a leading slash if the first has one.
pub fn join_path(parts: &[&str]) -> String {
    let absolute = parts.first().is_some_and(|p| p.starts_with('/'));
    let joined = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Builds the usual precedence chain for template-driven backends: each
/// template in order, then the shared prefix, then the root prefix when
/// allowed.
pub fn template_chain(
    templates: &[Arc<SecretTemplate>],
    team: &str,
    pipeline: &str,
    shared_prefix: Option<&str>,
    root_prefix: Option<&str>,
    allow_root_path: bool,
) -> Vec<SecretLookupPath> {
    let mut paths: Vec<SecretLookupPath> = templates
        .iter()
        .filter_map(|t| SecretLookupPath::with_template(t, team, pipeline))
        .collect();

    if let Some(shared) = shared_prefix {
        paths.push(SecretLookupPath::with_prefix(shared));
    }
    if allow_root_path {
        if let Some(root) = root_prefix {
            paths.push(SecretLookupPath::with_prefix(root));
        }
    }
    paths
}
