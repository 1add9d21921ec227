// lib/creds/src/error.rs
use thiserror::Error;
use vault_client::VaultError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template {name} is empty")]
    Empty { name: String },

    #[error("template {name} is malformed: {reason}")]
    Parse { name: String, reason: String },

    #[error("template {name} references unknown placeholder {{{{{placeholder}}}}}")]
    UnknownPlaceholder { name: String, placeholder: String },
}

#[derive(Debug, Error)]
pub enum CredsError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Transient backend error: {message}")]
    Transient { message: String },

    #[error("Backend error: {message}")]
    Backend { message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("Field {field} not found in secret {name}")]
    MissingField { name: String, field: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CredsError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into() }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend { message: message.into() }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth { message: message.into() }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classifies an HTTP failure: transport errors, 5xx and 429 are transient.
    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        if status >= 500 || status == 429 {
            Self::transient(format!("status {}: {}", status, message.into()))
        } else if status == 401 || status == 403 {
            Self::auth(format!("status {}: {}", status, message.into()))
        } else {
            Self::backend(format!("status {}: {}", status, message.into()))
        }
    }
}

impl From<reqwest::Error> for CredsError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::from_status(status.as_u16(), err.to_string()),
            None if err.is_decode() => Self::backend(err.to_string()),
            None => Self::transient(err.to_string()),
        }
    }
}

impl From<VaultError> for CredsError {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::InvalidConfig(message) => Self::configuration(message),
            VaultError::ClientError { status, message } => Self::from_status(status, message),
            VaultError::AuthError(message) => Self::auth(message),
            VaultError::Json(e) => Self::Serialization(e),
            other if other.is_transient() => Self::transient(other.to_string()),
            other => Self::backend(other.to_string()),
        }
    }
}
