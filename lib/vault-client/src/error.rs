use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Invalid Vault configuration: {0}")]
    InvalidConfig(String),

    #[error("Vault client error ({status}): {message}")]
    ClientError { status: u16, message: String },

    #[error("Vault request error: {0}")]
    RequestError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Token lease is not renewable")]
    NotRenewable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Transport failures, 5xx and rate limiting are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestError(_) => true,
            Self::ClientError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        Self::RequestError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(VaultError::RequestError("connection refused".into()).is_transient());
        assert!(VaultError::ClientError { status: 503, message: String::new() }.is_transient());
        assert!(VaultError::ClientError { status: 429, message: String::new() }.is_transient());
        assert!(!VaultError::ClientError { status: 403, message: String::new() }.is_transient());
        assert!(!VaultError::NotRenewable.is_transient());
    }
}
