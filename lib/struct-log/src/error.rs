use thiserror::Error;

/// Errors that can occur during logger setup
#[derive(Debug, Error)]
pub enum SetupError {
    /// The log -> tracing bridge was installed by someone else
    #[error("log tracer already initialized")]
    LogTracerAlreadyInitialized,

    #[error("global tracing subscriber already set")]
    SubscriberAlreadySet,

    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },
}
