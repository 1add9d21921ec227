use std::env;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::error::SetupError;
use crate::formatting_layer::JsonLogLayer;
use crate::storage::StorageLayer;

const DEFAULT_FILTER: &str = "info";

/// Builder for the process-wide tracing subscriber
pub struct StructLogBuilder {
    application: String,
    version: String,
    hostname: Option<String>,
    json_enabled: bool,
    filter: Option<String>,
}

impl StructLogBuilder {
    pub fn new(application: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            version: version.into(),
            hostname: None,
            json_enabled: true,
            filter: None,
        }
    }

    /// Defaults to the system hostname
    pub fn hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn json_enabled(mut self, enabled: bool) -> Self {
        self.json_enabled = enabled;
        self
    }

    /// `JSON_LOG=true` switches to JSON output
    pub fn json_from_env(mut self) -> Self {
        self.json_enabled = env::var("JSON_LOG").is_ok_and(|s| s.parse().unwrap_or_default());
        self
    }

    /// Filter directive used when `RUST_LOG` is unset
    pub fn default_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    fn env_filter(&self) -> Result<EnvFilter, SetupError> {
        if env::var(EnvFilter::DEFAULT_ENV).is_ok() {
            return Ok(EnvFilter::from_default_env());
        }
        let directive = self.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directive).map_err(|e| SetupError::InvalidFilter {
            directive: directive.to_string(),
            reason: e.to_string(),
        })
    }

    /// Installs the global subscriber. Keep the returned guard alive for
    /// the lifetime of the process so buffered JSON lines get flushed.
    pub fn init(self) -> Result<Option<WorkerGuard>, SetupError> {
        let filter = self.env_filter()?;

        if !self.json_enabled {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .try_init()
                .map_err(|_| SetupError::SubscriberAlreadySet)?;
            return Ok(None);
        }

        LogTracer::init().map_err(|_| SetupError::LogTracerAlreadyInitialized)?;

        let (non_blocking, guard) = tracing_appender::non_blocking(io::stderr());

        let layer = match self.hostname {
            Some(hostname) => {
                JsonLogLayer::with_hostname(self.application, self.version, hostname, non_blocking)
            }
            None => JsonLogLayer::new(self.application, self.version, non_blocking),
        };

        let subscriber = Registry::default()
            .with(filter)
            .with(StorageLayer)
            .with(layer);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|_| SetupError::SubscriberAlreadySet)?;

        Ok(Some(guard))
    }
}
