//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config names one.
pub const DEFAULT_FILTER: &str = "info,pmv_router=debug,pmv_vault=debug";

/// Output layout for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// JSON when `RUST_ENV=production`, pretty otherwise.
    #[default]
    Auto,
    Json,
    Pretty,
}

impl LogFormat {
    /// Collapse `Auto` against the value of `RUST_ENV`.
    #[must_use]
    pub fn resolve(self, rust_env: Option<&str>) -> Self {
        match self {
            Self::Auto if rust_env == Some("production") => Self::Json,
            Self::Auto => Self::Pretty,
            other => other,
        }
    }
}

/// `[logging]` section of a binary's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives. `RUST_LOG` takes precedence when set.
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    DEFAULT_FILTER.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), String> {
        EnvFilter::try_new(&self.filter)
            .map(|_| ())
            .map_err(|e| format!("invalid logging.filter {:?}: {e}", self.filter))
    }
}

/// Install the global subscriber. Logs go to stderr so report output on
/// stdout stays machine-readable.
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> TelemetryResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.filter)
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?,
    };
    let rust_env = std::env::var("RUST_ENV").ok();

    let result = match config.format.resolve(rust_env.as_deref()) {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, DEFAULT_FILTER);
        assert_eq!(config.format, LogFormat::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_auto_format_follows_rust_env() {
        assert_eq!(LogFormat::Auto.resolve(Some("production")), LogFormat::Json);
        assert_eq!(LogFormat::Auto.resolve(Some("dev")), LogFormat::Pretty);
        assert_eq!(LogFormat::Auto.resolve(None), LogFormat::Pretty);
        assert_eq!(LogFormat::Pretty.resolve(Some("production")), LogFormat::Pretty);
        assert_eq!(LogFormat::Json.resolve(None), LogFormat::Json);
    }

    #[test]
    fn test_bad_filter_rejected() {
        let config = LoggingConfig {
            filter: "pmv_router=loud".to_string(),
            ..LoggingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
