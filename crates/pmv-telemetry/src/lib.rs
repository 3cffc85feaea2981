//! Prometheus metrics and structured logging for the vault router.
//!
//! - Prometheus counters and gauges for venue fills, spread income,
//!   rebalances and rejected re-entry
//! - Structured logging with tracing (JSON in production)

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, LoggingConfig, DEFAULT_FILTER};
pub use metrics::Metrics;
