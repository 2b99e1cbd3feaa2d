//! # Trade Telemetry
//!
//! Logging and metrics for the escrow trade protocol.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trade_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _metrics = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `TP_JSON_LOGS` | `false` | JSON formatted log lines |
//! | `TP_NODE_LABEL` | `node` | Node label appended to the service name |
//! | `TP_METRICS_ENABLED` | `true` | Register Prometheus metrics |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    register_metrics, MetricsHandle, ACKS_SENT, MAILBOX_RESENDS, MESSAGES_DROPPED,
    MESSAGES_RECEIVED, OPEN_TRADES, PIPELINES_FINISHED, PIPELINES_STARTED, PIPELINE_DURATION,
    STEP_TIMEOUTS, TRADES_ARCHIVED,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and, when enabled, metrics.
///
/// Returns the metrics handle if metrics were registered.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<Option<MetricsHandle>, TelemetryError> {
    let handle = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };
    init_logging(config)?;
    Ok(handle)
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
