//! Structured logging setup.
//!
//! Every trade log line carries the same core fields so one trade can be
//! followed across maker, taker and arbitrator logs:
//! - `trade_id`: trade (offer) id
//! - `phase`, `state`: protocol position when the line was written
//! - `msg_kind`, `uid`, `peer`: for message traffic

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Installing twice
/// returns `TelemetryError::LoggingInit`.
pub fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| TelemetryError::Config(e.to_string()))?;

    if !config.console_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
        return Ok(());
    }

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    tracing::info!(
        service = %config.full_service_name(),
        network = %config.network,
        json = config.json_logs,
        "Logging initialized"
    );
    Ok(())
}

/// Log a trade lifecycle event with the standard trade fields.
///
/// ```rust,ignore
/// log_trade_event!(info, trade.id(), trade.phase(), trade.state(), "Deposits published");
/// ```
#[macro_export]
macro_rules! log_trade_event {
    ($level:ident, $trade_id:expr, $phase:expr, $state:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            trade_id = %$trade_id,
            phase = ?$phase,
            state = ?$state,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a protocol message event with the standard message fields.
#[macro_export]
macro_rules! log_message_event {
    ($level:ident, $trade_id:expr, $kind:expr, $uid:expr, $peer:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            trade_id = %$trade_id,
            msg_kind = ?$kind,
            uid = %$uid,
            peer = %$peer,
            $($($field)*,)?
            $msg
        )
    };
}
