//! Prometheus metrics for the trade protocol.
//!
//! All metrics follow the naming convention: `tp_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PIPELINE METRICS
    // =========================================================================

    /// Pipelines started, by step name
    pub static ref PIPELINES_STARTED: CounterVec = CounterVec::new(
        Opts::new("tp_pipeline_started_total", "Task pipelines started"),
        &["step"]
    ).expect("metric creation failed");

    /// Pipelines finished, by step name and outcome (success/failure/timeout)
    pub static ref PIPELINES_FINISHED: CounterVec = CounterVec::new(
        Opts::new("tp_pipeline_finished_total", "Task pipelines finished"),
        &["step", "outcome"]
    ).expect("metric creation failed");

    /// Step timer expirations
    pub static ref STEP_TIMEOUTS: Counter = Counter::new(
        "tp_pipeline_timeouts_total",
        "Protocol steps that hit their timeout"
    ).expect("metric creation failed");

    /// Pipeline duration histogram
    pub static ref PIPELINE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "tp_pipeline_duration_seconds",
            "Time spent running a task pipeline"
        ).buckets(exponential_buckets(0.001, 2.0, 16).expect("bucket layout"))
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGE METRICS
    // =========================================================================

    /// Trade messages received, by kind
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("tp_messages_received_total", "Trade messages received"),
        &["kind"]
    ).expect("metric creation failed");

    /// Trade messages dropped before reaching a pipeline, by reason
    pub static ref MESSAGES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("tp_messages_dropped_total", "Trade messages dropped"),
        &["reason"]
    ).expect("metric creation failed");

    /// Acknowledgements sent, by result (ack/nack)
    pub static ref ACKS_SENT: CounterVec = CounterVec::new(
        Opts::new("tp_acks_sent_total", "Acknowledgements sent"),
        &["result"]
    ).expect("metric creation failed");

    /// Mailbox messages resent on startup
    pub static ref MAILBOX_RESENDS: Counter = Counter::new(
        "tp_mailbox_resends_total",
        "Unacknowledged messages resent on startup"
    ).expect("metric creation failed");

    // =========================================================================
    // TRADE METRICS
    // =========================================================================

    /// Trades currently open
    pub static ref OPEN_TRADES: Gauge = Gauge::new(
        "tp_trades_open",
        "Trades currently registered with the trade manager"
    ).expect("metric creation failed");

    /// Trades archived, by disposition (closed/failed)
    pub static ref TRADES_ARCHIVED: CounterVec = CounterVec::new(
        Opts::new("tp_trades_archived_total", "Trades moved to an archive"),
        &["disposition"]
    ).expect("metric creation failed");
}

/// Handle over the registry the trade metrics live in.
#[derive(Clone)]
pub struct MetricsHandle {
    registry: Registry,
}

impl MetricsHandle {
    /// Render all registered metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
    }
}

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Pipelines
        Box::new(PIPELINES_STARTED.clone()),
        Box::new(PIPELINES_FINISHED.clone()),
        Box::new(STEP_TIMEOUTS.clone()),
        Box::new(PIPELINE_DURATION.clone()),
        // Messages
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(MESSAGES_DROPPED.clone()),
        Box::new(ACKS_SENT.clone()),
        Box::new(MAILBOX_RESENDS.clone()),
        // Trades
        Box::new(OPEN_TRADES.clone()),
        Box::new(TRADES_ARCHIVED.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: REGISTRY.clone(),
    })
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
