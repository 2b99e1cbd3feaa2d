//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Node role label (maker, taker, arbitrator, or a free-form node name)
    pub node_label: String,

    /// Log level filter (trace, debug, info, warn, error or a full directive)
    pub log_level: String,

    /// Whether to enable console output
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Whether to register Prometheus metrics
    pub metrics_enabled: bool,

    /// Network identifier (mainnet, stagenet, testnet)
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "escrow-trade".to_string(),
            node_label: "node".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            metrics_enabled: true,
            network: "stagenet".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TP_SERVICE_NAME`: Service name (default: escrow-trade)
    /// - `TP_NODE_LABEL`: Node label (default: node)
    /// - `TP_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `TP_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `TP_JSON_LOGS`: Enable JSON logs (default: false, true in containers)
    /// - `TP_METRICS_ENABLED`: Register Prometheus metrics (default: true)
    /// - `TP_NETWORK`: Network name (default: stagenet)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("TP_SERVICE_NAME")
                .unwrap_or_else(|_| "escrow-trade".to_string()),

            node_label: env::var("TP_NODE_LABEL").unwrap_or_else(|_| "node".to_string()),

            log_level: env::var("TP_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("TP_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("TP_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            metrics_enabled: env::var("TP_METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            network: env::var("TP_NETWORK").unwrap_or_else(|_| "stagenet".to_string()),
        }
    }

    /// Configuration for one named node of a multi-node process.
    pub fn for_node(node_label: &str) -> Self {
        let mut config = Self::from_env();
        config.node_label = node_label.to_string();
        config
    }

    /// Get the full service name including the node label.
    pub fn full_service_name(&self) -> String {
        if self.node_label == "node" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.node_label)
        }
    }
}
