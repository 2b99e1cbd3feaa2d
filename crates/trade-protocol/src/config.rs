//! Protocol configuration from environment variables.

use std::env;
use std::time::Duration;

use shared_types::amounts::parse_xmr;

/// Tunables of the trade protocol engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolConfig {
    /// Timeout of a timed protocol step
    pub step_timeout: Duration,

    /// How long a deferred message waits for the contract to be built
    pub contract_await_timeout: Duration,

    /// Accepted relative deviation of a requested price from the offer price
    pub price_tolerance: f64,

    /// Confirmations after which a deposit or payout output is unlocked
    pub unlock_confirmations: u64,

    /// Resend unacknowledged mailbox messages when a node starts
    pub resend_on_startup: bool,

    /// Address receiving maker and taker trade fees
    pub fee_address: String,

    /// Trade fee charged to the maker (atomic units)
    pub maker_fee: u64,

    /// Trade fee charged to the taker (atomic units)
    pub taker_fee: u64,
}

impl ProtocolConfig {
    /// Default step timeout (60 seconds).
    pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default maker fee: 0.0015 XMR.
    pub const DEFAULT_MAKER_FEE: u64 = 1_500_000_000;

    /// Default taker fee: 0.0004 XMR.
    pub const DEFAULT_TAKER_FEE: u64 = 400_000_000;

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `TP_STEP_TIMEOUT_SECS`: Step timeout (default: 60)
    /// - `TP_CONTRACT_AWAIT_SECS`: Contract await timeout (default: 60)
    /// - `TP_PRICE_TOLERANCE`: Price tolerance ratio (default: 0.01)
    /// - `TP_UNLOCK_CONFIRMATIONS`: Unlock confirmations (default: 10)
    /// - `TP_RESEND_ON_STARTUP`: Resend unacked mailbox messages (default: true)
    /// - `TP_FEE_ADDRESS`: Trade fee address
    /// - `TP_MAKER_FEE` / `TP_TAKER_FEE`: Trade fees in XMR ("0.0004")
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            step_timeout: env_secs("TP_STEP_TIMEOUT_SECS").unwrap_or(defaults.step_timeout),
            contract_await_timeout: env_secs("TP_CONTRACT_AWAIT_SECS")
                .unwrap_or(defaults.contract_await_timeout),
            price_tolerance: env::var("TP_PRICE_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.price_tolerance),
            unlock_confirmations: env::var("TP_UNLOCK_CONFIRMATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.unlock_confirmations),
            resend_on_startup: env::var("TP_RESEND_ON_STARTUP")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(defaults.resend_on_startup),
            fee_address: env::var("TP_FEE_ADDRESS").unwrap_or(defaults.fee_address),
            maker_fee: env_xmr("TP_MAKER_FEE").unwrap_or(defaults.maker_fee),
            taker_fee: env_xmr("TP_TAKER_FEE").unwrap_or(defaults.taker_fee),
        }
    }

    /// Builder-style override of the step timeout.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            step_timeout: Self::DEFAULT_STEP_TIMEOUT,
            contract_await_timeout: Self::DEFAULT_STEP_TIMEOUT,
            price_tolerance: 0.01,
            unlock_confirmations: 10,
            resend_on_startup: true,
            fee_address: "trade-fee-address".to_string(),
            maker_fee: Self::DEFAULT_MAKER_FEE,
            taker_fee: Self::DEFAULT_TAKER_FEE,
        }
    }
}

fn env_secs(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn env_xmr(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|v| parse_xmr(&v).ok())
}
