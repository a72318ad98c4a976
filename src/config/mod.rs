//! Configuration Management
//!
//! Stream configuration loaded from environment variables.

use crate::binance::BINANCE_WS_URL;
use crate::candles::DEFAULT_HISTORY_LIMIT;
use crate::error::ConfigError;
use crate::stream::policy::{
    ReconnectPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MULTIPLIER,
};
use std::str::FromStr;
use std::time::Duration;

/// Stream configuration
///
/// ## Environment Variables
///
/// - `STREAM_BASE_URL`: WebSocket base URL (default: wss://stream.binance.com:9443/ws)
/// - `RECONNECT_BASE_DELAY_MS`: First reconnect delay (default: 1000)
/// - `RECONNECT_MULTIPLIER`: Backoff multiplier, must be > 1 (default: 2.0)
/// - `RECONNECT_MAX_DELAY_MS`: Delay cap (default: 30000)
/// - `RECONNECT_MAX_ATTEMPTS`: Reconnects before a stream fails (default: 5)
/// - `CANDLE_HISTORY_LIMIT`: Closed candles kept per series (default: 1000)
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// WebSocket base URL, stream names are appended as a path segment
    pub base_url: String,

    pub reconnect: ReconnectPolicy,

    /// Closed candles retained per symbol and interval
    pub candle_history_limit: usize,
}

impl StreamConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if any variable is set to an unparsable or out-of-range value
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url =
            std::env::var("STREAM_BASE_URL").unwrap_or_else(|_| BINANCE_WS_URL.to_string());
        if !(base_url.starts_with("ws://") || base_url.starts_with("wss://")) {
            return Err(ConfigError::invalid(
                "STREAM_BASE_URL",
                base_url,
                "must be a ws:// or wss:// URL",
            ));
        }

        let base_delay: u64 =
            env_or("RECONNECT_BASE_DELAY_MS", DEFAULT_BASE_DELAY.as_millis() as u64)?;
        let multiplier: f64 = env_or("RECONNECT_MULTIPLIER", DEFAULT_MULTIPLIER)?;
        let max_delay: u64 =
            env_or("RECONNECT_MAX_DELAY_MS", DEFAULT_MAX_DELAY.as_millis() as u64)?;
        let max_attempts: u32 = env_or("RECONNECT_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS)?;

        let reconnect = ReconnectPolicy::new(
            Duration::from_millis(base_delay),
            multiplier,
            Duration::from_millis(max_delay),
            max_attempts,
        )?;

        let candle_history_limit: usize = env_or("CANDLE_HISTORY_LIMIT", DEFAULT_HISTORY_LIMIT)?;
        if candle_history_limit == 0 {
            return Err(ConfigError::invalid(
                "CANDLE_HISTORY_LIMIT",
                candle_history_limit,
                "must be >= 1",
            ));
        }

        Ok(Self {
            base_url,
            reconnect,
            candle_history_limit,
        })
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: BINANCE_WS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            candle_history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(name, raw, "not a valid number")),
        Err(_) => Ok(default),
    }
}
