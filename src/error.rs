use thiserror::Error;

/// Errors surfaced by the stream manager and its configuration
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Invalid channel: {0}")]
    InvalidChannel(String),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Reconnect attempts exhausted for {key} after {attempts} attempts")]
    ReconnectExhausted { key: String, attempts: u32 },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl StreamError {
    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::InvalidChannel(_) => "invalid_channel",
            StreamError::InvalidSymbol(_) => "invalid_symbol",
            StreamError::ReconnectExhausted { .. } => "reconnect_exhausted",
            StreamError::Config(_) => "config_error",
        }
    }
}

/// A raw frame that could not be turned into a [`MarketEvent`](crate::stream::MarketEvent).
///
/// Decode errors never leave the connection loop: they are logged, counted and dropped.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid number in field {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("Unexpected event type: expected {expected}, got {actual}")]
    UnexpectedEvent {
        expected: &'static str,
        actual: String,
    },

    #[error("Control frame without market data")]
    Control,

    #[error("Empty frame")]
    Empty,
}

impl DecodeError {
    pub fn error_type(&self) -> &'static str {
        match self {
            DecodeError::Json(_) => "json",
            DecodeError::InvalidNumber { .. } => "invalid_number",
            DecodeError::UnexpectedEvent { .. } => "unexpected_event",
            DecodeError::Control => "control",
            DecodeError::Empty => "empty",
        }
    }
}

/// Invalid configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?} ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ConfigError {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        ConfigError::InvalidValue {
            name,
            value: value.to_string(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
