// Library exports for market-stream

pub mod error;

pub mod binance; // Binance wire frames, decoder and connector
pub mod candles; // Kline aggregation
pub mod config; // Configuration management
pub mod indicators; // Technical indicators over closed candles
pub mod stream; // Connection manager and reconnect state machine

pub use error::{ConfigError, DecodeError, StreamError};
