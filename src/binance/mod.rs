//! Binance market-data streams
//!
//! Wire frame definitions, the frame decoder and (with the `websocket` feature) the
//! tokio-tungstenite connector.

pub mod decoder;
pub mod types;

#[cfg(feature = "websocket")]
pub mod websocket;

/// Base URL for Binance WebSocket streams
pub const BINANCE_WS_URL: &str = "wss://stream.binance.com:9443/ws";

pub use decoder::{decode_frame, DecodeStats, DecodeStatsSnapshot, MessageDecoder};

#[cfg(feature = "websocket")]
pub use websocket::BinanceConnector;
