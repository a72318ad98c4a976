//! Typed market events produced by the decoder

use crate::stream::channel::KlineInterval;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 24h rolling ticker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEvent {
    pub symbol: String,
    /// Last price
    pub price: f64,
    /// Absolute price change over 24h
    pub change: f64,
    /// Price change over 24h in percent
    pub change_percent: f64,
    pub high_24h: f64,
    pub low_24h: f64,
    /// Base asset volume
    pub volume: f64,
    /// Quote asset volume
    pub quote_volume: f64,
    /// Event time (milliseconds since Unix epoch)
    pub timestamp: i64,
}

/// Single public trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub symbol: String,
    pub trade_id: i64,
    pub price: f64,
    pub quantity: f64,
    /// Buyer was the maker, so the aggressor sold
    pub is_maker_sell: bool,
    /// Trade time (milliseconds since Unix epoch)
    pub timestamp: i64,
}

/// Kline update; `is_closed` marks the final update of the interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KlineEvent {
    pub symbol: String,
    pub interval: KlineInterval,
    /// Interval open time (milliseconds since Unix epoch)
    pub interval_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub is_closed: bool,
}

/// Price level `(price, quantity)`
pub type Level = (Decimal, Decimal);

/// Order book depth update or partial snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthEvent {
    pub symbol: String,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    pub last_update_id: i64,
    /// Event time, or local receive time for partial-book frames that carry none
    pub timestamp: i64,
}

/// Every event a stream can deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketEvent {
    Ticker(TickerEvent),
    Trade(TradeEvent),
    Kline(KlineEvent),
    Depth(DepthEvent),
}

impl MarketEvent {
    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Ticker(e) => &e.symbol,
            MarketEvent::Trade(e) => &e.symbol,
            MarketEvent::Kline(e) => &e.symbol,
            MarketEvent::Depth(e) => &e.symbol,
        }
    }

    /// Event timestamp; klines report their interval start
    pub fn timestamp(&self) -> i64 {
        match self {
            MarketEvent::Ticker(e) => e.timestamp,
            MarketEvent::Trade(e) => e.timestamp,
            MarketEvent::Kline(e) => e.interval_start,
            MarketEvent::Depth(e) => e.timestamp,
        }
    }
}
