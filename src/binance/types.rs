//! Binance Stream Frame Definitions
//!
//! Wire shapes of the market-data stream frames. This schema is fixed by the exchange;
//! the decoder maps it onto the crate's own event types.

use crate::error::DecodeError;
use crate::stream::channel::KlineInterval;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

/// Numeric field sent either as a JSON string (Binance default) or a JSON number
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum WireNumber {
    Text(String),
    Number(serde_json::Number),
}

impl WireNumber {
    pub fn to_f64(&self, field: &'static str) -> Result<f64, DecodeError> {
        let parsed = match self {
            WireNumber::Text(text) => text.trim().parse::<f64>().ok(),
            WireNumber::Number(number) => number.as_f64(),
        };
        parsed
            .filter(|value| value.is_finite())
            .ok_or_else(|| self.invalid(field))
    }

    pub fn to_decimal(&self, field: &'static str) -> Result<Decimal, DecodeError> {
        let text = match self {
            WireNumber::Text(text) => text.trim().to_string(),
            WireNumber::Number(number) => number.to_string(),
        };
        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| self.invalid(field))
    }

    fn invalid(&self, field: &'static str) -> DecodeError {
        let value = match self {
            WireNumber::Text(text) => text.clone(),
            WireNumber::Number(number) => number.to_string(),
        };
        DecodeError::InvalidNumber { field, value }
    }
}

/// Combined-stream envelope: `{"stream": "btcusdt@ticker", "data": {...}}`
#[derive(Debug, Clone, Deserialize)]
pub struct StreamEnvelope {
    pub stream: String,
    pub data: serde_json::Value,
}

/// `<symbol>@ticker` frame
///
/// # Example
/// ```json
/// {"e":"24hrTicker","E":123456789,"s":"BTCUSDT","p":"100.00","P":"0.50",
///  "c":"45100.00","h":"45200.00","l":"44900.00","v":"1000.5","q":"45000000.00"}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct TickerFrame {
    /// Event time (milliseconds since Unix epoch)
    #[serde(rename = "E")]
    pub event_time: i64,

    #[serde(rename = "s")]
    pub symbol: String,

    /// Last price
    #[serde(rename = "c")]
    pub last_price: WireNumber,

    #[serde(rename = "p")]
    pub price_change: WireNumber,

    #[serde(rename = "P")]
    pub price_change_percent: WireNumber,

    #[serde(rename = "h")]
    pub high_price: WireNumber,

    #[serde(rename = "l")]
    pub low_price: WireNumber,

    /// Total traded base asset volume
    #[serde(rename = "v")]
    pub volume: WireNumber,

    /// Total traded quote asset volume
    #[serde(rename = "q")]
    pub quote_volume: WireNumber,
}

/// `<symbol>@trade` frame
#[derive(Debug, Clone, Deserialize)]
pub struct TradeFrame {
    #[serde(rename = "s")]
    pub symbol: String,

    #[serde(rename = "t")]
    pub trade_id: i64,

    #[serde(rename = "p")]
    pub price: WireNumber,

    #[serde(rename = "q")]
    pub quantity: WireNumber,

    /// Trade time
    #[serde(rename = "T")]
    pub trade_time: i64,

    /// Is the buyer the market maker?
    #[serde(rename = "m")]
    pub buyer_is_maker: bool,
}

/// `<symbol>@kline_<interval>` frame
#[derive(Debug, Clone, Deserialize)]
pub struct KlineFrame {
    /// Falls back to the stream's symbol when absent
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,

    #[serde(rename = "k")]
    pub kline: KlineBody,
}

/// Nested `k` object of a kline frame
#[derive(Debug, Clone, Deserialize)]
pub struct KlineBody {
    /// Interval start time
    #[serde(rename = "t")]
    pub start_time: i64,

    /// Falls back to the stream's interval when absent
    #[serde(rename = "i", default)]
    pub interval: Option<KlineInterval>,

    #[serde(rename = "o")]
    pub open: WireNumber,

    #[serde(rename = "h")]
    pub high: WireNumber,

    #[serde(rename = "l")]
    pub low: WireNumber,

    #[serde(rename = "c")]
    pub close: WireNumber,

    #[serde(rename = "v")]
    pub volume: WireNumber,

    /// Is this kline closed?
    #[serde(rename = "x")]
    pub is_closed: bool,
}

/// Depth frame
///
/// Accepts both the partial book (`<symbol>@depth<levels>`) shape
/// `{"lastUpdateId":..,"bids":[[p,q]],"asks":[[p,q]]}` and the diff stream
/// (`<symbol>@depth`) shape `{"e":"depthUpdate","E":..,"s":..,"u":..,"b":[..],"a":[..]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthFrame {
    /// Present on diff frames only
    #[serde(rename = "E", default)]
    pub event_time: Option<i64>,

    /// Present on diff frames only
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,

    #[serde(rename = "lastUpdateId", alias = "u")]
    pub last_update_id: i64,

    /// Bids [[price, quantity], ...]
    #[serde(alias = "b")]
    pub bids: Vec<(WireNumber, WireNumber)>,

    /// Asks [[price, quantity], ...]
    #[serde(alias = "a")]
    pub asks: Vec<(WireNumber, WireNumber)>,
}
