//! Channel keys
//!
//! A [`ChannelKey`] identifies one physical stream: a symbol plus a channel kind.
//! Its `Display` form is the Binance stream name, e.g. `btcusdt@kline_1m`.

use crate::error::StreamError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partial-book depth levels Binance supports
const PARTIAL_DEPTH_LEVELS: [u16; 3] = [5, 10, 20];

/// Kline interval as published by Binance (`k.i`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KlineInterval {
    #[serde(rename = "1s")]
    S1,
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "3m")]
    M3,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "2h")]
    H2,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "8h")]
    H8,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "3d")]
    D3,
    #[serde(rename = "1w")]
    W1,
}

impl KlineInterval {
    /// Interval length in milliseconds
    pub fn as_millis(&self) -> i64 {
        const SECOND: i64 = 1_000;
        const MINUTE: i64 = 60 * SECOND;
        const HOUR: i64 = 60 * MINUTE;
        const DAY: i64 = 24 * HOUR;
        match self {
            KlineInterval::S1 => SECOND,
            KlineInterval::M1 => MINUTE,
            KlineInterval::M3 => 3 * MINUTE,
            KlineInterval::M5 => 5 * MINUTE,
            KlineInterval::M15 => 15 * MINUTE,
            KlineInterval::M30 => 30 * MINUTE,
            KlineInterval::H1 => HOUR,
            KlineInterval::H2 => 2 * HOUR,
            KlineInterval::H4 => 4 * HOUR,
            KlineInterval::H6 => 6 * HOUR,
            KlineInterval::H8 => 8 * HOUR,
            KlineInterval::H12 => 12 * HOUR,
            KlineInterval::D1 => DAY,
            KlineInterval::D3 => 3 * DAY,
            KlineInterval::W1 => 7 * DAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KlineInterval::S1 => "1s",
            KlineInterval::M1 => "1m",
            KlineInterval::M3 => "3m",
            KlineInterval::M5 => "5m",
            KlineInterval::M15 => "15m",
            KlineInterval::M30 => "30m",
            KlineInterval::H1 => "1h",
            KlineInterval::H2 => "2h",
            KlineInterval::H4 => "4h",
            KlineInterval::H6 => "6h",
            KlineInterval::H8 => "8h",
            KlineInterval::H12 => "12h",
            KlineInterval::D1 => "1d",
            KlineInterval::D3 => "3d",
            KlineInterval::W1 => "1w",
        }
    }
}

impl FromStr for KlineInterval {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let interval = match s {
            "1s" => KlineInterval::S1,
            "1m" => KlineInterval::M1,
            "3m" => KlineInterval::M3,
            "5m" => KlineInterval::M5,
            "15m" => KlineInterval::M15,
            "30m" => KlineInterval::M30,
            "1h" => KlineInterval::H1,
            "2h" => KlineInterval::H2,
            "4h" => KlineInterval::H4,
            "6h" => KlineInterval::H6,
            "8h" => KlineInterval::H8,
            "12h" => KlineInterval::H12,
            "1d" => KlineInterval::D1,
            "3d" => KlineInterval::D3,
            "1w" => KlineInterval::W1,
            other => {
                return Err(StreamError::InvalidChannel(format!(
                    "unknown kline interval {:?}",
                    other
                )))
            }
        };
        Ok(interval)
    }
}

impl fmt::Display for KlineInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a stream carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChannelKind {
    /// 24h rolling ticker: `<symbol>@ticker`
    Ticker,
    /// Raw trades: `<symbol>@trade`
    Trade,
    /// Candles: `<symbol>@kline_<interval>`
    Kline(KlineInterval),
    /// Order book: `<symbol>@depth<levels>@100ms`, or the diff stream when `levels` is `None`
    Depth { levels: Option<u16> },
}

impl ChannelKind {
    /// Short name used in logs and decode errors
    pub fn name(&self) -> &'static str {
        match self {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trade => "trade",
            ChannelKind::Kline(_) => "kline",
            ChannelKind::Depth { .. } => "depth",
        }
    }
}

/// Identity of one physical stream connection
///
/// Subscribers asking for the same key share one connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    symbol: String,
    kind: ChannelKind,
}

impl ChannelKey {
    /// Build a key, normalising the symbol to upper case
    pub fn new(symbol: &str, kind: ChannelKind) -> crate::error::Result<Self> {
        let symbol = symbol.trim();
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(StreamError::InvalidSymbol(symbol.to_string()));
        }
        if let ChannelKind::Depth { levels: Some(levels) } = kind {
            if !PARTIAL_DEPTH_LEVELS.contains(&levels) {
                return Err(StreamError::InvalidChannel(format!(
                    "unsupported depth levels {} (expected one of {:?})",
                    levels, PARTIAL_DEPTH_LEVELS
                )));
            }
        }
        Ok(Self {
            symbol: symbol.to_uppercase(),
            kind,
        })
    }

    /// Build a key from the loosely typed `(symbol, channel, intervalOrDepth)` triple
    ///
    /// - `kline` requires an interval (`"1m"`, `"1h"`, ...)
    /// - `depth` takes optional levels (`"5"`, `"10"`, `"20"`); without it the diff stream is used
    /// - `ticker` and `trade` ignore the third argument
    pub fn parse(
        symbol: &str,
        channel: &str,
        interval_or_depth: Option<&str>,
    ) -> crate::error::Result<Self> {
        let kind = match channel {
            "ticker" => ChannelKind::Ticker,
            "trade" => ChannelKind::Trade,
            "kline" => {
                let interval = interval_or_depth.ok_or_else(|| {
                    StreamError::InvalidChannel("kline channel requires an interval".to_string())
                })?;
                ChannelKind::Kline(interval.parse()?)
            }
            "depth" => {
                let levels = interval_or_depth
                    .map(|raw| {
                        raw.parse::<u16>().map_err(|_| {
                            StreamError::InvalidChannel(format!("invalid depth levels {:?}", raw))
                        })
                    })
                    .transpose()?;
                ChannelKind::Depth { levels }
            }
            other => {
                return Err(StreamError::InvalidChannel(format!(
                    "unknown channel {:?}",
                    other
                )))
            }
        };
        Self::new(symbol, kind)
    }

    /// Upper-case symbol, e.g. `BTCUSDT`
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Binance stream name, e.g. `btcusdt@depth20@100ms`
    pub fn stream_name(&self) -> String {
        let symbol = self.symbol.to_lowercase();
        match self.kind {
            ChannelKind::Ticker => format!("{}@ticker", symbol),
            ChannelKind::Trade => format!("{}@trade", symbol),
            ChannelKind::Kline(interval) => format!("{}@kline_{}", symbol, interval),
            ChannelKind::Depth { levels: Some(levels) } => {
                format!("{}@depth{}@100ms", symbol, levels)
            }
            ChannelKind::Depth { levels: None } => format!("{}@depth@100ms", symbol),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stream_name())
    }
}
