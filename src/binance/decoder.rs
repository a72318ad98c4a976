//! Frame decoder
//!
//! Turns one raw text frame from a stream into a [`MarketEvent`], using the channel kind of
//! the stream it arrived on. Frames that cannot be decoded are counted, logged and dropped;
//! a bad frame never tears down the connection loop.

use crate::binance::types::{
    DepthFrame, KlineFrame, StreamEnvelope, TickerFrame, TradeFrame, WireNumber,
};
use crate::error::DecodeError;
use crate::stream::channel::{ChannelKey, ChannelKind, KlineInterval};
use crate::stream::events::{
    DepthEvent, KlineEvent, Level, MarketEvent, TickerEvent, TradeEvent,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Frame counters, shared by every stream of a manager
#[derive(Debug, Default)]
pub struct DecodeStats {
    decoded: AtomicU64,
    dropped: AtomicU64,
    dropped_by_reason: Mutex<BTreeMap<&'static str, u64>>,
}

/// Point-in-time copy of [`DecodeStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecodeStatsSnapshot {
    pub decoded: u64,
    pub dropped: u64,
    pub dropped_by_reason: BTreeMap<&'static str, u64>,
}

impl DecodeStats {
    fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self, error: &DecodeError) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        *self
            .dropped_by_reason
            .lock()
            .entry(error.error_type())
            .or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> DecodeStatsSnapshot {
        DecodeStatsSnapshot {
            decoded: self.decoded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            dropped_by_reason: self.dropped_by_reason.lock().clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MessageDecoder {
    stats: DecodeStats,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Decode a frame, recording the outcome
    ///
    /// Returns `None` for frames that were dropped; the reason has already been logged.
    pub fn decode(&self, key: &ChannelKey, frame: &str) -> Option<MarketEvent> {
        match decode_frame(key, frame) {
            Ok(event) => {
                self.stats.record_decoded();
                Some(event)
            }
            Err(DecodeError::Control) => {
                self.stats.record_dropped(&DecodeError::Control);
                debug!(key = %key, frame = %frame, "Ignoring control frame");
                None
            }
            Err(e) => {
                self.stats.record_dropped(&e);
                warn!(key = %key, error = %e, frame = %frame, "Dropping undecodable frame");
                None
            }
        }
    }
}

/// Decode a frame without touching any counters
pub fn decode_frame(key: &ChannelKey, frame: &str) -> Result<MarketEvent, DecodeError> {
    let frame = frame.trim();
    if frame.is_empty() {
        return Err(DecodeError::Empty);
    }

    let mut value: Value = serde_json::from_str(frame)?;
    if value.get("stream").is_some() && value.get("data").is_some() {
        let envelope: StreamEnvelope = serde_json::from_value(value)?;
        value = envelope.data;
    }

    // Subscription acks: {"result": null, "id": 1}
    if value.get("result").is_some() && value.get("id").is_some() {
        return Err(DecodeError::Control);
    }

    let kind = key.kind();
    if let Some(actual) = value.get("e").and_then(Value::as_str) {
        let expected = expected_event_type(kind);
        if actual != expected {
            return Err(DecodeError::UnexpectedEvent {
                expected,
                actual: actual.to_string(),
            });
        }
    }

    match kind {
        ChannelKind::Ticker => decode_ticker(serde_json::from_value(value)?),
        ChannelKind::Trade => decode_trade(serde_json::from_value(value)?),
        ChannelKind::Kline(interval) => decode_kline(key, interval, serde_json::from_value(value)?),
        ChannelKind::Depth { .. } => decode_depth(key, serde_json::from_value(value)?),
    }
}

fn expected_event_type(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Ticker => "24hrTicker",
        ChannelKind::Trade => "trade",
        ChannelKind::Kline(_) => "kline",
        ChannelKind::Depth { .. } => "depthUpdate",
    }
}

fn decode_ticker(frame: TickerFrame) -> Result<MarketEvent, DecodeError> {
    Ok(MarketEvent::Ticker(TickerEvent {
        price: frame.last_price.to_f64("c")?,
        change: frame.price_change.to_f64("p")?,
        change_percent: frame.price_change_percent.to_f64("P")?,
        high_24h: frame.high_price.to_f64("h")?,
        low_24h: frame.low_price.to_f64("l")?,
        volume: frame.volume.to_f64("v")?,
        quote_volume: frame.quote_volume.to_f64("q")?,
        timestamp: frame.event_time,
        symbol: frame.symbol,
    }))
}

fn decode_trade(frame: TradeFrame) -> Result<MarketEvent, DecodeError> {
    Ok(MarketEvent::Trade(TradeEvent {
        trade_id: frame.trade_id,
        price: frame.price.to_f64("p")?,
        quantity: frame.quantity.to_f64("q")?,
        is_maker_sell: frame.buyer_is_maker,
        timestamp: frame.trade_time,
        symbol: frame.symbol,
    }))
}

fn decode_kline(
    key: &ChannelKey,
    interval: KlineInterval,
    frame: KlineFrame,
) -> Result<MarketEvent, DecodeError> {
    let k = frame.kline;
    Ok(MarketEvent::Kline(KlineEvent {
        symbol: frame.symbol.unwrap_or_else(|| key.symbol().to_string()),
        interval: k.interval.unwrap_or(interval),
        interval_start: k.start_time,
        open: k.open.to_f64("k.o")?,
        high: k.high.to_f64("k.h")?,
        low: k.low.to_f64("k.l")?,
        close: k.close.to_f64("k.c")?,
        volume: k.volume.to_f64("k.v")?,
        is_closed: k.is_closed,
    }))
}

fn decode_depth(key: &ChannelKey, frame: DepthFrame) -> Result<MarketEvent, DecodeError> {
    Ok(MarketEvent::Depth(DepthEvent {
        symbol: frame.symbol.unwrap_or_else(|| key.symbol().to_string()),
        bids: decode_levels(&frame.bids, "bids")?,
        asks: decode_levels(&frame.asks, "asks")?,
        last_update_id: frame.last_update_id,
        timestamp: frame
            .event_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
    }))
}

fn decode_levels(
    levels: &[(WireNumber, WireNumber)],
    field: &'static str,
) -> Result<Vec<Level>, DecodeError> {
    levels
        .iter()
        .map(|(price, quantity)| Ok((price.to_decimal(field)?, quantity.to_decimal(field)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn key(channel: &str, extra: Option<&str>) -> ChannelKey {
        ChannelKey::parse("BTCUSDT", channel, extra).unwrap()
    }

    #[test]
    fn test_decode_ticker() {
        let frame = r#"{"e":"24hrTicker","E":1700000000000,"s":"BTCUSDT","p":"-120.5",
            "P":"-0.27","c":"45100.00","h":"45900.00","l":"44800.00","v":"1000.5","q":"45000000.00"}"#;

        let event = decode_frame(&key("ticker", None), frame).unwrap();
        let MarketEvent::Ticker(ticker) = event else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.symbol, "BTCUSDT");
        assert_eq!(ticker.price, 45100.0);
        assert_eq!(ticker.change, -120.5);
        assert_eq!(ticker.change_percent, -0.27);
        assert_eq!(ticker.high_24h, 45900.0);
        assert_eq!(ticker.low_24h, 44800.0);
        assert_eq!(ticker.quote_volume, 45_000_000.0);
        assert_eq!(ticker.timestamp, 1700000000000);
    }

    #[test]
    fn test_decode_trade() {
        let frame = r#"{"e":"trade","E":1700000000001,"s":"BTCUSDT","t":12345,
            "p":"45000.10","q":"0.250","T":1700000000000,"m":true,"M":true}"#;

        let event = decode_frame(&key("trade", None), frame).unwrap();
        let MarketEvent::Trade(trade) = event else {
            panic!("expected trade");
        };
        assert_eq!(trade.trade_id, 12345);
        assert_eq!(trade.quantity, 0.25);
        assert!(trade.is_maker_sell);
        assert_eq!(trade.timestamp, 1700000000000);
    }

    #[test]
    fn test_decode_kline_inside_combined_envelope() {
        let frame = r#"{"stream":"btcusdt@kline_1m","data":{"e":"kline","E":1700000059999,
            "s":"BTCUSDT","k":{"t":1700000000000,"T":1700000059999,"s":"BTCUSDT","i":"1m",
            "o":"100.0","h":"105.0","l":"99.5","c":"104.0","v":"12.5","x":true}}}"#;

        let event = decode_frame(&key("kline", Some("1m")), frame).unwrap();
        assert_eq!(
            event,
            MarketEvent::Kline(KlineEvent {
                symbol: "BTCUSDT".to_string(),
                interval: KlineInterval::M1,
                interval_start: 1700000000000,
                open: 100.0,
                high: 105.0,
                low: 99.5,
                close: 104.0,
                volume: 12.5,
                is_closed: true,
            })
        );
    }

    #[test]
    fn test_decode_minimal_kline_uses_channel_identity() {
        let frame = r#"{"k":{"t":1700000000000,"o":"100","h":"105","l":"99","c":"104","v":"3","x":true}}"#;

        let event = decode_frame(&key("kline", Some("5m")), frame).unwrap();
        let MarketEvent::Kline(kline) = event else {
            panic!("expected kline");
        };
        assert_eq!(kline.symbol, "BTCUSDT");
        assert_eq!(kline.interval, KlineInterval::M5);
        assert_eq!(kline.interval_start, 1700000000000);
        assert_eq!(kline.close, 104.0);
        assert!(kline.is_closed);

        let with_symbol = r#"{"s":"BTCUSDT","k":{"t":1700000000000,"i":"1m","o":"100","h":"105",
            "l":"99","c":"104","v":"3","x":false}}"#;
        let MarketEvent::Kline(kline) = decode_frame(&key("kline", Some("1m")), with_symbol).unwrap()
        else {
            panic!("expected kline");
        };
        assert_eq!(kline.interval, KlineInterval::M1);
        assert!(!kline.is_closed);
    }

    #[test]
    fn test_decode_partial_depth_uses_channel_symbol() {
        let frame = r#"{"lastUpdateId":160,"bids":[["0.0024","10"]],"asks":[["0.0026","100"],["0.0027","5"]]}"#;

        let event = decode_frame(&key("depth", Some("5")), frame).unwrap();
        let MarketEvent::Depth(depth) = event else {
            panic!("expected depth");
        };
        assert_eq!(depth.symbol, "BTCUSDT");
        assert_eq!(depth.last_update_id, 160);
        assert_eq!(depth.bids, vec![(Decimal::new(24, 4), Decimal::new(10, 0))]);
        assert_eq!(depth.asks.len(), 2);
        assert!(depth.timestamp > 0);
    }

    #[test]
    fn test_malformed_frames_are_errors() {
        let ticker = key("ticker", None);
        assert!(matches!(decode_frame(&ticker, "  "), Err(DecodeError::Empty)));
        assert!(matches!(decode_frame(&ticker, "{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode_frame(&ticker, r#"{"result":null,"id":1}"#),
            Err(DecodeError::Control)
        ));
        assert!(matches!(
            decode_frame(&ticker, r#"{"e":"trade","E":1,"s":"BTCUSDT"}"#),
            Err(DecodeError::UnexpectedEvent { expected: "24hrTicker", .. })
        ));
        // Missing fields
        assert!(matches!(
            decode_frame(&ticker, r#"{"e":"24hrTicker","E":1,"s":"BTCUSDT"}"#),
            Err(DecodeError::Json(_))
        ));
        let bad_price = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"n/a","q":"1","T":1,"m":false}"#;
        assert!(matches!(
            decode_frame(&key("trade", None), bad_price),
            Err(DecodeError::InvalidNumber { field: "p", .. })
        ));
    }

    #[test]
    fn test_decoder_counts_drops() {
        let decoder = MessageDecoder::new();
        let trade = key("trade", None);
        let good = r#"{"e":"trade","E":1,"s":"BTCUSDT","t":1,"p":"1.5","q":"2","T":1,"m":false}"#;

        assert!(decoder.decode(&trade, good).is_some());
        assert!(decoder.decode(&trade, "garbage").is_none());
        assert!(decoder.decode(&trade, r#"{"result":null,"id":7}"#).is_none());

        let stats = decoder.stats().snapshot();
        assert_eq!(stats.decoded, 1);
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.dropped_by_reason.get("json"), Some(&1));
        assert_eq!(stats.dropped_by_reason.get("control"), Some(&1));
    }
}
