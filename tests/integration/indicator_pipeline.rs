//! Kline frames through decoder, aggregator and indicator engine

mod common;

use common::{kline_frame, settle, MockConnector};
use market_stream::binance::decode_frame;
use market_stream::candles::KlineOutcome;
use market_stream::indicators::{
    IndicatorEngine, IndicatorParams, IndicatorUpdate, KlinePipeline, MacdCrossover,
};
use market_stream::stream::{
    ChannelKey, ChannelKind, KlineInterval, ReconnectPolicy, StreamConnectionManager,
    TransportEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;

const MINUTE: i64 = 60_000;
const T0: i64 = 1_700_000_040_000;

/// Decelerating decline for 36 candles, then a steady climb for 14
fn dip_then_uptrend() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..36).map(|i| 100.0 - 0.05 * (i * i) as f64).collect();
    let bottom = 100.0 - 0.05 * 35.0 * 35.0;
    closes.extend((1..=14).map(|i| bottom + 2.0 * i as f64));
    closes
}

fn kline_key() -> ChannelKey {
    ChannelKey::new("BTCUSDT", ChannelKind::Kline(KlineInterval::M1)).unwrap()
}

#[test]
fn test_decoded_klines_drive_indicator_updates() {
    let key = kline_key();
    let mut updates: Vec<IndicatorUpdate> = Vec::new();
    let mut pipeline = KlinePipeline::new(IndicatorEngine::default(), 1_000, |u| updates.push(u));

    for (i, close) in dip_then_uptrend().into_iter().enumerate() {
        let start = T0 + i as i64 * MINUTE;
        for frame in [
            kline_frame(start, close + 0.5, false),
            kline_frame(start, close, true),
            // late repeat of the closing update
            kline_frame(start, close, true),
        ] {
            let event = decode_frame(&key, &frame).unwrap();
            pipeline.handle(&event);
        }
    }
    drop(pipeline);

    assert_eq!(updates.len(), 50);
    assert!(updates.windows(2).all(|w| w[0].candle.timestamp < w[1].candle.timestamp));

    // RSI needs 15 closes, Bollinger/SMA/EMA 20, MACD 35
    let first_rsi = updates.iter().position(|u| u.snapshot.rsi.is_some());
    let first_band = updates.iter().position(|u| u.snapshot.bollinger.is_some());
    let first_macd = updates.iter().position(|u| u.snapshot.macd.is_some());
    assert_eq!(first_rsi, Some(14));
    assert_eq!(first_band, Some(19));
    assert_eq!(first_macd, Some(34));

    let crossings: Vec<(usize, MacdCrossover)> = updates
        .iter()
        .enumerate()
        .filter_map(|(i, u)| u.snapshot.macd_crossover.map(|c| (i, c)))
        .collect();
    assert_eq!(crossings, vec![(39, MacdCrossover::Bullish)]);

    let last = updates.last().unwrap();
    assert_eq!(last.snapshot.timestamp, Some(T0 + 49 * MINUTE));
    // Earlier losses still weigh on the Wilder averages
    let rsi = last.snapshot.rsi.unwrap();
    assert!((rsi.value - 61.44).abs() < 0.01, "rsi {}", rsi.value);
    assert!(!rsi.overbought && !rsi.oversold);
    let macd = last.snapshot.macd.unwrap();
    assert_eq!(macd.histogram, macd.macd - macd.signal);
}

#[test]
fn test_bad_klines_never_enter_the_series() {
    let key = kline_key();
    let mut closes = Vec::new();
    let mut pipeline = KlinePipeline::new(IndicatorEngine::default(), 10, |u: IndicatorUpdate| {
        closes.push(u.candle.close)
    });

    let good = decode_frame(&key, &kline_frame(T0, 100.0, true)).unwrap();
    assert!(matches!(pipeline.handle(&good), Some(KlineOutcome::Closed(_))));

    // high below close
    let inverted = r#"{"e":"kline","E":1,"s":"BTCUSDT","k":{"t":1700000100000,"T":1700000159999,
        "i":"1m","o":"100","h":"99","l":"98","c":"101","v":"1","x":true}}"#;
    let event = decode_frame(&key, inverted).unwrap();
    assert_eq!(pipeline.handle(&event), Some(KlineOutcome::Rejected));

    let stale = decode_frame(&key, &kline_frame(T0 - MINUTE, 90.0, true)).unwrap();
    assert_eq!(pipeline.handle(&stale), Some(KlineOutcome::Stale));

    let gap = decode_frame(&key, &kline_frame(T0 + 3 * MINUTE, 103.0, true)).unwrap();
    assert!(matches!(pipeline.handle(&gap), Some(KlineOutcome::Closed(_))));
    let series = pipeline
        .aggregator()
        .series("BTCUSDT", KlineInterval::M1)
        .unwrap();
    assert_eq!(series.gaps().len(), 1);
    assert_eq!(series.gaps()[0].missing_intervals, 2);
    drop(pipeline);

    assert_eq!(closes, vec![100.0, 103.0]);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_indicators_over_manager() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), ReconnectPolicy::default());

    let updates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&updates);
    let engine = IndicatorEngine::new(IndicatorParams {
        sma_period: 3,
        ..IndicatorParams::default()
    });
    let handle = manager
        .subscribe_indicators("btcusdt", KlineInterval::M1, engine, 100, move |u| {
            sink.lock().push(u)
        })
        .unwrap();
    assert_eq!(handle.key(), &kline_key());
    settle().await;

    let connection = connector.last();
    assert_eq!(connection.key.stream_name(), "btcusdt@kline_1m");
    connection.send(TransportEvent::Opened);
    for (i, close) in [10.0, 11.0, 12.0, 13.0].into_iter().enumerate() {
        let start = T0 + i as i64 * MINUTE;
        connection.send(TransportEvent::Frame(kline_frame(start, close - 0.25, false)));
        connection.send(TransportEvent::Frame(kline_frame(start, close, true)));
    }
    settle().await;

    let updates = updates.lock();
    let sma: Vec<Option<f64>> = updates
        .iter()
        .map(|u| u.snapshot.sma.map(|s| s.value))
        .collect();
    assert_eq!(sma, vec![None, None, Some(11.0), Some(12.0)]);
    assert!(updates.iter().all(|u| u.symbol == "BTCUSDT"));
    assert_eq!(manager.decode_stats().decoded, 8);
}
