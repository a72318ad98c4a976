//! Connection manager lifecycle against an in-memory connector
//!
//! Runs on a paused clock so reconnect delays are observed exactly.

mod common;

use common::{settle, ticker_frame, MockConnector};
use market_stream::stream::{
    ChannelKey, ChannelKind, CloseCode, ConnectionState, MarketEvent, ReconnectPolicy,
    StreamConnectionManager, TransportEvent,
};
use market_stream::StreamError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn ticker_key() -> ChannelKey {
    ChannelKey::new("BTCUSDT", ChannelKind::Ticker).unwrap()
}

fn policy() -> ReconnectPolicy {
    ReconnectPolicy::new(
        Duration::from_millis(1_000),
        2.0,
        Duration::from_millis(30_000),
        5,
    )
    .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_then_terminal_failure() {
    let connector = MockConnector::refusing(CloseCode::ABNORMAL);
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&failures);
    manager.on_terminal_error(&key, move |err| sink.lock().push(err.clone()));

    let _handle = manager.subscribe(key.clone(), |_| {});
    tokio::time::sleep(Duration::from_secs(60)).await;

    let opens = connector.opens();
    assert_eq!(opens.len(), 6, "initial attempt plus five reconnects");
    let gaps: Vec<u128> = opens
        .windows(2)
        .map(|w| (w[1].at - w[0].at).as_millis())
        .collect();
    assert_eq!(gaps, vec![1_000, 2_000, 4_000, 8_000, 16_000]);

    assert_eq!(
        *failures.lock(),
        vec![StreamError::ReconnectExhausted {
            key: "btcusdt@ticker".to_string(),
            attempts: 5,
        }]
    );
    assert_eq!(manager.state(&key), None);

    // No timer left behind
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.open_count(), 6);
    assert_eq!(failures.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_after_failure_starts_fresh() {
    let connector = MockConnector::refusing(CloseCode::ABNORMAL);
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let terminal = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&terminal);
    manager.on_terminal_error(&key, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let first = manager.subscribe(key.clone(), |_| {});
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(terminal.load(Ordering::SeqCst), 1);

    let _second = manager.subscribe(key.clone(), |_| {});
    assert_eq!(manager.state(&key), Some(ConnectionState::Connecting));
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(connector.open_count(), 12);
    assert_eq!(terminal.load(Ordering::SeqCst), 2);

    // The stale handle from the failed subscription is inert
    first.unsubscribe();
}

#[tokio::test(start_paused = true)]
async fn test_listeners_cleared_when_failed_subscriber_leaves() {
    let connector = MockConnector::refusing(CloseCode::ABNORMAL);
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let terminal = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&terminal);
    manager.on_terminal_error(&key, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let first = manager.subscribe(key.clone(), |_| {});
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(terminal.load(Ordering::SeqCst), 1);
    first.unsubscribe();

    // A later subscriber for the same key does not inherit the old listener
    let _second = manager.subscribe(key.clone(), |_| {});
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(connector.open_count(), 12);
    assert_eq!(terminal.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shared_connection_is_refcounted() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let first = manager.subscribe(key.clone(), |_| {});
    let second = manager.subscribe(key.clone(), |_| {});
    settle().await;

    assert_eq!(connector.open_count(), 1);
    let connection = connector.last();
    connection.send(TransportEvent::Opened);
    settle().await;
    assert_eq!(manager.state(&key), Some(ConnectionState::Open));

    first.unsubscribe();
    settle().await;
    assert!(!connection.cancel.is_cancelled());
    assert_eq!(manager.subscriber_count(&key), 1);
    assert_eq!(manager.state(&key), Some(ConnectionState::Open));

    second.unsubscribe();
    second.unsubscribe();
    assert!(connection.cancel.is_cancelled());
    assert_eq!(manager.state(&key), None);
    assert!(manager.subscriptions().is_empty());
    assert_eq!(connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_cancels_pending_reconnect() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let handle = manager.subscribe(key.clone(), |_| {});
    settle().await;
    connector.last().send(TransportEvent::Closed(CloseCode::ABNORMAL));
    settle().await;
    assert_eq!(manager.state(&key), Some(ConnectionState::Reconnecting));

    drop(handle);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.state(&key), None);
}

#[tokio::test(start_paused = true)]
async fn test_handlers_see_frames_in_order_and_bad_frames_are_dropped() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let prices = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&prices);
    let _handle = manager.subscribe(key.clone(), move |event| {
        if let MarketEvent::Ticker(ticker) = event {
            sink.lock().push(ticker.price);
        }
    });
    settle().await;

    let connection = connector.last();
    connection.send(TransportEvent::Opened);
    connection.send(TransportEvent::Frame(ticker_frame(100.0, 1)));
    connection.send(TransportEvent::Frame("{not json".to_string()));
    connection.send(TransportEvent::Frame(r#"{"result":null,"id":1}"#.to_string()));
    connection.send(TransportEvent::Frame(ticker_frame(101.5, 2)));
    connection.send(TransportEvent::Frame(ticker_frame(99.25, 3)));
    settle().await;

    assert_eq!(*prices.lock(), vec![100.0, 101.5, 99.25]);
    assert_eq!(manager.state(&key), Some(ConnectionState::Open));

    let stats = manager.decode_stats();
    assert_eq!(stats.decoded, 3);
    assert_eq!(stats.dropped, 2);
    assert_eq!(stats.dropped_by_reason.get("json"), Some(&1));
    assert_eq!(stats.dropped_by_reason.get("control"), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_connection_state_listener_and_attempt_reset() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let changes = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&changes);
    manager.on_connection_state_change(&key, move |connected| sink.lock().push(connected));

    let handle = manager.subscribe(key.clone(), |_| {});
    settle().await;
    connector.last().send(TransportEvent::Opened);
    settle().await;
    connector.last().send(TransportEvent::Closed(CloseCode::ABNORMAL));
    settle().await;
    assert_eq!(manager.subscriptions()[0].reconnect_attempts, 1);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert_eq!(connector.open_count(), 2);
    connector.last().send(TransportEvent::Opened);
    settle().await;
    assert_eq!(manager.subscriptions()[0].reconnect_attempts, 0);

    drop(handle);
    assert_eq!(*changes.lock(), vec![true, false, true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_normal_close_goes_idle_without_reconnect() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());
    let key = ticker_key();

    let _handle = manager.subscribe(key.clone(), |_| {});
    settle().await;
    connector.last().send(TransportEvent::Opened);
    connector.last().send(TransportEvent::Closed(CloseCode::GOING_AWAY));
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(manager.state(&key), Some(ConnectionState::Idle));
    assert_eq!(connector.open_count(), 1);

    // The next subscriber restarts the stream
    let _again = manager.subscribe(key.clone(), |_| {});
    settle().await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(manager.subscriber_count(&key), 2);
}

#[tokio::test(start_paused = true)]
async fn test_distinct_keys_get_distinct_connections() {
    let connector = MockConnector::new();
    let manager = StreamConnectionManager::new(connector.clone(), policy());

    let _ticker = manager.subscribe(ticker_key(), |_| {});
    let _trade = manager
        .subscribe_channel("ethusdt", "trade", None, |_| {})
        .unwrap();
    let _depth = manager
        .subscribe_channel("ETHUSDT", "depth", Some("20"), |_| {})
        .unwrap();
    settle().await;

    let mut streams: Vec<String> = connector
        .opens()
        .iter()
        .map(|open| open.key.stream_name())
        .collect();
    streams.sort();
    assert_eq!(
        streams,
        vec!["btcusdt@ticker", "ethusdt@depth20@100ms", "ethusdt@trade"]
    );

    let infos = manager.subscriptions();
    assert_eq!(infos.len(), 3);
    assert!(infos.iter().all(|info| info.subscribers == 1));
}
