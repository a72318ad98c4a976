//! In-memory connector shared by the integration tests

#![allow(dead_code)]

use market_stream::stream::transport::TransportSender;
use market_stream::stream::{ChannelKey, CloseCode, Connector, TransportEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One call to [`Connector::open`]
#[derive(Clone)]
pub struct OpenRecord {
    pub key: ChannelKey,
    pub at: Instant,
    pub events: TransportSender,
    pub cancel: CancellationToken,
}

impl OpenRecord {
    pub fn send(&self, event: TransportEvent) {
        self.events.send(event).expect("driver task is gone");
    }
}

/// Connector that records every open and optionally fails each attempt immediately
#[derive(Clone, Default)]
pub struct MockConnector {
    opens: Arc<Mutex<Vec<OpenRecord>>>,
    refuse_with: Option<CloseCode>,
}

impl MockConnector {
    /// Connections stay pending until the test drives them
    pub fn new() -> Self {
        Self::default()
    }

    /// Every attempt closes with `code` before the handshake completes
    pub fn refusing(code: CloseCode) -> Self {
        Self {
            refuse_with: Some(code),
            ..Self::default()
        }
    }

    pub fn opens(&self) -> Vec<OpenRecord> {
        self.opens.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    /// Most recent open, panicking when there has been none
    pub fn last(&self) -> OpenRecord {
        self.opens.lock().last().cloned().expect("no connection opened")
    }
}

impl Connector for MockConnector {
    fn open(&self, key: &ChannelKey, events: TransportSender, cancel: CancellationToken) {
        if let Some(code) = self.refuse_with {
            let _ = events.send(TransportEvent::Closed(code));
        }
        self.opens.lock().push(OpenRecord {
            key: key.clone(),
            at: Instant::now(),
            events,
            cancel,
        });
    }
}

/// Let spawned driver tasks run to their next suspension point
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn ticker_frame(price: f64, event_time: i64) -> String {
    format!(
        r#"{{"e":"24hrTicker","E":{event_time},"s":"BTCUSDT","p":"1.0","P":"0.5","c":"{price}","h":"{price}","l":"{price}","v":"10","q":"1000"}}"#
    )
}

pub fn kline_frame(start: i64, close: f64, closed: bool) -> String {
    format!(
        r#"{{"e":"kline","E":{end},"s":"BTCUSDT","k":{{"t":{start},"T":{end},"i":"1m","o":"{close}","h":"{high}","l":"{low}","c":"{close}","v":"5","x":{closed}}}}}"#,
        end = start + 59_999,
        high = close + 1.0,
        low = close - 1.0,
    )
}
