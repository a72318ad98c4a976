//! Binance WebSocket Connector
//!
//! Opens one `wss://stream.binance.com:9443/ws/<stream>` connection per call and reports
//! the connection lifecycle and text frames to the manager. Reconnection is not handled
//! here: the manager's state machine decides whether and when to call `open` again.

use crate::binance::BINANCE_WS_URL;
use crate::stream::channel::ChannelKey;
use crate::stream::transport::{CloseCode, Connector, TransportEvent, TransportSender};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connector for Binance public market-data streams
#[derive(Debug, Clone)]
pub struct BinanceConnector {
    /// Base WebSocket URL
    pub base_url: String,
}

impl BinanceConnector {
    /// Create a connector for the public Binance endpoint
    pub fn new() -> Self {
        Self::with_base_url(BINANCE_WS_URL)
    }

    /// Create a connector for another endpoint (testnet, local relay)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Full URL for a channel
    pub fn url_for(&self, key: &ChannelKey) -> String {
        format!("{}/{}", self.base_url, key.stream_name())
    }
}

impl Default for BinanceConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for BinanceConnector {
    fn open(&self, key: &ChannelKey, events: TransportSender, cancel: CancellationToken) {
        let url = self.url_for(key);
        let key = key.clone();
        tokio::spawn(async move {
            run_connection(key, url, events, cancel).await;
        });
    }
}

/// Connect and pump frames until the socket ends or `cancel` fires
async fn run_connection(
    key: ChannelKey,
    url: String,
    events: TransportSender,
    cancel: CancellationToken,
) {
    info!(key = %key, url = %url, "Connecting to Binance stream");

    let connected = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(key = %key, "Connection attempt cancelled");
            return;
        }
        result = connect_async(url.as_str()) => result,
    };

    let ws_stream = match connected {
        Ok((ws_stream, _)) => ws_stream,
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to connect to Binance stream");
            let _ = events.send(TransportEvent::Closed(CloseCode::ABNORMAL));
            return;
        }
    };

    info!(key = %key, "Binance stream connected");
    if events.send(TransportEvent::Opened).is_err() {
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    let close_code = loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: WsCloseCode::Normal,
                    reason: "".into(),
                };
                if let Err(e) = write.send(Message::Close(Some(frame))).await {
                    debug!(key = %key, error = %e, "Failed to send close frame");
                }
                info!(key = %key, "Binance stream closed by client");
                return;
            }
            msg = read.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                if events.send(TransportEvent::Frame(text.to_string())).is_err() {
                    // Manager side is gone; nobody is listening
                    return;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                debug!(key = %key, "Received ping, sending pong");
                if write.send(Message::Pong(data)).await.is_err() {
                    warn!(key = %key, "Failed to send pong");
                    break CloseCode::ABNORMAL;
                }
            }
            Some(Ok(Message::Pong(_))) => {
                debug!(key = %key, "Received pong");
            }
            Some(Ok(Message::Close(frame))) => {
                info!(key = %key, frame = ?frame, "WebSocket close frame received");
                break frame
                    .map(|f| CloseCode(u16::from(f.code)))
                    .unwrap_or(CloseCode::ABNORMAL);
            }
            Some(Ok(Message::Binary(_))) => {
                warn!(key = %key, "Received unexpected binary message");
            }
            Some(Ok(Message::Frame(_))) => {
                // Raw frames are handled internally by tungstenite
            }
            Some(Err(e)) => {
                error!(key = %key, error = %e, "WebSocket error");
                break CloseCode::ABNORMAL;
            }
            None => {
                warn!(key = %key, "WebSocket stream ended without close frame");
                break CloseCode::ABNORMAL;
            }
        }
    };

    let _ = events.send(TransportEvent::Closed(close_code));
}
