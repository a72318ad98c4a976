//! Transport seam between the manager and a socket implementation
//!
//! A [`Connector`] opens one physical connection per call and reports what happens on it
//! through [`TransportEvent`]s. The manager never touches sockets directly, so tests can
//! drive it with an in-memory connector.

use crate::stream::channel::ChannelKey;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// WebSocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    pub const NORMAL: CloseCode = CloseCode(1000);
    pub const GOING_AWAY: CloseCode = CloseCode(1001);
    /// No close frame was received (reset, EOF, failed handshake)
    pub const ABNORMAL: CloseCode = CloseCode(1006);

    /// Normal closures end a subscription's connection without reconnecting
    pub fn is_normal(&self) -> bool {
        *self == Self::NORMAL || *self == Self::GOING_AWAY
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened on a physical connection, in order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake completed
    Opened,
    /// One text frame
    Frame(String),
    /// Connection ended; sent at most once, and never after cancellation
    Closed(CloseCode),
}

pub type TransportSender = mpsc::UnboundedSender<TransportEvent>;

/// Opens physical connections
///
/// `open` must not block: implementations spawn their I/O and return. Once `cancel` fires
/// the implementation closes the socket with a normal closure code and stops sending.
/// If the connection attempt or the socket fails, it sends `Closed` with a non-normal code.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, key: &ChannelKey, events: TransportSender, cancel: CancellationToken);
}
