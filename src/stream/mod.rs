//! Streaming connection layer
//!
//! - `channel`: stream identity (symbol + channel kind)
//! - `events`: typed events handed to subscribers
//! - `policy` / `state`: reconnect backoff and the per-connection state machine
//! - `transport`: seam to the socket implementation
//! - `manager`: multiplexed subscriptions over one connection per channel key

pub mod channel;
pub mod events;
pub mod manager;
pub mod policy;
pub mod state;
pub mod transport;

pub use channel::{ChannelKey, ChannelKind, KlineInterval};
pub use events::{DepthEvent, KlineEvent, MarketEvent, TickerEvent, TradeEvent};
pub use manager::{StreamConnectionManager, SubscriptionHandle, SubscriptionInfo};
pub use policy::ReconnectPolicy;
pub use state::{ConnectionMachine, ConnectionState};
pub use transport::{CloseCode, Connector, TransportEvent};
