//! Stream connection manager
//!
//! Owns one physical connection per [`ChannelKey`] and multiplexes it across every
//! subscriber of that key:
//! 1. First `subscribe` for a key creates the subscription and spawns its driver task
//! 2. Later subscribers join the existing connection (refcounted by live handles)
//! 3. Dropping or closing the last handle closes the socket normally and cancels any
//!    pending reconnect timer
//!
//! Each key has a single driver task that decodes frames and invokes handlers, so handlers
//! of one stream see events in arrival order. The registry is the only shared mutable state
//! and every mutation happens under its lock.

use crate::binance::decoder::{DecodeStatsSnapshot, MessageDecoder};
use crate::error::{Result, StreamError};
use crate::stream::channel::ChannelKey;
use crate::stream::events::MarketEvent;
use crate::stream::policy::ReconnectPolicy;
use crate::stream::state::{
    Action, ConnectionEvent, ConnectionMachine, ConnectionState, Transition,
};
use crate::stream::transport::{CloseCode, Connector, TransportEvent};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub type EventHandler = Arc<dyn Fn(&MarketEvent) + Send + Sync>;
pub type StateListener = Arc<dyn Fn(bool) + Send + Sync>;
pub type TerminalListener = Arc<dyn Fn(&StreamError) + Send + Sync>;

type HandlerId = u64;

/// Internal state for one channel key
struct Subscription {
    /// Distinguishes this subscription from earlier ones for the same key
    generation: u64,
    machine: ConnectionMachine,
    handlers: Vec<(HandlerId, EventHandler)>,
    /// Cancels the driver task, its socket and its reconnect timer
    cancel: CancellationToken,
}

#[derive(Default)]
struct Listeners {
    state: Vec<StateListener>,
    terminal: Vec<TerminalListener>,
}

#[derive(Default)]
struct Registry {
    subscriptions: HashMap<ChannelKey, Subscription>,
    listeners: HashMap<ChannelKey, Listeners>,
}

struct Shared<C> {
    connector: C,
    policy: ReconnectPolicy,
    decoder: MessageDecoder,
    registry: Mutex<Registry>,
    next_id: AtomicU64,
}

/// Registry row as reported by [`StreamConnectionManager::subscriptions`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionInfo {
    pub key: ChannelKey,
    pub state: ConnectionState,
    pub subscribers: usize,
    pub reconnect_attempts: u32,
}

/// Manager for multiplexed stream subscriptions
///
/// Cheap to clone; clones share the same registry.
pub struct StreamConnectionManager<C: Connector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for StreamConnectionManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> StreamConnectionManager<C> {
    pub fn new(connector: C, policy: ReconnectPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                connector,
                policy,
                decoder: MessageDecoder::new(),
                registry: Mutex::new(Registry::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.shared.policy
    }

    /// Subscribe `handler` to every event decoded on `key`
    ///
    /// Starts a physical connection if none exists for `key`, otherwise joins it.
    /// The returned handle unsubscribes when closed or dropped.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime when it starts a new connection.
    pub fn subscribe<F>(&self, key: ChannelKey, handler: F) -> SubscriptionHandle
    where
        F: Fn(&MarketEvent) + Send + Sync + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: EventHandler = Arc::new(handler);

        let mut registry = self.shared.registry.lock();
        let restart = match registry.subscriptions.get_mut(&key) {
            Some(sub) => {
                sub.handlers.push((id, handler));
                debug!(
                    key = %key,
                    subscribers = sub.handlers.len(),
                    "Joined existing stream"
                );
                // A stream the server closed normally is restarted by the next subscriber
                if sub.machine.state() == ConnectionState::Idle {
                    sub.machine.apply(ConnectionEvent::Connect);
                    sub.generation = id;
                    sub.cancel = CancellationToken::new();
                    Some(sub.cancel.clone())
                } else {
                    None
                }
            }
            None => {
                let mut machine = ConnectionMachine::new(self.shared.policy);
                machine.apply(ConnectionEvent::Connect);
                let cancel = CancellationToken::new();
                registry.subscriptions.insert(
                    key.clone(),
                    Subscription {
                        generation: id,
                        machine,
                        handlers: vec![(id, handler)],
                        cancel: cancel.clone(),
                    },
                );
                info!(key = %key, "Opening new stream");
                Some(cancel)
            }
        };
        drop(registry);

        if let Some(cancel) = restart {
            let shared = Arc::clone(&self.shared);
            let driver_key = key.clone();
            tokio::spawn(async move {
                drive(shared, driver_key, id, cancel).await;
            });
        }

        let release: Weak<dyn Release> = Arc::downgrade(&self.shared) as Weak<dyn Release>;
        SubscriptionHandle {
            key,
            id,
            release,
            released: AtomicBool::new(false),
        }
    }

    /// Subscribe using the loosely typed `(symbol, channel, intervalOrDepth)` triple
    pub fn subscribe_channel<F>(
        &self,
        symbol: &str,
        channel: &str,
        interval_or_depth: Option<&str>,
        handler: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&MarketEvent) + Send + Sync + 'static,
    {
        let key = ChannelKey::parse(symbol, channel, interval_or_depth)?;
        Ok(self.subscribe(key, handler))
    }

    /// Register a listener told `true` when `key` opens and `false` when it drops
    ///
    /// Listeners may be registered before subscribing; they are cleared when the last
    /// subscriber of `key` leaves.
    pub fn on_connection_state_change<F>(&self, key: &ChannelKey, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        self.shared
            .registry
            .lock()
            .listeners
            .entry(key.clone())
            .or_default()
            .state
            .push(Arc::new(listener));
    }

    /// Register a listener for reconnect exhaustion on `key`
    pub fn on_terminal_error<F>(&self, key: &ChannelKey, listener: F)
    where
        F: Fn(&StreamError) + Send + Sync + 'static,
    {
        self.shared
            .registry
            .lock()
            .listeners
            .entry(key.clone())
            .or_default()
            .terminal
            .push(Arc::new(listener));
    }

    /// Current state of `key`, `None` when no subscription exists
    pub fn state(&self, key: &ChannelKey) -> Option<ConnectionState> {
        self.shared
            .registry
            .lock()
            .subscriptions
            .get(key)
            .map(|sub| sub.machine.state())
    }

    /// Live handles on `key`
    pub fn subscriber_count(&self, key: &ChannelKey) -> usize {
        self.shared
            .registry
            .lock()
            .subscriptions
            .get(key)
            .map_or(0, |sub| sub.handlers.len())
    }

    /// Snapshot of every subscription, ordered by key
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let registry = self.shared.registry.lock();
        let mut infos: Vec<SubscriptionInfo> = registry
            .subscriptions
            .iter()
            .map(|(key, sub)| SubscriptionInfo {
                key: key.clone(),
                state: sub.machine.state(),
                subscribers: sub.handlers.len(),
                reconnect_attempts: sub.machine.attempts(),
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        infos
    }

    pub fn decode_stats(&self) -> DecodeStatsSnapshot {
        self.shared.decoder.stats().snapshot()
    }
}

/// Type-erased release path so handles need not carry the connector type
trait Release: Send + Sync {
    fn release(&self, key: &ChannelKey, id: HandlerId);
}

impl<C: Connector> Release for Shared<C> {
    fn release(&self, key: &ChannelKey, id: HandlerId) {
        let mut registry = self.registry.lock();
        let Some(sub) = registry.subscriptions.get_mut(key) else {
            // The subscription failed earlier; its last holder takes the listeners with it
            if registry.listeners.remove(key).is_some() {
                debug!(key = %key, "Listeners cleared after failed subscription");
            }
            return;
        };
        let Some(position) = sub.handlers.iter().position(|(hid, _)| *hid == id) else {
            return;
        };
        sub.handlers.remove(position);
        if !sub.handlers.is_empty() {
            debug!(key = %key, subscribers = sub.handlers.len(), "Subscriber left");
            return;
        }

        let Some(mut sub) = registry.subscriptions.remove(key) else {
            return;
        };
        let transition = sub.machine.apply(ConnectionEvent::Shutdown);
        sub.cancel.cancel();
        let listeners = registry.listeners.remove(key);
        drop(registry);

        info!(key = %key, from = %transition.from, "Last subscriber left, stream closed");
        if transition.connectivity_change() == Some(false) {
            if let Some(listeners) = listeners {
                for listener in &listeners.state {
                    listener(false);
                }
            }
        }
    }
}

impl<C: Connector> Shared<C> {
    /// Apply `event` to the subscription of `generation`, notifying state listeners
    ///
    /// Returns `None` when the subscription is gone or was replaced.
    fn advance(
        &self,
        key: &ChannelKey,
        generation: u64,
        event: ConnectionEvent,
    ) -> Option<Transition> {
        let mut registry = self.registry.lock();
        let sub = registry
            .subscriptions
            .get_mut(key)
            .filter(|sub| sub.generation == generation)?;
        let transition = sub.machine.apply(event);
        let listeners: Vec<StateListener> = match transition.connectivity_change() {
            Some(_) => registry
                .listeners
                .get(key)
                .map(|l| l.state.clone())
                .unwrap_or_default(),
            None => Vec::new(),
        };
        drop(registry);

        debug!(
            key = %key,
            event = ?event,
            from = %transition.from,
            to = %transition.to,
            "Connection state transition"
        );
        if let Some(connected) = transition.connectivity_change() {
            for listener in &listeners {
                listener(connected);
            }
        }
        Some(transition)
    }

    /// Decode one frame and hand it to every handler of the subscription
    fn dispatch(&self, key: &ChannelKey, generation: u64, frame: &str) {
        let handlers: Vec<EventHandler> = {
            let registry = self.registry.lock();
            match registry
                .subscriptions
                .get(key)
                .filter(|sub| sub.generation == generation)
            {
                Some(sub) => sub.handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return,
            }
        };

        if let Some(event) = self.decoder.decode(key, frame) {
            for handler in &handlers {
                handler(&event);
            }
        }
    }

    /// Tear down a subscription whose reconnect budget is spent
    fn fail(&self, key: &ChannelKey, generation: u64, attempts: u32) {
        let mut registry = self.registry.lock();
        let current = registry.subscriptions.get(key).map(|sub| sub.generation);
        if current != Some(generation) {
            return;
        }
        let Some(sub) = registry.subscriptions.remove(key) else {
            return;
        };
        sub.cancel.cancel();
        let listeners: Vec<TerminalListener> = registry
            .listeners
            .get(key)
            .map(|l| l.terminal.clone())
            .unwrap_or_default();
        drop(registry);

        let err = StreamError::ReconnectExhausted {
            key: key.to_string(),
            attempts,
        };
        error!(
            key = %key,
            attempts,
            subscribers = sub.handlers.len(),
            "Reconnect attempts exhausted, stream failed"
        );
        for listener in &listeners {
            listener(&err);
        }
    }
}

/// Driver task: one per live subscription generation
async fn drive<C: Connector>(
    shared: Arc<Shared<C>>,
    key: ChannelKey,
    generation: u64,
    cancel: CancellationToken,
) {
    loop {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let connection = cancel.child_token();
        shared.connector.open(&key, tx, connection.clone());

        let code = loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                event = rx.recv() => event,
            };
            match event {
                Some(TransportEvent::Opened) => {
                    if shared
                        .advance(&key, generation, ConnectionEvent::Opened)
                        .is_none()
                    {
                        connection.cancel();
                        return;
                    }
                    info!(key = %key, "Stream open");
                }
                Some(TransportEvent::Frame(text)) => shared.dispatch(&key, generation, &text),
                Some(TransportEvent::Closed(code)) => break code,
                None => break CloseCode::ABNORMAL,
            }
        };

        let Some(transition) = shared.advance(&key, generation, ConnectionEvent::Closed(code))
        else {
            return;
        };

        match transition.action {
            Action::ScheduleReconnect { attempt, delay } => {
                warn!(
                    key = %key,
                    code = %code,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Stream closed abnormally, reconnecting"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                match shared.advance(&key, generation, ConnectionEvent::TimerFired) {
                    Some(t) if t.action == Action::Connect => continue,
                    _ => return,
                }
            }
            Action::Fail { attempts } => {
                shared.fail(&key, generation, attempts);
                return;
            }
            _ => {
                info!(key = %key, code = %code, "Stream closed normally");
                return;
            }
        }
    }
}

/// Handle returned by [`StreamConnectionManager::subscribe`]
///
/// Unsubscribes on [`unsubscribe`](Self::unsubscribe) or drop, whichever comes first;
/// further calls are no-ops.
pub struct SubscriptionHandle {
    key: ChannelKey,
    id: HandlerId,
    release: Weak<dyn Release>,
    released: AtomicBool,
}

impl SubscriptionHandle {
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn is_active(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    pub fn unsubscribe(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(release) = self.release.upgrade() {
            release.release(&self.key, self.id);
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
