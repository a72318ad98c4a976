//! Connection state machine
//!
//! Advanced by discrete events and free of any timer or socket: the manager performs the
//! returned [`Action`] itself. This keeps the reconnect logic testable by feeding events
//! synchronously.

use crate::stream::policy::ReconnectPolicy;
use crate::stream::transport::CloseCode;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
    /// Terminal until a fresh subscribe
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Start a physical connection
    Connect,
    Opened,
    Closed(CloseCode),
    TimerFired,
    /// Last subscriber left
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    Connect,
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Close the socket normally and cancel any pending reconnect timer
    CloseSocket,
    Fail { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub action: Action,
}

impl Transition {
    /// `Some(true)` on entering `Open`, `Some(false)` on leaving it
    pub fn connectivity_change(&self) -> Option<bool> {
        match (self.from, self.to) {
            (from, ConnectionState::Open) if from != ConnectionState::Open => Some(true),
            (ConnectionState::Open, to) if to != ConnectionState::Open => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempts: u32,
    policy: ReconnectPolicy,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            state: ConnectionState::Idle,
            attempts: 0,
            policy,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Reconnects scheduled since the last successful open
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn apply(&mut self, event: ConnectionEvent) -> Transition {
        use ConnectionState::*;

        let from = self.state;
        let (to, action) = match (from, event) {
            (Idle | Failed, ConnectionEvent::Connect) => {
                if from == Failed {
                    self.attempts = 0;
                }
                (Connecting, Action::Connect)
            }
            (Connecting, ConnectionEvent::Opened) => {
                self.attempts = 0;
                (Open, Action::None)
            }
            (Connecting | Open, ConnectionEvent::Closed(code)) if code.is_normal() => {
                (Idle, Action::None)
            }
            (Connecting | Open, ConnectionEvent::Closed(_)) => {
                if self.policy.should_retry(self.attempts) {
                    let attempt = self.attempts;
                    let delay = self.policy.delay(attempt);
                    self.attempts += 1;
                    (Reconnecting, Action::ScheduleReconnect { attempt, delay })
                } else {
                    (
                        Failed,
                        Action::Fail {
                            attempts: self.attempts,
                        },
                    )
                }
            }
            (Closing, ConnectionEvent::Closed(_)) => (Idle, Action::None),
            (Reconnecting, ConnectionEvent::TimerFired) => (Connecting, Action::Connect),
            (Connecting | Open | Reconnecting, ConnectionEvent::Shutdown) => {
                (Closing, Action::CloseSocket)
            }
            (state, _) => (state, Action::None),
        };

        self.state = to;
        Transition { from, to, action }
    }
}
