//! Session State Machine
//!
//! The connection lifecycle as a pure transition function. The
//! controller feeds it commands and engine completions; nothing else
//! mutates a `SessionState`.
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──engine ok──▶ Connected
//!      ▲                        │                        │
//!      │                    engine err               disconnect
//!      │                        ▼                        ▼
//!      │                     Failed ◀───engine err── Disconnecting
//!      │                                                 │
//!      └──────────────────── engine ok ──────────────────┘
//! ```
//!
//! `Connect` from `Failed` starts a new attempt. `Reset` returns any
//! state to `Disconnected`.

use crate::controller::SessionError;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No tunnel and no attempt in flight
    Disconnected,
    /// Waiting for the engine to bring the tunnel up
    Connecting,
    /// Tunnel is up
    Connected,
    /// Waiting for the engine to tear the tunnel down
    Disconnecting,
    /// The last engine operation failed
    Failed,
}

impl SessionStatus {
    /// Is an engine operation in flight?
    pub fn is_pending(&self) -> bool {
        matches!(self, SessionStatus::Connecting | SessionStatus::Disconnecting)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, SessionStatus::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionStatus::Failed)
    }

    /// Status label as shown on the dashboard
    pub fn label(&self) -> &'static str {
        match self {
            SessionStatus::Disconnected => "Disconnected",
            SessionStatus::Connecting => "Connecting...",
            SessionStatus::Connected => "Connected",
            SessionStatus::Disconnecting => "Disconnecting...",
            SessionStatus::Failed => "Failed",
        }
    }

    /// Protection badge as shown on the dashboard
    pub fn badge(&self) -> &'static str {
        if self.is_connected() {
            "Secure"
        } else {
            "Not Protected"
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Inputs to the transition function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// User asked to connect to a (validated) server
    Connect { server_id: String },
    /// Engine brought the tunnel up
    Established { at: SystemTime },
    /// User asked to disconnect
    Disconnect,
    /// Engine tore the tunnel down
    Closed,
    /// Engine reported a failure for the pending operation
    EngineFailed { reason: String },
    /// Administrative override
    Reset,
}

/// Snapshot of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub status: SessionStatus,
    pub active_server_id: Option<String>,
    pub connected_since: Option<SystemTime>,
    /// Reason of the last failure, kept until the next attempt
    pub failure: Option<String>,
}

impl SessionState {
    /// Fresh, disconnected session
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            active_server_id: None,
            connected_since: None,
            failure: None,
        }
    }

    /// Apply an event.
    ///
    /// On error the state is left untouched.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        use SessionEvent as E;
        use SessionStatus as S;

        match (self.status, event) {
            (_, E::Reset) => {
                *self = Self::new();
            }

            (S::Connecting | S::Disconnecting, E::Connect { .. } | E::Disconnect) => {
                return Err(SessionError::AlreadyPending);
            }
            (S::Connected, E::Connect { .. }) => {
                return Err(SessionError::AlreadyConnected);
            }
            (S::Disconnected | S::Failed, E::Connect { server_id }) => {
                self.status = S::Connecting;
                self.active_server_id = Some(server_id);
                self.connected_since = None;
                self.failure = None;
            }

            (S::Connecting, E::Established { at }) => {
                self.status = S::Connected;
                self.connected_since = Some(at);
            }

            (S::Connected, E::Disconnect) => {
                self.status = S::Disconnecting;
            }
            (S::Disconnected | S::Failed, E::Disconnect) => {
                return Err(SessionError::NotConnected);
            }

            (S::Disconnecting, E::Closed) => {
                *self = Self::new();
            }

            (S::Connecting | S::Disconnecting, E::EngineFailed { reason }) => {
                self.status = S::Failed;
                self.connected_since = None;
                self.failure = Some(reason);
            }

            (status, event) => {
                return Err(SessionError::InvalidTransition {
                    from: status,
                    event: format!("{:?}", event),
                });
            }
        }

        Ok(())
    }

    /// How long the tunnel has been up, as of `now`
    pub fn uptime(&self, now: SystemTime) -> Option<Duration> {
        self.connected_since
            .map(|since| now.duration_since(since).unwrap_or_default())
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a duration the way the dashboard does ("2h 34m", "5m 12s")
pub fn format_uptime(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);

    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m {}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Usage counters of one controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Sessions that reached `Connected`
    pub sessions: u64,
    /// Sessions closed by a successful disconnect
    pub completed: u64,
    /// Attempts that ended `Failed`
    pub failures: u64,
    /// Connected time summed over completed sessions
    pub connected_time: Duration,
}

impl SessionStats {
    /// Mean connected time of a completed session
    pub fn average_session(&self) -> Option<Duration> {
        let completed = u32::try_from(self.completed).ok()?;
        self.connected_time.checked_div(completed)
    }
}
