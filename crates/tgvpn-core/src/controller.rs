//! Session Controller
//!
//! Drives the connection lifecycle against a `TunnelEngine`, validating
//! targets against a `ServerCatalog` and publishing every state change.
//!
//! # Usage
//!
//! ```rust,ignore
//! let controller = SessionController::new(catalog, Arc::new(SimulatedEngine::default()));
//! let mut events = controller.subscribe();
//!
//! controller.connect("eu-west-1").await?;
//! assert!(controller.state().await.status.is_connected());
//!
//! controller.disconnect().await?;
//! ```
//!
//! At most one engine operation is in flight. A second `connect` or
//! `disconnect` while one is pending fails with `AlreadyPending`
//! instead of queueing.

use crate::catalog::{CatalogError, ServerCatalog};
use crate::engine::{EngineOutcome, TunnelEngine};
use crate::session::{SessionEvent, SessionState, SessionStats, SessionStatus};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

/// Default time the engine gets to answer
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity of the state-change channel
const EVENT_CAPACITY: usize = 64;

/// Controller errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("Another operation is already in flight")]
    AlreadyPending,

    #[error("Already connected, disconnect first")]
    AlreadyConnected,

    #[error("Not connected")]
    NotConnected,

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Operation aborted by reset")]
    Aborted,

    #[error("No server to recommend: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid transition from {from:?} on {event}")]
    InvalidTransition { from: SessionStatus, event: String },
}

/// State plus the attempt counter used to drop stale completions
struct Inner {
    state: SessionState,
    epoch: u64,
    stats: SessionStats,
}

/// Session controller
///
/// Owns one `SessionState`. Methods take `&self`, so a controller can be
/// shared behind an `Arc`; commands are serialized by the state lock,
/// which is never held across an engine call.
pub struct SessionController {
    catalog: Arc<ServerCatalog>,
    engine: Arc<dyn TunnelEngine>,
    inner: RwLock<Inner>,
    events: broadcast::Sender<SessionState>,
    timeout: Duration,
}

impl SessionController {
    /// Create a controller in the `Disconnected` state
    pub fn new(catalog: Arc<ServerCatalog>, engine: Arc<dyn TunnelEngine>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            catalog,
            engine,
            inner: RwLock::new(Inner {
                state: SessionState::new(),
                epoch: 0,
                stats: SessionStats::default(),
            }),
            events,
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set how long the engine gets before an attempt is failed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The catalog used to validate targets
    pub fn catalog(&self) -> &Arc<ServerCatalog> {
        &self.catalog
    }

    /// Current state snapshot
    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state.clone()
    }

    /// Usage counters since the controller was created
    pub async fn stats(&self) -> SessionStats {
        self.inner.read().await.stats
    }

    /// Receive a snapshot after every transition
    pub fn subscribe(&self) -> broadcast::Receiver<SessionState> {
        self.events.subscribe()
    }

    fn publish(&self, state: &SessionState) {
        // No subscribers is fine
        let _ = self.events.send(state.clone());
    }

    /// Connect to `server_id` and wait for the engine.
    ///
    /// Returns the `Connected` snapshot on success. An engine failure or
    /// timeout leaves the session `Failed` and returns `EngineFailure`.
    pub async fn connect(&self, server_id: &str) -> Result<SessionState, SessionError> {
        let epoch = {
            let mut inner = self.inner.write().await;

            // Lifecycle conflicts take precedence over target validation
            match inner.state.status {
                SessionStatus::Connecting | SessionStatus::Disconnecting => {
                    return Err(SessionError::AlreadyPending);
                }
                SessionStatus::Connected => return Err(SessionError::AlreadyConnected),
                SessionStatus::Disconnected | SessionStatus::Failed => {}
            }

            if !self.catalog.contains(server_id) {
                warn!("Connect rejected: unknown server {}", server_id);
                return Err(SessionError::UnknownServer(server_id.to_string()));
            }

            inner.state.apply(SessionEvent::Connect {
                server_id: server_id.to_string(),
            })?;
            inner.epoch += 1;
            self.publish(&inner.state);
            inner.epoch
        };

        info!("Connecting to {}", server_id);
        let outcome = self.run_engine(self.engine.begin(server_id)).await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!("Discarding stale connect completion for {}", server_id);
            let idle = !inner.state.status.is_pending() && !inner.state.status.is_connected();
            if outcome.is_success() && idle {
                // The abort from reset was missed; the tunnel came up anyway
                warn!("Tunnel to {} came up after reset, aborting it", server_id);
                self.engine.abort();
            }
            return Err(SessionError::Aborted);
        }

        match outcome {
            EngineOutcome::Success => {
                inner.state.apply(SessionEvent::Established { at: SystemTime::now() })?;
                inner.stats.sessions += 1;
                self.publish(&inner.state);
                info!("Connected to {}", server_id);
                Ok(inner.state.clone())
            }
            EngineOutcome::Failure(reason) => {
                error!("Connection to {} failed: {}", server_id, reason);
                inner.state.apply(SessionEvent::EngineFailed { reason: reason.clone() })?;
                inner.stats.failures += 1;
                self.publish(&inner.state);
                Err(SessionError::EngineFailure(reason))
            }
        }
    }

    /// Connect to the catalog's recommended server
    pub async fn connect_recommended(&self) -> Result<SessionState, SessionError> {
        let server = self.catalog.recommend()?;
        info!("Recommended server: {} ({})", server.id, server.display_name);
        self.connect(&server.id).await
    }

    /// Disconnect and wait for the engine.
    ///
    /// Returns the `Disconnected` snapshot on success.
    pub async fn disconnect(&self) -> Result<SessionState, SessionError> {
        let epoch = {
            let mut inner = self.inner.write().await;
            inner.state.apply(SessionEvent::Disconnect)?;
            inner.epoch += 1;
            self.publish(&inner.state);
            inner.epoch
        };

        info!("Disconnecting");
        let outcome = self.run_engine(self.engine.end()).await;

        let mut inner = self.inner.write().await;
        if inner.epoch != epoch {
            debug!("Discarding stale disconnect completion");
            return Err(SessionError::Aborted);
        }

        match outcome {
            EngineOutcome::Success => {
                let uptime = inner.state.uptime(SystemTime::now()).unwrap_or_default();
                inner.state.apply(SessionEvent::Closed)?;
                inner.stats.completed += 1;
                inner.stats.connected_time += uptime;
                self.publish(&inner.state);
                info!("Disconnected");
                Ok(inner.state.clone())
            }
            EngineOutcome::Failure(reason) => {
                error!("Disconnect failed: {}", reason);
                inner.state.apply(SessionEvent::EngineFailed { reason: reason.clone() })?;
                inner.stats.failures += 1;
                self.publish(&inner.state);
                Err(SessionError::EngineFailure(reason))
            }
        }
    }

    /// Force the session back to `Disconnected`.
    ///
    /// Any in-flight `connect`/`disconnect` is abandoned and will return
    /// `Aborted`. The engine is asked to abort but is not awaited. If an
    /// abandoned `connect` still brings the tunnel up, it is aborted again
    /// when that completion arrives.
    pub async fn reset(&self) -> SessionState {
        let mut inner = self.inner.write().await;
        let previous = inner.state.status;

        if matches!(
            previous,
            SessionStatus::Connecting | SessionStatus::Connected | SessionStatus::Disconnecting
        ) {
            self.engine.abort();
        }

        // Reset is accepted from every state
        let _ = inner.state.apply(SessionEvent::Reset);
        inner.epoch += 1;
        self.publish(&inner.state);

        info!("Session reset (was {:?})", previous);
        inner.state.clone()
    }

    /// Await an engine operation under the timeout
    async fn run_engine<F>(&self, operation: F) -> EngineOutcome
    where
        F: std::future::Future<Output = EngineOutcome>,
    {
        match tokio::time::timeout(self.timeout, operation).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Engine did not respond within {:?}, aborting", self.timeout);
                self.engine.abort();
                EngineOutcome::Failure(format!(
                    "engine did not respond within {}ms",
                    self.timeout.as_millis()
                ))
            }
        }
    }

    /// Format status for display
    pub async fn status(&self) -> String {
        let state = self.state().await;
        match (&state.active_server_id, &state.failure) {
            (Some(id), Some(reason)) => format!("VPN: {} | {} | {}", state.status, id, reason),
            (Some(id), None) => format!("VPN: {} | {}", state.status, id),
            _ => format!("VPN: {}", state.status),
        }
    }
}
