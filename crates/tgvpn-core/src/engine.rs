//! Tunnel Engine
//!
//! The controller never touches the network. Bringing a tunnel up or
//! down is delegated to a `TunnelEngine`, which a real deployment backs
//! with WireGuard or similar.
//!
//! `SimulatedEngine` reproduces the dashboard behaviour: every attempt
//! succeeds after a fixed delay unless the server is configured to fail.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Default simulated handshake delay
pub const DEFAULT_SIMULATED_DELAY: Duration = Duration::from_millis(2000);

/// Result of an engine operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Success,
    Failure(String),
}

impl EngineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EngineOutcome::Success)
    }
}

/// External collaborator that establishes and tears down tunnels.
///
/// # Example
///
/// ```ignore
/// struct WireGuardEngine { device: Arc<Device> }
///
/// #[async_trait]
/// impl TunnelEngine for WireGuardEngine {
///     async fn begin(&self, server_id: &str) -> EngineOutcome {
///         // Handshake with the peer
///     }
///     async fn end(&self) -> EngineOutcome {
///         // Tear down
///     }
///     fn abort(&self) {
///         // Cancel whatever is in flight
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait TunnelEngine: Send + Sync {
    /// Bring a tunnel up to `server_id`
    async fn begin(&self, server_id: &str) -> EngineOutcome;

    /// Tear the current tunnel down
    async fn end(&self) -> EngineOutcome;

    /// Cancel the in-flight operation, best effort.
    ///
    /// Must not block. The engine may still hold a live tunnel afterwards.
    fn abort(&self);
}

/// Timer-based engine used by the dashboard
pub struct SimulatedEngine {
    /// How long each begin/end takes
    delay: Duration,
    /// Servers whose handshake always fails
    fail_servers: HashSet<String>,
    /// Wakes pending operations on abort
    abort: Notify,
    /// Is the simulated tunnel up?
    up: AtomicBool,
}

impl SimulatedEngine {
    /// Create an engine with the given delay
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            fail_servers: HashSet::new(),
            abort: Notify::new(),
            up: AtomicBool::new(false),
        }
    }

    /// Make handshakes with these servers fail
    pub fn failing<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_servers.extend(servers.into_iter().map(Into::into));
        self
    }

    /// Is the simulated tunnel up?
    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Relaxed)
    }

    /// Wait out the delay unless aborted. Returns false when aborted.
    async fn wait(&self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => true,
            _ = self.abort.notified() => false,
        }
    }
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new(DEFAULT_SIMULATED_DELAY)
    }
}

#[async_trait::async_trait]
impl TunnelEngine for SimulatedEngine {
    async fn begin(&self, server_id: &str) -> EngineOutcome {
        debug!("Simulated handshake with {} ({:?})", server_id, self.delay);

        if !self.wait().await {
            return EngineOutcome::Failure("aborted".to_string());
        }

        if self.fail_servers.contains(server_id) {
            warn!("Simulated handshake with {} failed", server_id);
            return EngineOutcome::Failure(format!("handshake with {} failed", server_id));
        }

        self.up.store(true, Ordering::Relaxed);
        info!("Simulated tunnel to {} established", server_id);
        EngineOutcome::Success
    }

    async fn end(&self) -> EngineOutcome {
        if !self.wait().await {
            return EngineOutcome::Failure("aborted".to_string());
        }

        self.up.store(false, Ordering::Relaxed);
        info!("Simulated tunnel closed");
        EngineOutcome::Success
    }

    fn abort(&self) {
        debug!("Simulated engine: abort");
        self.up.store(false, Ordering::Relaxed);
        self.abort.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_simulated_success() {
        let engine = SimulatedEngine::new(Duration::from_millis(5));

        assert_eq!(engine.begin("us-east-1").await, EngineOutcome::Success);
        assert!(engine.is_up());

        assert_eq!(engine.end().await, EngineOutcome::Success);
        assert!(!engine.is_up());
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let engine = SimulatedEngine::new(Duration::from_millis(5)).failing(["eu-west-1"]);

        let outcome = engine.begin("eu-west-1").await;
        assert!(!outcome.is_success());
        assert!(!engine.is_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulated_abort() {
        let engine = Arc::new(SimulatedEngine::new(Duration::from_secs(60)));

        let pending = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.begin("us-east-1").await })
        };

        // Let the handshake start waiting
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.abort();

        let outcome = pending.await.unwrap();
        assert_eq!(outcome, EngineOutcome::Failure("aborted".to_string()));
        assert!(!engine.is_up());
    }
}
