//! Server Catalog
//!
//! Holds the candidate VPN endpoints and their last-measured metrics,
//! and answers selection queries for the dashboard.
//!
//! # Ranking
//!
//! Servers are ranked by a composite score:
//!
//! ```text
//! score = load_percent + latency_ms / K
//! ```
//!
//! With the default `K = 10` load dominates: an overloaded but nearby
//! server ranks below a lightly loaded one further away. Comparisons use
//! the scaled integer form `load_percent * K + latency_ms` so equal
//! scores are detected exactly.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Default score divisor (K)
pub const DEFAULT_SCORE_DIVISOR: u32 = 10;

/// A candidate VPN endpoint with its live metrics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Stable identifier, unique within a catalog
    pub id: String,
    /// Human-readable label
    pub display_name: String,
    /// Last-measured round-trip time
    pub latency_ms: u32,
    /// Last-measured utilization, 0..=100
    pub load_percent: u8,
    /// When the metrics were last written
    pub refreshed_at: SystemTime,
}

impl ServerDescriptor {
    /// Create a descriptor with metrics measured now
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        latency_ms: u32,
        load_percent: u8,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            latency_ms,
            load_percent,
            refreshed_at: SystemTime::now(),
        }
    }

    /// Time since the metrics were last refreshed.
    ///
    /// Metrics are advisory; a clock that moved backwards yields zero.
    pub fn age(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.refreshed_at)
            .unwrap_or_default()
    }

    /// Are the metrics older than `max_age`?
    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    /// Score scaled by `divisor`, used for exact comparisons
    fn scaled_score(&self, divisor: u32) -> u64 {
        u64::from(self.load_percent) * u64::from(divisor) + u64::from(self.latency_ms)
    }
}

/// Catalog errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Server not found: {0}")]
    NotFound(String),

    #[error("Catalog is empty")]
    Empty,

    #[error("Duplicate server id: {0}")]
    DuplicateId(String),

    #[error("Load must be within 0..=100, got {0}")]
    InvalidLoad(u8),

    #[error("Score divisor must be positive")]
    InvalidDivisor,
}

/// Server catalog
///
/// Reads and metric refreshes may run concurrently. Each descriptor is
/// updated under the write lock, so readers observe either the old or the
/// new metrics of a server, never a mix.
#[derive(Debug)]
pub struct ServerCatalog {
    servers: RwLock<Vec<ServerDescriptor>>,
    score_divisor: u32,
}

impl ServerCatalog {
    /// Create an empty catalog with the default divisor
    pub fn new() -> Self {
        Self {
            servers: RwLock::new(Vec::new()),
            score_divisor: DEFAULT_SCORE_DIVISOR,
        }
    }

    /// Create an empty catalog with a custom score divisor
    pub fn with_divisor(score_divisor: u32) -> Result<Self, CatalogError> {
        if score_divisor == 0 {
            return Err(CatalogError::InvalidDivisor);
        }
        Ok(Self {
            servers: RwLock::new(Vec::new()),
            score_divisor,
        })
    }

    /// Build a catalog from descriptors, keeping their order
    pub fn from_servers<I>(score_divisor: u32, servers: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = ServerDescriptor>,
    {
        let catalog = Self::with_divisor(score_divisor)?;
        for server in servers {
            catalog.insert(server)?;
        }
        Ok(catalog)
    }

    /// Score divisor (K)
    pub fn score_divisor(&self) -> u32 {
        self.score_divisor
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ServerDescriptor>> {
        self.servers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ServerDescriptor>> {
        self.servers.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a server
    pub fn insert(&self, server: ServerDescriptor) -> Result<(), CatalogError> {
        if server.load_percent > 100 {
            return Err(CatalogError::InvalidLoad(server.load_percent));
        }

        let mut servers = self.write();
        if servers.iter().any(|s| s.id == server.id) {
            return Err(CatalogError::DuplicateId(server.id));
        }

        debug!("Catalog: added {} ({})", server.id, server.display_name);
        servers.push(server);
        Ok(())
    }

    /// All servers in insertion order
    pub fn list(&self) -> Vec<ServerDescriptor> {
        self.read().clone()
    }

    /// Look up a server by id
    pub fn get(&self, id: &str) -> Result<ServerDescriptor, CatalogError> {
        self.read()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    /// Is `id` in the catalog?
    pub fn contains(&self, id: &str) -> bool {
        self.read().iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Update a server's metrics in place
    pub fn refresh(&self, id: &str, latency_ms: u32, load_percent: u8) -> Result<(), CatalogError> {
        if load_percent > 100 {
            return Err(CatalogError::InvalidLoad(load_percent));
        }

        let mut servers = self.write();
        let server = servers
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;

        server.latency_ms = latency_ms;
        server.load_percent = load_percent;
        server.refreshed_at = SystemTime::now();

        debug!("Catalog: refreshed {} ({}ms, {}% load)", id, latency_ms, load_percent);
        Ok(())
    }

    /// Composite score of a server for display
    pub fn score(&self, server: &ServerDescriptor) -> f64 {
        f64::from(server.load_percent) + f64::from(server.latency_ms) / f64::from(self.score_divisor)
    }

    /// Pick the best server.
    ///
    /// Lowest score wins; ties go to the lowest latency, then to the
    /// server inserted first.
    pub fn recommend(&self) -> Result<ServerDescriptor, CatalogError> {
        let divisor = self.score_divisor;
        // min_by_key keeps the first of equal minima
        self.read()
            .iter()
            .min_by_key(|s| (s.scaled_score(divisor), s.latency_ms))
            .cloned()
            .ok_or(CatalogError::Empty)
    }

    /// All servers ordered best first, using the same rules as `recommend`
    pub fn ranked(&self) -> Vec<ServerDescriptor> {
        let divisor = self.score_divisor;
        let mut servers = self.list();
        servers.sort_by_key(|s| (s.scaled_score(divisor), s.latency_ms));
        servers
    }

    /// Mean load across the catalog, if any servers are known
    pub fn mean_load(&self) -> Option<f64> {
        let servers = self.read();
        if servers.is_empty() {
            return None;
        }
        let total: u32 = servers.iter().map(|s| u32::from(s.load_percent)).sum();
        Some(f64::from(total) / servers.len() as f64)
    }
}

impl Default for ServerCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn dashboard_catalog() -> ServerCatalog {
        ServerCatalog::from_servers(
            DEFAULT_SCORE_DIVISOR,
            vec![
                ServerDescriptor::new("us-east-1", "US East (Virginia)", 12, 45),
                ServerDescriptor::new("us-west-1", "US West (California)", 34, 67),
                ServerDescriptor::new("eu-west-1", "EU West (Ireland)", 89, 23),
                ServerDescriptor::new("ap-southeast-1", "Asia Pacific (Singapore)", 156, 78),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let catalog = dashboard_catalog();
        let ids: Vec<_> = catalog.list().into_iter().map(|s| s.id).collect();

        assert_eq!(ids, vec!["us-east-1", "us-west-1", "eu-west-1", "ap-southeast-1"]);
    }

    #[test]
    fn test_get() {
        let catalog = dashboard_catalog();

        assert_eq!(catalog.get("eu-west-1").unwrap().latency_ms, 89);
        assert_eq!(
            catalog.get("ghost-1"),
            Err(CatalogError::NotFound("ghost-1".to_string()))
        );
    }

    #[test]
    fn test_recommend_prefers_low_load() {
        let catalog = ServerCatalog::from_servers(
            10,
            vec![
                ServerDescriptor::new("us-east-1", "US East", 12, 45),
                ServerDescriptor::new("eu-west-1", "EU West", 89, 23),
            ],
        )
        .unwrap();

        let best = catalog.recommend().unwrap();
        assert_eq!(best.id, "eu-west-1");
        assert!((catalog.score(&best) - 31.9).abs() < 1e-9);
    }

    #[test]
    fn test_recommend_empty() {
        let catalog = ServerCatalog::new();
        assert_eq!(catalog.recommend(), Err(CatalogError::Empty));
    }

    #[test]
    fn test_recommend_tie_breaks_on_latency() {
        // Both score 30: 28 + 20/10 and 29 + 10/10
        let catalog = ServerCatalog::from_servers(
            10,
            vec![
                ServerDescriptor::new("slow", "Slow", 20, 28),
                ServerDescriptor::new("fast", "Fast", 10, 29),
            ],
        )
        .unwrap();

        assert_eq!(catalog.recommend().unwrap().id, "fast");
    }

    #[test]
    fn test_recommend_tie_breaks_on_insertion_order() {
        let catalog = ServerCatalog::from_servers(
            10,
            vec![
                ServerDescriptor::new("first", "First", 40, 10),
                ServerDescriptor::new("second", "Second", 40, 10),
            ],
        )
        .unwrap();

        assert_eq!(catalog.recommend().unwrap().id, "first");
    }

    #[test]
    fn test_recommend_is_minimum() {
        let catalog = dashboard_catalog();
        let best = catalog.recommend().unwrap();
        let best_score = catalog.score(&best);

        for server in catalog.list() {
            assert!(catalog.score(&server) >= best_score);
        }
    }

    #[test]
    fn test_ranked_matches_recommend() {
        let catalog = dashboard_catalog();
        let ranked = catalog.ranked();

        assert_eq!(ranked[0], catalog.recommend().unwrap());
        assert_eq!(ranked.last().unwrap().id, "ap-southeast-1");
    }

    #[test]
    fn test_refresh_updates_in_place() {
        let catalog = dashboard_catalog();
        catalog.refresh("us-east-1", 5, 10).unwrap();

        let server = catalog.get("us-east-1").unwrap();
        assert_eq!((server.latency_ms, server.load_percent), (5, 10));
        assert_eq!(catalog.list()[0].id, "us-east-1");
        assert_eq!(catalog.recommend().unwrap().id, "us-east-1");
    }

    #[test]
    fn test_refresh_rejects_bad_input() {
        let catalog = dashboard_catalog();

        assert_eq!(
            catalog.refresh("ghost-1", 1, 1),
            Err(CatalogError::NotFound("ghost-1".to_string()))
        );
        assert_eq!(catalog.refresh("us-east-1", 1, 101), Err(CatalogError::InvalidLoad(101)));
        assert_eq!(catalog.get("us-east-1").unwrap().load_percent, 45);
    }

    #[test]
    fn test_insert_duplicate() {
        let catalog = dashboard_catalog();
        let result = catalog.insert(ServerDescriptor::new("us-east-1", "Again", 1, 1));

        assert_eq!(result, Err(CatalogError::DuplicateId("us-east-1".to_string())));
        assert_eq!(catalog.len(), 4);
    }

    #[test]
    fn test_zero_divisor_rejected() {
        assert_eq!(ServerCatalog::with_divisor(0).unwrap_err(), CatalogError::InvalidDivisor);
    }

    #[test]
    fn test_staleness() {
        let mut server = ServerDescriptor::new("x", "X", 1, 1);
        assert!(!server.is_stale(Duration::from_secs(60)));

        server.refreshed_at = SystemTime::now() - Duration::from_secs(120);
        assert!(server.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_mean_load() {
        assert_eq!(ServerCatalog::new().mean_load(), None);
        assert_eq!(dashboard_catalog().mean_load(), Some(53.25));
    }

    #[test]
    fn test_concurrent_refresh_is_atomic_per_server() {
        let catalog = Arc::new(dashboard_catalog());

        let writer = {
            let catalog = catalog.clone();
            std::thread::spawn(move || {
                for i in 0..1000u32 {
                    // latency and load always move together
                    let v = (i % 100) as u8;
                    catalog.refresh("us-east-1", u32::from(v) * 2, v).unwrap();
                }
            })
        };

        for _ in 0..1000 {
            let server = catalog.get("us-east-1").unwrap();
            if server.load_percent != 45 {
                assert_eq!(server.latency_ms, u32::from(server.load_percent) * 2);
            }
        }

        writer.join().unwrap();
    }
}
