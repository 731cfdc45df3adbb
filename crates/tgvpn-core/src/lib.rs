//! tgvpn core - VPN session orchestration
//!
//! The state layer that sits in front of a tunnel engine: a catalog of
//! candidate servers with their live metrics, and a controller that
//! drives one connection through its lifecycle.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  list/recommend  ┌───────────────┐
//! │ Presentation │─────────────────▶│ ServerCatalog │
//! │  (CLI / UI)  │                  └───────▲───────┘
//! │              │  connect/disconnect      │ validate
//! │              │─────────────────▶┌───────┴───────────┐  begin/end/abort  ┌──────────────┐
//! │              │◀─────────────────│ SessionController │──────────────────▶│ TunnelEngine │
//! └──────────────┘  state snapshots └───────────────────┘                   └──────────────┘
//! ```
//!
//! # Features
//!
//! - **Strict state machine**: one engine operation in flight at a time
//! - **Load-first ranking**: `load + latency / K`, ties on latency then order
//! - **Push updates**: every transition is broadcast to subscribers
//! - **Pluggable engine**: ships with a timer-based `SimulatedEngine`

mod catalog;
mod config;
mod controller;
mod engine;
mod session;

pub use catalog::{CatalogError, ServerCatalog, ServerDescriptor, DEFAULT_SCORE_DIVISOR};
pub use config::{ConfigError, ConfigFormat, DashboardConfig, EngineSettings, ServerEntry};
pub use controller::{SessionController, SessionError, DEFAULT_CONNECT_TIMEOUT};
pub use engine::{EngineOutcome, SimulatedEngine, TunnelEngine, DEFAULT_SIMULATED_DELAY};
pub use session::{format_uptime, SessionEvent, SessionState, SessionStats, SessionStatus};
