//! Sentinel - failover monitor for a VRRP-managed pair of DNS nodes
//!
//! Every tick the monitor probes both nodes, works out which one holds the
//! virtual IP, and records what changed.
//!
//! # Components
//!
//! - **Tracker**: pure transition detection between consecutive ticks
//! - **Store**: append-only snapshot and event history (SQLite)
//! - **Dispatcher**: notification fan-out with snooze, toggles and reminders
//! - **Sentinel**: the monitor loop tying prober, resolver, tracker,
//!   store and dispatcher together
//! - **ApiServer**: Prometheus metrics, the reporting API and test notifications

pub mod config;
pub mod http_server;
pub mod metrics;
pub mod notify;
pub mod rate_limit;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod tracker;
pub mod types;

pub use config::{Config, ConfigError};
pub use http_server::{ApiServer, ApiState, NodeInfo};
pub use metrics::MetricsRegistry;
pub use notify::{Dispatcher, NotificationState};
pub use rate_limit::RateLimiter;
pub use server::{LiveObserver, LoopState, NodeTarget, Observer, Sentinel};
pub use store::{HistoryStore, MemoryStore, SqliteStore, StoreError};
pub use telemetry::{TelemetryGuard, init_tracing};
pub use tracker::{MonitorState, Observation, TickOutcome, Tracker};
pub use types::{Event, EventKind, IssueConditions, Notice, NotifyKind, StatusSnapshot};
