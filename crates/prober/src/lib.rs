//! Node health probing for a pair of redundant DNS nodes.
//!
//! A probe answers four questions about one node, cheapest first:
//! - is the web port reachable at all (TCP connect)
//! - does the management API accept our credential (service health)
//! - what does the node report about DHCP and its counters
//! - does the node answer a real DNS query
//!
//! An unreachable node short-circuits everything after the first step so
//! one dead node cannot stretch a monitoring tick.
//!
//! # Example
//!
//! ```no_run
//! use prober::{NodeProber, ProbeConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let prober = NodeProber::new(ProbeConfig::default())?;
//! let health = prober.probe("192.168.1.10".parse()?, "secret").await;
//! assert!(!health.service_up || health.reachable);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod checkers;
pub mod normalize;
pub mod prober;
pub mod types;

pub use checkers::{DnsChecker, HealthChecker, TcpChecker};
pub use normalize::{LeaseList, normalize_leases, summary_counters};
pub use prober::NodeProber;
pub use types::{HealthCheckResult, HealthStatus, NodeHealth, ProbeConfig, SummaryCounters};
