//! VIP ownership resolution for a VRRP-managed node pair.
//!
//! Ownership is observed, never negotiated: the resolver reads the local
//! neighbor table and compares the VIP's link-layer address with each
//! node's.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vip::{IpNeighbor, ResolverConfig, VipResolver};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ResolverConfig::default();
//! let resolver = VipResolver::new(Arc::new(IpNeighbor::new(&config)), config);
//!
//! let resolution = resolver
//!     .resolve("192.168.1.100".parse()?, "192.168.1.10".parse()?, "192.168.1.11".parse()?)
//!     .await;
//! println!("active role: {}", resolution.ownership.active_role());
//! # Ok(())
//! # }
//! ```

mod neighbor;
mod resolver;
mod types;

pub use neighbor::{IpNeighbor, NeighborTable, parse_lladdr};
pub use resolver::{Decision, VipResolver, decide};
pub use types::{
    ActiveRole, DEFAULT_MAX_RETRIES, NodeRole, ResolverConfig, VipOwnership, VipResolution,
};
