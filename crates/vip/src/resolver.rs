//! VIP ownership resolution by link-layer address comparison.
//!
//! The node whose neighbor entry carries the same link-layer address as the
//! VIP's entry is the one currently answering for the VIP.

use crate::neighbor::{NeighborTable, parse_lladdr};
use crate::types::{ResolverConfig, VipOwnership, VipResolution};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Outcome of one resolution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Ownership is settled for this tick
    Settled {
        ownership: VipOwnership,
        shared_lladdr: bool,
    },
    /// The VIP had no neighbor entry; worth another attempt
    NeedsRetry,
}

/// Compare the VIP's link-layer address against both nodes', primary first.
pub fn decide(vip: Option<&str>, primary: Option<&str>, secondary: Option<&str>) -> Decision {
    let Some(vip) = vip else {
        return Decision::NeedsRetry;
    };

    if primary == Some(vip) {
        Decision::Settled {
            ownership: VipOwnership::primary(),
            shared_lladdr: secondary == Some(vip),
        }
    } else if secondary == Some(vip) {
        Decision::Settled {
            ownership: VipOwnership::secondary(),
            shared_lladdr: false,
        }
    } else {
        Decision::Settled {
            ownership: VipOwnership::none(),
            shared_lladdr: false,
        }
    }
}

/// Resolves which node holds the VIP
pub struct VipResolver {
    table: Arc<dyn NeighborTable>,
    config: ResolverConfig,
}

impl VipResolver {
    /// Create a new resolver over `table`
    pub fn new(table: Arc<dyn NeighborTable>, config: ResolverConfig) -> Self {
        Self { table, config }
    }

    /// Resolve VIP ownership with bounded retries.
    ///
    /// Only a missing VIP entry is retried: it is expected briefly during a
    /// failover. A VIP address matching neither node is final.
    pub async fn resolve(&self, vip: IpAddr, primary: IpAddr, secondary: IpAddr) -> VipResolution {
        let max_attempts = self.config.max_retries.max(1);

        for attempt in 1..=max_attempts {
            match self.attempt(vip, primary, secondary, attempt).await {
                Decision::Settled {
                    ownership,
                    shared_lladdr,
                } => {
                    return VipResolution {
                        ownership,
                        attempts: attempt,
                        shared_lladdr,
                    };
                }
                Decision::NeedsRetry => {
                    warn!(%vip, attempt, max_attempts, "VIP has no neighbor entry");
                    if attempt < max_attempts {
                        sleep(self.config.retry_backoff).await;
                    }
                }
            }
        }

        VipResolution {
            ownership: VipOwnership::none(),
            attempts: max_attempts,
            shared_lladdr: false,
        }
    }

    async fn attempt(&self, vip: IpAddr, primary: IpAddr, secondary: IpAddr, attempt: u32) -> Decision {
        tokio::join!(
            self.table.prime(vip),
            self.table.prime(primary),
            self.table.prime(secondary)
        );

        sleep(self.config.settle_delay).await;

        let (vip_mac, primary_mac, secondary_mac) =
            tokio::join!(self.lladdr(vip), self.lladdr(primary), self.lladdr(secondary));

        debug!(
            attempt,
            vip_mac = ?vip_mac,
            primary_mac = ?primary_mac,
            secondary_mac = ?secondary_mac,
            "Compared link-layer addresses"
        );

        decide(vip_mac.as_deref(), primary_mac.as_deref(), secondary_mac.as_deref())
    }

    async fn lladdr(&self, addr: IpAddr) -> Option<String> {
        match self.table.show(addr).await {
            Ok(output) => parse_lladdr(&output),
            Err(e) => {
                debug!(%addr, error = %e, "Neighbor lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbor::MockNeighborTable;
    use common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const VIP: &str = "10.0.0.100";
    const PRIMARY: &str = "10.0.0.10";
    const SECONDARY: &str = "10.0.0.11";
    const MAC_A: &str = "aa:bb:cc:dd:ee:01";
    const MAC_B: &str = "aa:bb:cc:dd:ee:02";

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn entry(ip: IpAddr, mac: &str) -> String {
        format!("{ip} dev eth0 lladdr {mac} REACHABLE\n")
    }

    fn fast_config() -> ResolverConfig {
        ResolverConfig {
            retry_backoff: Duration::from_millis(1),
            settle_delay: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Table where the VIP maps to `vip_mac` and nodes to fixed addresses
    fn table(vip_mac: Option<&'static str>, primary_mac: &'static str, secondary_mac: &'static str) -> MockNeighborTable {
        let mut table = MockNeighborTable::new();
        table.expect_prime().returning(|_| ());
        table.expect_show().returning(move |ip| {
            if ip == addr(VIP) {
                Ok(vip_mac.map(|mac| entry(ip, mac)).unwrap_or_default())
            } else if ip == addr(PRIMARY) {
                Ok(entry(ip, primary_mac))
            } else {
                Ok(entry(ip, secondary_mac))
            }
        });
        table
    }

    async fn resolve_with(table: MockNeighborTable) -> VipResolution {
        VipResolver::new(Arc::new(table), fast_config())
            .resolve(addr(VIP), addr(PRIMARY), addr(SECONDARY))
            .await
    }

    #[test]
    fn test_decide_rules() {
        assert_eq!(decide(None, Some("A"), Some("B")), Decision::NeedsRetry);
        assert_eq!(
            decide(Some("A"), Some("A"), Some("B")),
            Decision::Settled { ownership: VipOwnership::primary(), shared_lladdr: false }
        );
        assert_eq!(
            decide(Some("B"), Some("A"), Some("B")),
            Decision::Settled { ownership: VipOwnership::secondary(), shared_lladdr: false }
        );
        assert_eq!(
            decide(Some("C"), Some("A"), Some("B")),
            Decision::Settled { ownership: VipOwnership::none(), shared_lladdr: false }
        );
        assert_eq!(
            decide(Some("C"), None, None),
            Decision::Settled { ownership: VipOwnership::none(), shared_lladdr: false }
        );
    }

    #[test]
    fn test_decide_shared_address_prefers_primary() {
        assert_eq!(
            decide(Some("A"), Some("A"), Some("A")),
            Decision::Settled { ownership: VipOwnership::primary(), shared_lladdr: true }
        );
    }

    #[tokio::test]
    async fn test_resolve_primary_owner() {
        let resolution = resolve_with(table(Some(MAC_A), MAC_A, MAC_B)).await;
        assert_eq!(resolution.ownership, VipOwnership::primary());
        assert_eq!(resolution.attempts, 1);
        assert!(!resolution.shared_lladdr);
    }

    #[tokio::test]
    async fn test_resolve_secondary_owner_case_insensitive() {
        let resolution = resolve_with(table(Some("AA:BB:CC:DD:EE:02"), MAC_A, MAC_B)).await;
        assert_eq!(resolution.ownership, VipOwnership::secondary());
    }

    #[tokio::test]
    async fn test_resolve_mismatch_does_not_retry() {
        let shows = Arc::new(AtomicU32::new(0));
        let counter = shows.clone();

        let mut table = MockNeighborTable::new();
        table.expect_prime().returning(|_| ());
        table.expect_show().returning(move |ip| {
            counter.fetch_add(1, Ordering::SeqCst);
            let mac = if ip == addr(VIP) { "aa:bb:cc:dd:ee:99" } else { MAC_A };
            Ok(entry(ip, mac))
        });

        let resolution = resolve_with(table).await;
        assert_eq!(resolution.ownership, VipOwnership::none());
        assert_eq!(resolution.attempts, 1);
        assert_eq!(shows.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resolve_missing_entry_exhausts_retries() {
        let resolution = resolve_with(table(None, MAC_A, MAC_B)).await;
        assert_eq!(resolution.ownership, VipOwnership::none());
        assert_eq!(resolution.attempts, 3);
    }

    #[tokio::test]
    async fn test_resolve_entry_appears_on_third_attempt() {
        let vip_lookups = Arc::new(AtomicU32::new(0));
        let counter = vip_lookups.clone();

        let mut table = MockNeighborTable::new();
        table.expect_prime().times(9).returning(|_| ());
        table.expect_show().returning(move |ip| {
            if ip == addr(VIP) {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Ok(format!("{ip} dev eth0  INCOMPLETE\n"))
                } else {
                    Ok(entry(ip, MAC_B))
                }
            } else if ip == addr(PRIMARY) {
                Ok(entry(ip, MAC_A))
            } else {
                Ok(entry(ip, MAC_B))
            }
        });

        let resolution = resolve_with(table).await;
        assert_eq!(resolution.ownership, VipOwnership::secondary());
        assert_eq!(resolution.attempts, 3);
        assert_eq!(vip_lookups.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_lookup_errors_are_per_address() {
        let mut table = MockNeighborTable::new();
        table.expect_prime().returning(|_| ());
        table.expect_show().returning(|ip| {
            if ip == addr(SECONDARY) {
                Err(Error::neighbor("ip: command failed"))
            } else {
                Ok(entry(ip, MAC_A))
            }
        });

        let resolution = resolve_with(table).await;
        assert_eq!(resolution.ownership, VipOwnership::primary());
        assert_eq!(resolution.attempts, 1);
    }

    #[tokio::test]
    async fn test_resolve_shared_address_flags_anomaly() {
        let resolution = resolve_with(table(Some(MAC_A), MAC_A, MAC_A)).await;
        assert_eq!(resolution.ownership, VipOwnership::primary());
        assert!(resolution.shared_lladdr);
    }
}
