//! Read-only access to the kernel neighbor (ARP/NDP) table.

use crate::types::ResolverConfig;
use async_trait::async_trait;
use common::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

/// Marker preceding the link-layer address in `ip neigh` output
const LLADDR_MARKER: &str = "lladdr";

/// Source of neighbor table entries
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NeighborTable: Send + Sync {
    /// Provoke a neighbor entry for `addr`. Outcome is irrelevant.
    async fn prime(&self, addr: IpAddr);

    /// Raw neighbor table entry for `addr`
    async fn show(&self, addr: IpAddr) -> Result<String>;
}

/// Extract the link-layer address from one `ip neigh show` entry.
///
/// Returns the upper-cased token after `lladdr`, or `None` when the marker
/// is missing or has nothing after it.
pub fn parse_lladdr(output: &str) -> Option<String> {
    let mut tokens = output.split_whitespace();
    tokens.find(|token| *token == LLADDR_MARKER)?;
    tokens.next().map(str::to_uppercase)
}

/// Neighbor table read through the `ip` command
pub struct IpNeighbor {
    ip_binary: String,
    prime_port: u16,
    prime_timeout: Duration,
    lookup_timeout: Duration,
}

impl IpNeighbor {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            ip_binary: config.ip_binary.clone(),
            prime_port: config.prime_port,
            prime_timeout: config.prime_timeout,
            lookup_timeout: config.lookup_timeout,
        }
    }
}

#[async_trait]
impl NeighborTable for IpNeighbor {
    async fn prime(&self, addr: IpAddr) {
        let target = SocketAddr::new(addr, self.prime_port);
        let outcome = timeout(self.prime_timeout, TcpStream::connect(target)).await;
        trace!(%target, connected = matches!(outcome, Ok(Ok(_))), "Primed neighbor entry");
    }

    async fn show(&self, addr: IpAddr) -> Result<String> {
        let mut command = Command::new(&self.ip_binary);
        command
            .args(["neigh", "show", &addr.to_string()])
            .kill_on_drop(true);

        let output = timeout(self.lookup_timeout, command.output())
            .await
            .map_err(|_| Error::neighbor(format!("lookup of {addr} timed out")))??;

        if !output.status.success() {
            return Err(Error::neighbor(format!(
                "{} neigh show {} exited with {}",
                self.ip_binary, addr, output.status
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
