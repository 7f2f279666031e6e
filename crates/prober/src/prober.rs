//! Per-node health probing.

use crate::api::ApiClient;
use crate::checkers::{DnsChecker, HealthChecker, TcpChecker};
use crate::normalize::{dhcp_active, normalize_leases, summary_counters};
use crate::types::{NodeHealth, ProbeConfig};
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};

/// Probes a node's reachability, management API and DNS service.
#[derive(Clone)]
pub struct NodeProber {
    api: ApiClient,
    config: ProbeConfig,
}

impl NodeProber {
    /// Create a new prober
    pub fn new(config: ProbeConfig) -> common::Result<Self> {
        Ok(Self {
            api: ApiClient::new(&config)?,
            config,
        })
    }

    /// Probe configuration in use
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Probe one node. Never fails: every problem degrades a field instead.
    pub async fn probe(&self, address: IpAddr, password: &str) -> NodeHealth {
        let web = SocketAddr::new(address, self.config.web_port);
        let reachability = TcpChecker::new(web, self.config.connect_timeout).check().await;
        if !reachability.is_healthy() {
            debug!(node = %address, status = %reachability.status, "Node unreachable, skipping remaining checks");
            return NodeHealth::unreachable();
        }

        let dns = DnsChecker::new(
            SocketAddr::new(address, self.config.dns_port),
            self.config.dns_query.clone(),
            self.config.dns_timeout,
        );
        let base = format!("http://{web}");

        let (mut health, dns_result) = tokio::join!(self.probe_api(&base, password), dns.check());
        health.reachable = true;
        health.dns_works = dns_result.is_healthy();
        health
    }

    async fn probe_api(&self, base: &str, password: &str) -> NodeHealth {
        let mut health = NodeHealth::unreachable();

        let sid = match self.api.login(base, password).await {
            Ok(sid) => sid,
            Err(e) => {
                warn!(base, error = %e, "Management API authentication failed");
                return health;
            }
        };

        // Authentication success is the service-health signal.
        health.service_up = true;

        match self.api.get_json(base, &sid, "/api/stats/summary").await {
            Ok(body) => {
                let counters = summary_counters(&body);
                health.query_count = counters.queries;
                health.blocked_count = counters.blocked;
                health.client_count = counters.clients;
            }
            Err(e) => debug!(base, error = %e, "Summary statistics unavailable"),
        }

        match self.api.get_json(base, &sid, "/api/config/dhcp").await {
            Ok(body) => health.dhcp_enabled = dhcp_active(&body),
            Err(e) => debug!(base, error = %e, "DHCP configuration unavailable"),
        }

        match self.api.get_json(base, &sid, "/api/dhcp/leases").await {
            Ok(body) => {
                let leases = normalize_leases(&body);
                debug!(base, leases = ?leases.count(), "DHCP leases normalized");
                health.dhcp_lease_count = leases.count();
            }
            Err(e) => debug!(base, error = %e, "DHCP leases unavailable"),
        }

        self.api.logout(base, &sid).await;
        health
    }
}
