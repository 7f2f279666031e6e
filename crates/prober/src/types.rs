//! Probe result types and probe configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a single low-level check (TCP connect, DNS lookup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Check succeeded
    Healthy,
    /// Check ran but the answer was wrong or empty
    Unhealthy,
    /// Check timed out
    Timeout,
    /// Check encountered an error
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
            HealthStatus::Timeout => write!(f, "TIMEOUT"),
            HealthStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single low-level check
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Status of the check
    pub status: HealthStatus,

    /// Duration of the check
    pub duration: Duration,

    /// Optional error message
    pub message: Option<String>,
}

impl HealthCheckResult {
    /// Create a healthy result
    pub fn healthy(duration: Duration) -> Self {
        Self {
            status: HealthStatus::Healthy,
            duration,
            message: None,
        }
    }

    /// Create an unhealthy result
    pub fn unhealthy(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            duration,
            message: Some(message.into()),
        }
    }

    /// Create a timeout result
    pub fn timeout(duration: Duration) -> Self {
        Self {
            status: HealthStatus::Timeout,
            duration,
            message: Some("Check timed out".to_string()),
        }
    }

    /// Create an error result
    pub fn error(duration: Duration, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            duration,
            message: Some(message.into()),
        }
    }

    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Health of one node as observed during a single tick.
///
/// Built once by [`crate::NodeProber::probe`] and never mutated afterwards.
/// `service_up` implies `reachable`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    /// TCP connect to the web port succeeded
    pub reachable: bool,

    /// Management API accepted our credential
    pub service_up: bool,

    /// A real DNS query against the node returned an answer
    pub dns_works: bool,

    /// DHCP server is active on the node
    pub dhcp_enabled: bool,

    /// Number of DHCP leases the node currently hands out
    pub dhcp_lease_count: u64,

    /// Queries answered today
    pub query_count: u64,

    /// Queries blocked today
    pub blocked_count: u64,

    /// Distinct clients seen
    pub client_count: u64,
}

impl NodeHealth {
    /// Health of a node that could not be reached at all.
    pub fn unreachable() -> Self {
        Self::default()
    }
}

/// Summary counters reported by the management API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounters {
    pub queries: u64,
    pub blocked: u64,
    pub clients: u64,
}

/// Prober timeouts and endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Port of the node's web server / management API
    pub web_port: u16,

    /// Timeout for the reachability connect
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Timeout for each management API call
    #[serde(with = "humantime_serde")]
    pub api_timeout: Duration,

    /// Timeout for the best-effort logout
    #[serde(with = "humantime_serde")]
    pub logout_timeout: Duration,

    /// Port the node answers DNS on
    pub dns_port: u16,

    /// Timeout for the DNS query
    #[serde(with = "humantime_serde")]
    pub dns_timeout: Duration,

    /// Name resolved through the node to prove DNS works
    pub dns_query: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            web_port: 80,
            connect_timeout: Duration::from_secs(2),
            api_timeout: Duration::from_secs(5),
            logout_timeout: Duration::from_secs(2),
            dns_port: 53,
            dns_timeout: Duration::from_secs(2),
            dns_query: "google.com".to_string(),
        }
    }
}
