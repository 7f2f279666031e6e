//! Low-level reachability and DNS checks.

use crate::types::HealthCheckResult;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};

/// Health checker trait
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform a health check
    async fn check(&self) -> HealthCheckResult;

    /// Get the name of this checker
    fn name(&self) -> &str;
}

/// TCP connect checker
pub struct TcpChecker {
    target: SocketAddr,
    timeout_duration: Duration,
}

impl TcpChecker {
    /// Create a new TCP checker
    pub fn new(target: SocketAddr, timeout_duration: Duration) -> Self {
        Self {
            target,
            timeout_duration,
        }
    }
}

#[async_trait]
impl HealthChecker for TcpChecker {
    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();

        match timeout(self.timeout_duration, TcpStream::connect(self.target)).await {
            Ok(Ok(_stream)) => {
                let duration = start.elapsed();
                debug!(target = %self.target, duration_ms = duration.as_millis(), "TCP check successful");
                HealthCheckResult::healthy(duration)
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(target = %self.target, error = %e, "TCP check failed");
                HealthCheckResult::unhealthy(duration, format!("Connection failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(target = %self.target, "TCP check timed out");
                HealthCheckResult::timeout(duration)
            }
        }
    }

    fn name(&self) -> &str {
        "tcp"
    }
}

/// DNS checker that resolves a name through one specific server.
///
/// Unlike the system resolver this never falls back to another server, so a
/// healthy answer proves the node itself is answering queries.
pub struct DnsChecker {
    server: SocketAddr,
    query: String,
    timeout_duration: Duration,
    resolver: TokioAsyncResolver,
}

impl DnsChecker {
    /// Create a new DNS checker pinned to `server`
    pub fn new(server: SocketAddr, query: String, timeout_duration: Duration) -> Self {
        let servers = NameServerConfigGroup::from_ips_clear(&[server.ip()], server.port(), true);
        let config = ResolverConfig::from_parts(None, Vec::new(), servers);

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout_duration;
        opts.attempts = 1;
        opts.cache_size = 0;
        opts.use_hosts_file = false;

        Self {
            server,
            query,
            timeout_duration,
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl HealthChecker for DnsChecker {
    async fn check(&self) -> HealthCheckResult {
        let start = Instant::now();

        // The whole lookup, fallbacks included, stays within the configured timeout
        match timeout(self.timeout_duration, self.resolver.lookup_ip(self.query.as_str())).await {
            Ok(Ok(lookup)) => {
                let duration = start.elapsed();
                let count = lookup.iter().count();
                if count > 0 {
                    debug!(server = %self.server, query = %self.query, count, "DNS check successful");
                    HealthCheckResult::healthy(duration)
                } else {
                    debug!(server = %self.server, query = %self.query, "DNS check failed: empty answer");
                    HealthCheckResult::unhealthy(duration, "No addresses resolved")
                }
            }
            Ok(Err(e)) => {
                let duration = start.elapsed();
                debug!(server = %self.server, query = %self.query, error = %e, "DNS check failed");
                HealthCheckResult::error(duration, format!("DNS lookup failed: {}", e))
            }
            Err(_) => {
                let duration = start.elapsed();
                debug!(server = %self.server, query = %self.query, "DNS check timed out");
                HealthCheckResult::timeout(duration)
            }
        }
    }

    fn name(&self) -> &str {
        "dns"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HealthStatus;

    #[tokio::test]
    async fn test_tcp_checker_refused() {
        // Nothing listens on port 1
        let checker = TcpChecker::new("127.0.0.1:1".parse().unwrap(), Duration::from_millis(100));

        let result = checker.check().await;
        assert!(!result.is_healthy());
        assert!(result.duration <= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_tcp_checker_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let checker = TcpChecker::new(addr, Duration::from_millis(500));
        assert!(checker.check().await.is_healthy());
        assert_eq!(checker.name(), "tcp");
    }

    #[tokio::test]
    async fn test_dns_checker_without_server() {
        // No DNS server on this port, so the check must fail within its bound
        let checker = DnsChecker::new(
            "127.0.0.1:1".parse().unwrap(),
            "example.com".to_string(),
            Duration::from_millis(200),
        );

        let result = checker.check().await;
        assert!(matches!(
            result.status,
            HealthStatus::Error | HealthStatus::Timeout | HealthStatus::Unhealthy
        ));
        assert!(result.duration <= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_dns_checker_bounded_by_configured_timeout() {
        // A server that receives queries but never answers
        let silent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let checker = DnsChecker::new(
            silent.local_addr().unwrap(),
            "example.com".to_string(),
            Duration::from_millis(300),
        );

        let started = std::time::Instant::now();
        let result = checker.check().await;
        assert!(!result.is_healthy());
        assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
    }
}
