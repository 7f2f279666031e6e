//! Prometheus metrics for the monitor.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use prober::NodeHealth;
use std::time::Duration;

/// Labels for tick outcome metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct TickLabels {
    /// Result (ok, error)
    pub result: String,
}

/// Labels for per-node health gauges
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NodeLabels {
    /// Node display name
    pub node: String,
    /// Check (reachable, service, dns, dhcp)
    pub check: String,
}

/// Labels for notification delivery metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct NotificationLabels {
    /// Channel (telegram, discord, pushover, ntfy, webhook)
    pub channel: String,
    /// Result (success, failure)
    pub result: String,
}

/// Metrics registry with all monitor metrics
pub struct MetricsRegistry {
    /// Prometheus registry
    pub registry: Registry,

    ticks_total: Family<TickLabels, Counter>,
    tick_duration_seconds: Histogram,
    failovers_total: Counter,
    node_up: Family<NodeLabels, Gauge>,
    notifications_total: Family<NotificationLabels, Counter>,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        // Counters are exposed with a `_total` suffix
        let ticks_total = Family::<TickLabels, Counter>::default();
        registry.register(
            "sentinel_ticks",
            "Monitor ticks by result",
            ticks_total.clone(),
        );

        // 10ms to ~20s
        let tick_duration_seconds = Histogram::new(exponential_buckets(0.01, 2.0, 12));
        registry.register(
            "sentinel_tick_duration_seconds",
            "Duration of one monitor tick in seconds",
            tick_duration_seconds.clone(),
        );

        let failovers_total = Counter::default();
        registry.register(
            "sentinel_failovers",
            "Detected changes of the active role",
            failovers_total.clone(),
        );

        let node_up = Family::<NodeLabels, Gauge>::default();
        registry.register(
            "sentinel_node_up",
            "Per-node check result of the last tick (1=up, 0=down)",
            node_up.clone(),
        );

        let notifications_total = Family::<NotificationLabels, Counter>::default();
        registry.register(
            "sentinel_notifications",
            "Notification deliveries by channel and result",
            notifications_total.clone(),
        );

        Self {
            registry,
            ticks_total,
            tick_duration_seconds,
            failovers_total,
            node_up,
            notifications_total,
        }
    }

    pub fn record_tick(&self, result: &str, duration: Duration) {
        self.ticks_total
            .get_or_create(&TickLabels {
                result: result.to_string(),
            })
            .inc();
        self.tick_duration_seconds.observe(duration.as_secs_f64());
    }

    pub fn record_failover(&self) {
        self.failovers_total.inc();
    }

    pub fn update_node(&self, node: &str, health: &NodeHealth) {
        for (check, up) in [
            ("reachable", health.reachable),
            ("service", health.service_up),
            ("dns", health.dns_works),
            ("dhcp", health.dhcp_enabled),
        ] {
            self.node_up
                .get_or_create(&NodeLabels {
                    node: node.to_string(),
                    check: check.to_string(),
                })
                .set(i64::from(up));
        }
    }

    pub fn record_notification(&self, channel: &str, result: &str) {
        self.notifications_total
            .get_or_create(&NotificationLabels {
                channel: channel.to_string(),
                result: result.to_string(),
            })
            .inc();
    }
}
