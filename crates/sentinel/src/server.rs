//! Monitor loop.
//!
//! Each tick is a fold `LoopState -> LoopState`: observe both nodes and the
//! VIP, track transitions, persist, dispatch notifications. A failed tick
//! yields the previous state so the next tick diffs against the last
//! observation that was fully recorded.

use crate::metrics::MetricsRegistry;
use crate::notify::{Dispatcher, NotificationState};
use crate::store::HistoryStore;
use crate::tracker::{MonitorState, Observation, Tracker};
use crate::types::{Event, EventKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use prober::NodeProber;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};
use vip::VipResolver;

const PRUNE_EVERY: Duration = Duration::from_secs(60 * 60);

/// State owned by the loop between ticks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopState {
    pub monitor: MonitorState,
    pub notifications: NotificationState,
}

/// Source of one tick's raw observation
#[async_trait]
pub trait Observer: Send + Sync {
    async fn observe(&self) -> Observation;
}

/// Address and management password of one node
#[derive(Clone)]
pub struct NodeTarget {
    pub address: IpAddr,
    pub password: String,
}

/// Observer backed by the network prober and the neighbor table
pub struct LiveObserver {
    prober: NodeProber,
    resolver: VipResolver,
    primary: NodeTarget,
    secondary: NodeTarget,
    vip: IpAddr,
}

impl LiveObserver {
    pub fn new(
        prober: NodeProber,
        resolver: VipResolver,
        primary: NodeTarget,
        secondary: NodeTarget,
        vip: IpAddr,
    ) -> Self {
        Self {
            prober,
            resolver,
            primary,
            secondary,
            vip,
        }
    }
}

#[async_trait]
impl Observer for LiveObserver {
    async fn observe(&self) -> Observation {
        let (primary, secondary) = tokio::join!(
            self.prober.probe(self.primary.address, &self.primary.password),
            self.prober.probe(self.secondary.address, &self.secondary.password),
        );
        let vip = self
            .resolver
            .resolve(self.vip, self.primary.address, self.secondary.address)
            .await;

        Observation {
            primary,
            secondary,
            vip,
        }
    }
}

/// The monitor
pub struct Sentinel {
    observer: Box<dyn Observer>,
    store: Arc<dyn HistoryStore>,
    tracker: Tracker,
    dispatcher: Dispatcher,
    metrics: Arc<MetricsRegistry>,
    interval: Duration,
    retention: Duration,
}

impl Sentinel {
    pub fn new(
        observer: Box<dyn Observer>,
        store: Arc<dyn HistoryStore>,
        tracker: Tracker,
        dispatcher: Dispatcher,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            observer,
            store,
            tracker,
            dispatcher,
            metrics,
            interval: Duration::from_secs(10),
            retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Run forever
    pub async fn run(&self) {
        info!(interval = ?self.interval, "Starting monitor loop");

        if let Err(e) = self.store.append_event(&Event::info(Utc::now(), "Monitor started")).await {
            warn!(error = %e, "Failed to record monitor start");
        }

        let mut state = LoopState::default();
        let mut last_prune: Option<Instant> = None;

        loop {
            state = self.tick(state, Utc::now()).await;

            if last_prune.is_none_or(|at| at.elapsed() >= PRUNE_EVERY) {
                self.prune(Utc::now()).await;
                last_prune = Some(Instant::now());
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run one tick. Never fails: an error is logged, recorded and the
    /// previous state is returned.
    pub async fn tick(&self, state: LoopState, now: DateTime<Utc>) -> LoopState {
        let started = Instant::now();

        match self.try_tick(&state, now).await {
            Ok(next) => {
                self.metrics.record_tick("ok", started.elapsed());
                next
            }
            Err(e) => {
                error!(error = %e, "Monitor tick failed");
                self.metrics.record_tick("error", started.elapsed());

                let event = Event::error(now, format!("Monitor error: {e}"));
                if let Err(e) = self.store.append_event(&event).await {
                    debug!(error = %e, "Failed to record monitor error");
                }
                state
            }
        }
    }

    #[instrument(skip_all)]
    async fn try_tick(&self, state: &LoopState, now: DateTime<Utc>) -> common::Result<LoopState> {
        let observation = self.observer.observe().await;
        self.metrics
            .update_node(self.tracker.primary_name(), &observation.primary);
        self.metrics
            .update_node(self.tracker.secondary_name(), &observation.secondary);

        let outcome = self.tracker.track(&state.monitor, &observation, now);

        self.store.append_snapshot(&outcome.snapshot).await?;
        self.record(&outcome.events).await?;

        for _ in outcome.events.iter().filter(|e| e.kind == EventKind::Failover) {
            self.metrics.record_failover();
        }

        let mut notifications = state.notifications.clone();
        let mut dispatched = Vec::new();
        for notice in outcome.notices {
            dispatched.extend(
                self.dispatcher
                    .notify(notice.kind, notice.vars, false, &mut notifications, now)
                    .await,
            );
        }

        notifications.apply(&outcome.issues);
        dispatched.extend(self.dispatcher.run_reminders(&mut notifications, now).await);
        self.record(&dispatched).await?;

        Ok(LoopState {
            monitor: outcome.next,
            notifications,
        })
    }

    async fn record(&self, events: &[Event]) -> common::Result<()> {
        for event in events {
            log_event(event);
            self.store.append_event(event).await?;
        }
        Ok(())
    }

    async fn prune(&self, now: DateTime<Utc>) {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            return;
        };

        match self.store.prune(now - retention).await {
            Ok(0) => {}
            Ok(removed) => info!(removed, "Pruned history"),
            Err(e) => warn!(error = %e, "Failed to prune history"),
        }
    }
}

fn log_event(event: &Event) {
    match event.kind {
        EventKind::Error => error!(kind = %event.kind, "{}", event.message),
        EventKind::Warning | EventKind::Failover => warn!(kind = %event.kind, "{}", event.message),
        _ => info!(kind = %event.kind, "{}", event.message),
    }
}
