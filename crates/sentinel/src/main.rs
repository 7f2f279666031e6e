//! Sentinel monitor binary

use anyhow::Context;
use clap::Parser;
use rand::distr::{Alphanumeric, SampleString};
use sentinel::{
    ApiServer, ApiState, Config, Dispatcher, HistoryStore, LiveObserver, MetricsRegistry,
    NodeInfo, NodeTarget, RateLimiter, Sentinel, SqliteStore, Tracker, init_tracing,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use vip::{IpNeighbor, VipResolver};

/// Failover monitor for a VRRP-managed node pair
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Configuration file (default: search standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    // Tracing is not initialized until the configuration is known
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    let _telemetry_guard = init_tracing(&config.logging, &config.telemetry)
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialize tracing")?;

    info!(
        primary = %config.nodes.primary.address,
        secondary = %config.nodes.secondary.address,
        vip = %config.vip,
        "Sentinel starting"
    );

    let api_key = match config.api.api_key.clone() {
        Some(key) => key,
        None => {
            let key = Alphanumeric.sample_string(&mut rand::rng(), 32);
            warn!(api_key = %key, "No API key configured, generated one for this run");
            key
        }
    };

    let metrics = Arc::new(MetricsRegistry::new());

    let store: Arc<dyn HistoryStore> = Arc::new(
        SqliteStore::connect(&config.storage.database)
            .await
            .context("failed to open history database")?,
    );

    let dispatcher = Dispatcher::with_default_senders(
        &config.notifications.settings_path,
        config.notifications.channel_timeout,
    )
    .context("failed to build notification client")?
    .with_metrics(metrics.clone());
    let test_dispatcher = Dispatcher::with_default_senders(
        &config.notifications.settings_path,
        config.notifications.channel_timeout,
    )
    .context("failed to build notification client")?
    .with_metrics(metrics.clone());

    let prober = prober::NodeProber::new(config.probe.clone()).context("failed to build prober")?;
    let resolver = VipResolver::new(
        Arc::new(IpNeighbor::new(&config.resolver)),
        config.resolver.clone(),
    );
    let observer = LiveObserver::new(
        prober,
        resolver,
        NodeTarget {
            address: config.nodes.primary.address,
            password: config.nodes.primary.password.clone(),
        },
        NodeTarget {
            address: config.nodes.secondary.address,
            password: config.nodes.secondary.password.clone(),
        },
        config.vip,
    );

    let tracker = Tracker::new(
        config.nodes.primary_name(),
        config.nodes.secondary_name(),
        config.vip.to_string(),
    );

    let sentinel = Sentinel::new(
        Box::new(observer),
        store.clone(),
        tracker,
        dispatcher,
        metrics.clone(),
    )
    .with_interval(config.monitor.interval)
    .with_retention(config.monitor.retention);

    let api = ApiServer::new(
        ApiState {
            store,
            metrics,
            api_key,
            settings_path: PathBuf::from(&config.notifications.settings_path),
            dispatcher: Arc::new(test_dispatcher),
            rate_limiter: RateLimiter::default(),
            primary: NodeInfo {
                name: config.nodes.primary_name().to_string(),
                address: config.nodes.primary.address,
            },
            secondary: NodeInfo {
                name: config.nodes.secondary_name().to_string(),
                address: config.nodes.secondary.address,
            },
            vip: config.vip,
        },
        config.api.listen,
    );

    tokio::select! {
        _ = sentinel.run() => {
            info!("Monitor loop completed");
        }
        result = api.run() => {
            if let Err(e) = result {
                error!(error = %e, "API server error");
                return Err(e).context("API server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    info!("Sentinel stopped");
    Ok(())
}
