use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use pogo_webhooks::{
    channel, forward_lines, load_config, run_ingest, DispatchScheduler, Dispatcher, EntityQueues,
    RayCasting, SubscriberRegistry, WebhookConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pogo_webhooks=info".into()),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("WEBHOOK_CONFIG").ok())
        .unwrap_or_else(|| "webhooks.toml".to_string());

    let mut config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {config_path}"))?;
    config.apply_env_overrides();

    info!(
        path = %config_path,
        subscribers = config.subscribers.len(),
        "webhook dispatcher starting"
    );

    let queues = Arc::new(EntityQueues::new());
    let registry = Arc::new(
        SubscriberRegistry::with_subscribers(config.subscribers.clone())
            .context("Invalid subscriber list")?,
    );
    let scheduler = Arc::new(DispatchScheduler::new(
        queues.clone(),
        registry.clone(),
        Arc::new(RayCasting),
        Dispatcher::new(config.dispatcher_config()),
        config.scheduler_config(),
    ));

    spawn_ingest(&config, queues.clone()).await?;

    if config.dispatch.reload_interval_seconds > 0 {
        tokio::spawn(reload_subscribers(
            config_path.clone(),
            registry.clone(),
            Duration::from_secs(config.dispatch.reload_interval_seconds),
        ));
    }

    let mut handle = scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!(queued = queues.total_len(), "shutdown requested");
    handle.shutdown().await;

    Ok(())
}

#[cfg(feature = "redis")]
async fn spawn_ingest(config: &WebhookConfig, queues: Arc<EntityQueues>) -> Result<()> {
    if let Some(url) = config.ingest.redis_url.as_deref() {
        let source = pogo_webhooks::RedisSource::connect(url, config.ingest.redis_channel.clone())
            .await
            .context("Failed to subscribe to redis")?;
        tokio::spawn(run_ingest(source, queues));
        return Ok(());
    }
    spawn_stdin(queues, config.ingest.channel_capacity);
    Ok(())
}

#[cfg(not(feature = "redis"))]
async fn spawn_ingest(config: &WebhookConfig, queues: Arc<EntityQueues>) -> Result<()> {
    if config.ingest.redis_url.is_some() {
        warn!("redis_url is set but this build lacks the `redis` feature, reading stdin instead");
    }
    spawn_stdin(queues, config.ingest.channel_capacity);
    Ok(())
}

fn spawn_stdin(queues: Arc<EntityQueues>, capacity: usize) {
    info!(capacity, "reading changes from stdin");
    let (tx, source) = channel(capacity);
    tokio::spawn(forward_lines(BufReader::new(tokio::io::stdin()), tx));
    tokio::spawn(run_ingest(source, queues));
}

/// Re-read the configuration file and swap in its subscriber list.
///
/// A file that fails to load leaves the current list in place.
async fn reload_subscribers(path: String, registry: Arc<SubscriberRegistry>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match load_config(&path) {
            Ok(config) => {
                let count = config.subscribers.len();
                match registry.replace(config.subscribers) {
                    Ok(()) => info!(subscribers = count, "reloaded subscribers"),
                    Err(err) => warn!(error = %err, "rejected subscriber reload"),
                }
            }
            Err(err) => warn!(error = %err, "failed to reload configuration, keeping previous subscribers"),
        }
    }
}
