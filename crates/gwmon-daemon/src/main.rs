mod config;
mod providers;
mod reports;
mod scheduler;

use anyhow::Result;
use config::DaemonConfig;
use gwmon_alert::{AlertDispatcher, Evaluator, MuteRegistry, Thresholds};
use gwmon_notify::channels::telegram::TelegramChannel;
use gwmon_notify::NotificationChannel;
use gwmon_storage::engine::SqliteRetentionStore;
use gwmon_storage::RetentionStore;
use providers::{EpochProvider, HttpEpochProvider, HttpMetricsProvider, MetricsProvider};
use scheduler::Monitor;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("gwmon=info".parse()?))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/gwmon.toml".to_string());
    let config = DaemonConfig::load(&config_path)?;
    let bot_token = config.bot_token()?;

    tracing::info!(gateway = %config.gateway_url, "gwmon starting");

    let store: Arc<dyn RetentionStore> = Arc::new(SqliteRetentionStore::open(
        &Path::new(&config.data_dir).join("gwmon.db"),
    )?);
    let channel: Arc<dyn NotificationChannel> =
        Arc::new(TelegramChannel::new(&bot_token, &config.telegram.chat_id)?);
    let metrics: Arc<dyn MetricsProvider> = Arc::new(HttpMetricsProvider::new(&config.gateway_url));
    let epochs: Arc<dyn EpochProvider> = Arc::new(HttpEpochProvider::new(config.registry_base()));

    // Thresholds and mute state are rehydrated from the store; windows and
    // epoch state cold-start empty so a restart never replays stale alerts.
    let thresholds = Thresholds::load(store.as_ref());
    let mutes = MuteRegistry::load(store.clone());
    let dispatcher = AlertDispatcher::new(store.clone(), channel.clone(), mutes);
    let evaluator = Evaluator::new();

    let monitor = Arc::new(Monitor::new(
        &config,
        store,
        metrics,
        epochs,
        channel,
        evaluator,
        dispatcher,
        thresholds,
    ));
    let handles = monitor.spawn_all();

    signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received, clearing timers");
    for handle in handles {
        handle.abort();
    }

    Ok(())
}
