use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::core::{
    alerts::AlertManager,
    config::{ConfigManager, SETTINGS_FILE_NAME},
    error::AlertResult,
    notifier::{LogNotifier, NotificationSink, TaskbarIndicator},
    poller::AlertPoller,
    source::JsonFileSource,
};

pub const CONFIG_DIR_ENV: &str = "WEATHER_ALERTS_CONFIG_DIR";

/// How often settings.json is re-read for hot reload.
const SETTINGS_RELOAD_INTERVAL: Duration = Duration::from_secs(30);

pub fn resolve_config_dir() -> PathBuf {
    std::env::var_os(CONFIG_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Headless runner: poll the alert feed until Ctrl-C.
pub fn run() -> AlertResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_dir = resolve_config_dir();
    let config_manager = ConfigManager::new(config_dir.clone());
    let settings = config_manager.load();
    if !config_dir.join(SETTINGS_FILE_NAME).exists() {
        // Write defaults so there is a file to edit
        if let Err(e) = config_manager.save(&settings) {
            warn!("Could not write default settings: {}", e);
        }
    }

    let feed_path = config_manager.feed_path(&settings);
    info!("Watching alert feed {:?}", feed_path);

    let manager = Arc::new(AlertManager::new(&config_dir, settings.alert_settings.clone()));
    let indicator = Arc::new(TaskbarIndicator::register()?);
    let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogNotifier), indicator.clone()];

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let poller = AlertPoller::spawn(
            Arc::clone(&manager),
            Arc::new(JsonFileSource::new(feed_path)),
            sinks,
            Duration::from_secs(settings.refresh_interval_secs),
        );

        let mut reload = tokio::time::interval(SETTINGS_RELOAD_INTERVAL);
        let mut current = settings.alert_settings;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        warn!("Failed to listen for Ctrl-C: {}", e);
                    }
                    break;
                }
                _ = reload.tick() => {
                    // Hot-reload: alert settings only; interval and feed need a restart
                    let latest = config_manager.load().alert_settings;
                    if latest != current {
                        manager.update_settings(latest.clone());
                        current = latest;
                    }
                }
            }
        }

        info!("Shutting down alert poller");
        poller.shutdown().await;

        let stats = manager.get_alert_statistics();
        info!(
            "Tracked {} alerts, {} notifications sent, {:.1}/{} tokens left",
            stats.tracked_alert_count,
            stats.total_notifications,
            stats.rate_limiter.available_tokens,
            stats.rate_limiter.capacity
        );
        info!("Taskbar: {}", indicator.text());
    });

    Ok(())
}
