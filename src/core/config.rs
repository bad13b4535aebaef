use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::alerts::model::AlertSettings;
use super::error::AlertResult;

/// Current settings schema version. Bump when fields are added or renamed.
pub const SETTINGS_VERSION: u32 = 2;

pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Application settings with alert configuration.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub version: u32,
    /// Seconds between alert fetch cycles
    pub refresh_interval_secs: u64,
    /// Alert feed read by the headless runner; defaults to alerts.json in the config dir
    pub alert_feed_path: Option<PathBuf>,
    pub alert_settings: AlertSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            refresh_interval_secs: 300,
            alert_feed_path: None,
            alert_settings: AlertSettings::default(),
        }
    }
}

/// Overlay `stored` onto `defaults`: keys missing from `stored` keep their
/// default, keys unknown to `defaults` are dropped. Objects merge recursively.
fn merge_with_defaults(defaults: Value, stored: Value) -> Value {
    match (defaults, stored) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                if let Some(slot) = base.get_mut(&key) {
                    let default = slot.take();
                    *slot = merge_with_defaults(default, value);
                }
            }
            Value::Object(base)
        }
        // Optional fields default to null; any stored value replaces them
        (_, stored) => stored,
    }
}

/// Rewrite older schemas in place before merging.
fn migrate(stored: &mut Value) {
    let version = stored.get("version").and_then(Value::as_u64).unwrap_or(1);
    if version >= u64::from(SETTINGS_VERSION) {
        return;
    }
    if let Value::Object(map) = stored {
        // v1 kept the refresh interval in minutes
        if let Some(minutes) = map.remove("refresh_interval_minutes").and_then(|v| v.as_u64()) {
            match minutes.checked_mul(60) {
                Some(secs) => {
                    map.insert("refresh_interval_secs".into(), Value::from(secs));
                }
                None => warn!(
                    "Ignoring out-of-range refresh_interval_minutes {} during migration",
                    minutes
                ),
            }
        }
        map.insert("version".into(), Value::from(SETTINGS_VERSION));
    }
    info!("Migrated settings from version {} to {}", version, SETTINGS_VERSION);
}

pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join(SETTINGS_FILE_NAME),
            config_dir: app_config_dir,
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load settings, merged with defaults. Never fails; problems are logged.
    pub fn load(&self) -> Settings {
        if !self.config_path.exists() {
            return Settings::default();
        }
        match self.try_load() {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings from {:?}: {}", self.config_path, e);
                Settings::default()
            }
        }
    }

    fn try_load(&self) -> AlertResult<Settings> {
        let content = fs::read_to_string(&self.config_path)?;
        let mut stored: Value = serde_json::from_str(&content)?;
        migrate(&mut stored);
        let defaults = serde_json::to_value(Settings::default())?;
        let merged = merge_with_defaults(defaults, stored);
        Ok(serde_json::from_value(merged)?)
    }

    pub fn save(&self, settings: &Settings) -> AlertResult<()> {
        fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)?;
        Ok(())
    }

    /// Feed path from settings, or `alerts.json` next to the settings file.
    pub fn feed_path(&self, settings: &Settings) -> PathBuf {
        settings
            .alert_feed_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("alerts.json"))
    }
}
