//! Persistent storage for alert tracking state.
//!
//! Stores the `alert_id -> AlertState` map as a single JSON file in the
//! config directory. Loading never fails: a missing or corrupt file yields an
//! empty map, and individual malformed entries are skipped.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde_json::Value;

use super::state::AlertState;
use crate::core::error::AlertResult;

pub const STATE_FILE_NAME: &str = "alert_state.json";

/// Entries idle for longer than this are dropped on load.
pub const STALE_STATE_MAX_AGE_DAYS: i64 = 7;

pub struct AlertStateStore {
    path: PathBuf,
}

impl AlertStateStore {
    /// # Arguments
    /// * `config_dir` - Directory holding `alert_state.json`
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: config_dir.into().join(STATE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load tracked state, falling back to an empty map on any file-level error.
    pub fn load(&self) -> HashMap<String, AlertState> {
        match self.try_load() {
            Ok(states) => states,
            Err(e) => {
                warn!("Failed to load alert state from {:?}: {}", self.path, e);
                HashMap::new()
            }
        }
    }

    /// Strict file read. Malformed entries are still skipped one by one.
    pub fn try_load(&self) -> AlertResult<HashMap<String, AlertState>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        let raw: Value = serde_json::from_str(&content)?;
        let Value::Object(entries) = raw else {
            warn!("Alert state file {:?} is not a JSON object; ignoring it", self.path);
            return Ok(HashMap::new());
        };

        let mut states = HashMap::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_value::<AlertState>(value) {
                Ok(mut state) => {
                    if state.alert_id.is_empty() {
                        state.alert_id = key.clone();
                    }
                    states.insert(key, state);
                }
                Err(e) => warn!("Skipping malformed alert state {:?}: {}", key, e),
            }
        }
        Ok(states)
    }

    pub fn save(&self, states: &HashMap<String, AlertState>) -> AlertResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let sorted: BTreeMap<&String, &AlertState> = states.iter().collect();
        let content = serde_json::to_string_pretty(&sorted)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Drop entries whose last activity is older than `max_age`. Returns how many were removed.
pub fn prune_stale(
    states: &mut HashMap<String, AlertState>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> usize {
    let before = states.len();
    states.retain(|_, state| now - state.last_activity() <= max_age);
    let removed = before - states.len();
    if removed > 0 {
        info!("Pruned {} stale alert states", removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::parse_timestamp;
    use tempfile::tempdir;

    fn make_state(id: &str, first_seen: &str) -> AlertState {
        AlertState::observed(
            id.to_string(),
            format!("hash-{id}"),
            2,
            None,
            parse_timestamp(first_seen).unwrap(),
        )
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = AlertStateStore::new(dir.path());
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = AlertStateStore::new(dir.path().join("nested"));

        let mut states = HashMap::new();
        let mut state = make_state("a", "2025-01-01T00:00:00Z");
        state.record_notification("hash-a", 3, None, parse_timestamp("2025-01-01T00:10:00Z").unwrap());
        states.insert("a".to_string(), state);
        states.insert("b".to_string(), make_state("b", "2025-01-02T00:00:00Z"));

        store.save(&states).unwrap();
        let loaded = AlertStateStore::new(dir.path().join("nested")).load();

        assert_eq!(loaded, states);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_empty() {
        let dir = tempdir().unwrap();
        let store = AlertStateStore::new(dir.path());
        fs::write(store.path(), "{ not json").unwrap();

        assert!(store.try_load().is_err());
        assert!(store.load().is_empty());

        fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_bad_entry_is_skipped() {
        let dir = tempdir().unwrap();
        let store = AlertStateStore::new(dir.path());
        let content = r#"{
            "good": {"content_hash": "abc", "first_seen": "2025-01-01T00:00:00Z"},
            "bad": {"alert_id": "bad", "first_seen": "2025-01-01T00:00:00Z", "severity_priority": "high"}
        }"#;
        fs::write(store.path(), content).unwrap();

        let loaded = store.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["good"].alert_id, "good");
        assert_eq!(loaded["good"].last_notified, None);
    }

    #[test]
    fn test_prune_stale() {
        let now = parse_timestamp("2025-01-10T00:00:00Z").unwrap();
        let mut states = HashMap::new();
        states.insert("old".to_string(), make_state("old", "2025-01-01T00:00:00Z"));
        states.insert("recent".to_string(), make_state("recent", "2025-01-09T00:00:00Z"));

        let mut notified_recently = make_state("revived", "2024-12-01T00:00:00Z");
        notified_recently.last_notified = parse_timestamp("2025-01-08T00:00:00Z");
        states.insert("revived".to_string(), notified_recently);

        let removed = prune_stale(&mut states, now, Duration::days(STALE_STATE_MAX_AGE_DAYS));

        assert_eq!(removed, 1);
        assert!(!states.contains_key("old"));
        assert!(states.contains_key("recent"));
        assert!(states.contains_key("revived"));
    }
}
