// Per-alert tracking state, persisted between runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::model::{optional_timestamp, timestamp};

/// Number of recent content hashes remembered per alert.
pub const HASH_HISTORY_CAPACITY: usize = 10;

/// One remembered content version: `(hash, severity_priority, unix_time)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashEntry(pub String, pub i32, pub f64);

impl HashEntry {
    pub fn hash(&self) -> &str {
        &self.0
    }

    pub fn severity_priority(&self) -> i32 {
        self.1
    }

    pub fn unix_time(&self) -> f64 {
        self.2
    }
}

/// Fixed-capacity ring of recent content hashes.
///
/// Once full, each push overwrites the oldest slot. Iteration and
/// serialization are always oldest-first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashHistory {
    slots: Vec<HashEntry>,
    /// Index of the oldest entry once the ring is full; zero until then.
    head: usize,
}

impl HashHistory {
    pub fn new() -> Self {
        Self {
            slots: Vec::with_capacity(HASH_HISTORY_CAPACITY),
            head: 0,
        }
    }

    pub fn push(&mut self, entry: HashEntry) {
        if self.slots.len() < HASH_HISTORY_CAPACITY {
            self.slots.push(entry);
        } else {
            self.slots[self.head] = entry;
            self.head = (self.head + 1) % HASH_HISTORY_CAPACITY;
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HashEntry> {
        self.slots[self.head..].iter().chain(self.slots[..self.head].iter())
    }

    pub fn latest(&self) -> Option<&HashEntry> {
        self.iter().last()
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.slots.iter().any(|entry| entry.hash() == hash)
    }
}

impl Serialize for HashHistory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for HashHistory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<HashEntry>::deserialize(deserializer)?;
        let skip = entries.len().saturating_sub(HASH_HISTORY_CAPACITY);
        let mut history = Self::new();
        for entry in entries.into_iter().skip(skip) {
            history.push(entry);
        }
        Ok(history)
    }
}

/// Tracking record for one alert identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    #[serde(default)]
    pub alert_id: String,
    #[serde(default)]
    pub content_hash: String,
    #[serde(default = "Utc::now", with = "timestamp")]
    pub first_seen: DateTime<Utc>,
    #[serde(default, with = "optional_timestamp")]
    pub last_notified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notification_count: u32,
    #[serde(default)]
    pub severity_priority: i32,
    /// The alert's own `sent`/`effective` time, used for freshness.
    #[serde(default, with = "optional_timestamp")]
    pub alert_sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash_history: HashHistory,
}

impl AlertState {
    /// State for an alert that has been observed but not yet notified.
    pub fn observed(
        alert_id: String,
        content_hash: String,
        severity_priority: i32,
        alert_sent_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            alert_id,
            content_hash,
            first_seen: now,
            last_notified: None,
            notification_count: 0,
            severity_priority,
            alert_sent_time,
            hash_history: HashHistory::new(),
        }
    }

    /// True if this exact content was the current version or is still in history.
    pub fn has_seen_content(&self, hash: &str) -> bool {
        self.content_hash == hash || self.hash_history.contains_hash(hash)
    }

    /// Apply a delivered notification for `hash` at `now`.
    pub fn record_notification(
        &mut self,
        hash: &str,
        severity_priority: i32,
        alert_sent_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) {
        if !self.hash_history.contains_hash(hash) {
            self.hash_history.push(HashEntry(
                hash.to_string(),
                severity_priority,
                now.timestamp_millis() as f64 / 1000.0,
            ));
        }
        self.content_hash = hash.to_string();
        self.severity_priority = severity_priority;
        self.last_notified = Some(now);
        self.notification_count = self.notification_count.saturating_add(1);
        if alert_sent_time.is_some() {
            self.alert_sent_time = alert_sent_time;
        }
    }

    /// Most recent time anything happened to this alert.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_notified.unwrap_or(self.first_seen).max(self.first_seen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::parse_timestamp;

    fn entry(n: usize) -> HashEntry {
        HashEntry(format!("hash-{n}"), 2, n as f64)
    }

    #[test]
    fn test_history_is_bounded_and_ordered() {
        let mut history = HashHistory::new();
        for n in 0..HASH_HISTORY_CAPACITY + 3 {
            history.push(entry(n));
        }

        assert_eq!(history.len(), HASH_HISTORY_CAPACITY);
        assert!(!history.contains_hash("hash-0"));
        assert!(!history.contains_hash("hash-2"));
        assert!(history.contains_hash("hash-3"));

        let order: Vec<_> = history.iter().map(|e| e.hash().to_string()).collect();
        assert_eq!(order.first().map(String::as_str), Some("hash-3"));
        assert_eq!(history.latest().map(HashEntry::hash), Some("hash-12"));
    }

    #[test]
    fn test_record_notification_updates_state() {
        let now = parse_timestamp("2025-04-01T10:00:00Z").unwrap();
        let mut state = AlertState::observed("a".into(), "h1".into(), 2, None, now);
        assert!(state.has_seen_content("h1"));

        state.record_notification("h2", 3, parse_timestamp("2025-04-01T09:55:00Z"), now);

        assert_eq!(state.content_hash, "h2");
        assert_eq!(state.severity_priority, 3);
        assert_eq!(state.last_notified, Some(now));
        assert_eq!(state.notification_count, 1);
        assert!(state.alert_sent_time.is_some());
        assert_eq!(state.hash_history.len(), 1);

        // Same content again does not duplicate the history entry
        state.record_notification("h2", 3, None, now);
        assert_eq!(state.hash_history.len(), 1);
        assert_eq!(state.notification_count, 2);
        assert!(state.alert_sent_time.is_some());
    }

    #[test]
    fn test_state_round_trip_preserves_history() {
        let first_seen = parse_timestamp("2025-04-01T10:00:00.250Z").unwrap();
        let notified = parse_timestamp("2025-04-01T10:05:00Z").unwrap();
        let mut state = AlertState::observed(
            "NWS-7".into(),
            "h1".into(),
            2,
            parse_timestamp("2025-04-01T09:58:00Z"),
            first_seen,
        );
        state.record_notification("h1", 2, None, notified);
        state.record_notification("h2", 4, None, notified);

        let json = serde_json::to_string(&state).unwrap();
        let restored: AlertState = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, state);
        assert_eq!(restored.first_seen, first_seen);
        let hashes: Vec<_> = restored.hash_history.iter().map(HashEntry::hash).collect();
        assert_eq!(hashes, vec!["h1", "h2"]);
    }

    #[test]
    fn test_legacy_entry_loads_with_defaults() {
        let json = r#"{
            "alert_id": "old",
            "content_hash": "abc",
            "first_seen": "2024-12-01T08:00:00",
            "last_notified": null,
            "retired_field": true,
            "hash_history": [["abc", 2, 1733040000], ["def", 3, 1733040100.5]]
        }"#;
        let state: AlertState = serde_json::from_str(json).unwrap();

        assert_eq!(state.alert_sent_time, None);
        assert_eq!(state.notification_count, 0);
        assert_eq!(state.first_seen, parse_timestamp("2024-12-01T08:00:00Z").unwrap());
        assert_eq!(state.hash_history.len(), 2);
        assert_eq!(state.hash_history.latest().map(HashEntry::unix_time), Some(1_733_040_100.5));
    }

    #[test]
    fn test_oversized_history_keeps_newest() {
        let entries: Vec<_> = (0..15).map(entry).collect();
        let json = serde_json::to_string(&entries).unwrap();
        let history: HashHistory = serde_json::from_str(&json).unwrap();

        assert_eq!(history.len(), HASH_HISTORY_CAPACITY);
        assert!(history.contains_hash("hash-5"));
        assert!(!history.contains_hash("hash-4"));
    }
}
