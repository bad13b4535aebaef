// Alert settings and notification output types.
//
// `AlertSettings` is persisted inside settings.json; see config.rs for the
// merge-with-defaults loading step.

use std::collections::BTreeSet;
use std::fmt;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::model::{normalize_category, Severity, WeatherAlert};

/// Notification policy, replaced wholesale via `AlertManager::update_settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub notifications_enabled: bool,
    /// Alerts ranked below this priority are dropped before any other logic.
    pub min_severity_priority: i32,
    pub notify_extreme: bool,
    pub notify_severe: bool,
    pub notify_moderate: bool,
    pub notify_minor: bool,
    pub notify_unknown: bool,
    pub global_cooldown_minutes: i64,
    pub per_alert_cooldown_minutes: i64,
    pub escalation_cooldown_minutes: i64,
    pub freshness_window_minutes: i64,
    pub max_notifications_per_hour: i64,
    pub ignored_categories: BTreeSet<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            notifications_enabled: true,
            min_severity_priority: Severity::Moderate.priority(),
            notify_extreme: true,
            notify_severe: true,
            notify_moderate: true,
            notify_minor: true,
            notify_unknown: true,
            global_cooldown_minutes: 5,
            per_alert_cooldown_minutes: 60,
            escalation_cooldown_minutes: 15,
            freshness_window_minutes: 15,
            max_notifications_per_hour: 10,
            ignored_categories: BTreeSet::new(),
        }
    }
}

impl AlertSettings {
    pub fn severity_enabled(&self, severity: Severity) -> bool {
        match severity {
            Severity::Extreme => self.notify_extreme,
            Severity::Severe => self.notify_severe,
            Severity::Moderate => self.notify_moderate,
            Severity::Minor => self.notify_minor,
            Severity::Unknown => self.notify_unknown,
        }
    }

    pub fn is_category_ignored(&self, category: &str) -> bool {
        self.ignored_categories
            .iter()
            .any(|ignored| normalize_category(ignored) == category)
    }

    pub fn global_cooldown(&self) -> Duration {
        minutes(self.global_cooldown_minutes)
    }

    pub fn per_alert_cooldown(&self) -> Duration {
        minutes(self.per_alert_cooldown_minutes)
    }

    pub fn escalation_cooldown(&self) -> Duration {
        minutes(self.escalation_cooldown_minutes)
    }

    pub fn freshness_window(&self) -> Duration {
        minutes(self.freshness_window_minutes)
    }
}

/// Out-of-range minute counts saturate instead of panicking.
fn minutes(count: i64) -> Duration {
    Duration::try_minutes(count).unwrap_or(if count < 0 { Duration::MIN } else { Duration::MAX })
}

/// Why an alert was selected for notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationReason {
    /// First sighting of this alert id.
    NewAlert,
    /// Seen before but never notified, and issued within the freshness window.
    FreshAlert,
    /// Unchanged alert re-notified after its cooldown, or never notified and stale.
    Reminder,
    /// Content changed and severity went up.
    Escalation,
    /// Content changed without a severity increase.
    Updated,
    None,
}

impl NotificationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewAlert => "new_alert",
            Self::FreshAlert => "fresh_alert",
            Self::Reminder => "reminder",
            Self::Escalation => "escalation",
            Self::Updated => "updated",
            Self::None => "none",
        }
    }

    /// New alerts and escalations are allowed through the global cooldown.
    pub fn bypasses_global_cooldown(self) -> bool {
        matches!(self, Self::NewAlert | Self::Escalation)
    }
}

impl fmt::Display for NotificationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the `process_alerts` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub alert: WeatherAlert,
    pub reason: NotificationReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_take_defaults() {
        let settings: AlertSettings =
            serde_json::from_str(r#"{"max_notifications_per_hour": 3, "legacy_sound": "chime"}"#)
                .unwrap();
        assert_eq!(settings.max_notifications_per_hour, 3);
        assert_eq!(settings.per_alert_cooldown_minutes, 60);
        assert!(settings.notifications_enabled);
    }

    #[test]
    fn test_ignored_categories_are_normalized() {
        let mut settings = AlertSettings::default();
        settings.ignored_categories.insert("Heat  Advisory".to_string());
        assert!(settings.is_category_ignored("heat advisory"));
        assert!(!settings.is_category_ignored("flood watch"));
    }

    #[test]
    fn test_reason_serializes_snake_case() {
        let json = serde_json::to_string(&NotificationReason::FreshAlert).unwrap();
        assert_eq!(json, r#""fresh_alert""#);
        assert_eq!(NotificationReason::NewAlert.to_string(), "new_alert");
        assert!(NotificationReason::Escalation.bypasses_global_cooldown());
        assert!(!NotificationReason::Reminder.bypasses_global_cooldown());
    }
}
