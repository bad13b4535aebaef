//! Consumers of `process_alerts` output.
//!
//! Toasts and sounds are rendered by the desktop shell; this module only
//! defines the sink seam, a logging sink, and the taskbar indicator state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use lazy_static::lazy_static;
use log::info;

use super::alerts::model::AlertNotification;
use super::error::{AlertError, AlertResult};

pub trait NotificationSink: Send + Sync {
    fn dispatch(&self, notifications: &[AlertNotification]);
}

/// Writes each notification to the log.
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn dispatch(&self, notifications: &[AlertNotification]) {
        for notification in notifications {
            let alert = &notification.alert;
            info!(
                "[{}] {} ({})",
                notification.reason,
                alert.display_title(),
                alert.severity_level().label()
            );
        }
    }
}

static INDICATOR_COUNTER: AtomicU64 = AtomicU64::new(0);

lazy_static! {
    static ref REGISTERED_INDICATOR: Mutex<Option<u64>> = Mutex::new(None);
}

/// Windows truncates tray tooltips past this many characters.
const TOOLTIP_MAX_CHARS: usize = 127;

pub const IDLE_TEXT: &str = "No new weather alerts";

/// Taskbar tooltip state. At most one instance may be registered at a time.
pub struct TaskbarIndicator {
    id: u64,
    text: Mutex<String>,
}

impl TaskbarIndicator {
    /// Register the process-wide indicator.
    ///
    /// Fails with `IndicatorAlreadyRegistered` while another instance is alive.
    pub fn register() -> AlertResult<Self> {
        let mut slot = REGISTERED_INDICATOR
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = *slot {
            return Err(AlertError::IndicatorAlreadyRegistered(existing));
        }
        let id = INDICATOR_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
        *slot = Some(id);
        Ok(Self {
            id,
            text: Mutex::new(IDLE_TEXT.to_string()),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn text(&self) -> String {
        self.text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn format_text(notifications: &[AlertNotification]) -> String {
        let text = match notifications {
            [] => IDLE_TEXT.to_string(),
            [only] => format!("{} ({})", only.alert.display_title(), only.reason),
            [first, rest @ ..] => format!(
                "{} weather alerts: {} and {} more",
                notifications.len(),
                first.alert.display_title(),
                rest.len()
            ),
        };
        text.chars().take(TOOLTIP_MAX_CHARS).collect()
    }
}

impl NotificationSink for TaskbarIndicator {
    fn dispatch(&self, notifications: &[AlertNotification]) {
        let text = Self::format_text(notifications);
        *self.text.lock().unwrap_or_else(PoisonError::into_inner) = text;
    }
}

impl Drop for TaskbarIndicator {
    fn drop(&mut self) {
        let mut slot = REGISTERED_INDICATOR
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *slot == Some(self.id) {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::NotificationReason;
    use crate::core::model::WeatherAlert;

    fn notification(headline: &str, reason: NotificationReason) -> AlertNotification {
        AlertNotification {
            alert: WeatherAlert {
                headline: Some(headline.to_string()),
                ..Default::default()
            },
            reason,
        }
    }

    // Registration is process-global, so the whole lifecycle lives in one test
    #[test]
    fn test_indicator_registration_lifecycle() {
        let first = TaskbarIndicator::register().unwrap();
        let second = TaskbarIndicator::register();
        assert!(matches!(
            second,
            Err(AlertError::IndicatorAlreadyRegistered(id)) if id == first.id()
        ));

        first.dispatch(&[notification("Tornado Warning", NotificationReason::NewAlert)]);
        assert_eq!(first.text(), "Tornado Warning (new_alert)");

        drop(first);
        let third = TaskbarIndicator::register().unwrap();
        assert_eq!(third.text(), IDLE_TEXT);
    }

    #[test]
    fn test_format_text() {
        assert_eq!(TaskbarIndicator::format_text(&[]), IDLE_TEXT);

        let many = vec![
            notification("Flood Warning", NotificationReason::Escalation),
            notification("Wind Advisory", NotificationReason::Reminder),
            notification("Heat Advisory", NotificationReason::Updated),
        ];
        assert_eq!(
            TaskbarIndicator::format_text(&many),
            "3 weather alerts: Flood Warning and 2 more"
        );

        let long = notification(&"x".repeat(300), NotificationReason::NewAlert);
        assert_eq!(TaskbarIndicator::format_text(&[long]).chars().count(), TOOLTIP_MAX_CHARS);
    }
}
