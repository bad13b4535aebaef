// Alert manager - decides which fetched alerts become user-facing notifications.
//
// Per alert: severity/category gating, identity resolution, content-change
// detection, per-alert / escalation / global cooldowns, then a shared token
// bucket. State is only mutated for alerts that survive the rate limiter.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use super::hashing::{compute_content_hash, resolve_alert_id};
use super::model::{AlertNotification, AlertSettings, NotificationReason};
use super::rate_limit::{RateLimiterStats, TokenBucketRateLimiter};
use super::state::AlertState;
use super::store::{prune_stale, AlertStateStore, STALE_STATE_MAX_AGE_DAYS};
use crate::core::error::AlertResult;
use crate::core::model::{WeatherAlert, WeatherAlerts};

/// True iff `issued_at` is present and no older than `window` (inclusive).
pub fn is_fresh_at(issued_at: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    issued_at.is_some_and(|issued| now - issued <= window)
}

/// Diagnostics snapshot returned by `AlertManager::get_alert_statistics`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertStatistics {
    pub tracked_alert_count: usize,
    pub notified_alert_count: usize,
    pub total_notifications: u64,
    pub last_global_notification: Option<DateTime<Utc>>,
    pub rate_limiter: RateLimiterStats,
}

/// An alert that passed the cooldown policy and now waits on the rate limiter.
struct Candidate<'a> {
    index: usize,
    alert: &'a WeatherAlert,
    alert_id: String,
    content_hash: String,
    priority: i32,
    reason: NotificationReason,
}

/// Everything guarded by the manager's single lock.
struct ManagerState {
    settings: AlertSettings,
    states: HashMap<String, AlertState>,
    limiter: TokenBucketRateLimiter,
    last_global_notification: Option<DateTime<Utc>>,
}

impl ManagerState {
    fn in_global_cooldown(&self, now: DateTime<Utc>) -> bool {
        self.last_global_notification
            .is_some_and(|last| now - last < self.settings.global_cooldown())
    }

    /// Decide the reason for one alert. `Ok(None)` means "do not notify".
    fn evaluate<'a>(
        &self,
        index: usize,
        alert: &'a WeatherAlert,
        now: DateTime<Utc>,
    ) -> AlertResult<Option<Candidate<'a>>> {
        let settings = &self.settings;
        let severity = alert.severity_level();
        let priority = severity.priority();

        if !settings.severity_enabled(severity) || priority < settings.min_severity_priority {
            debug!("Ignoring {:?}: severity {} filtered", alert.display_title(), severity.label());
            return Ok(None);
        }
        if let Some(category) = alert.category() {
            if settings.is_category_ignored(&category) {
                debug!("Ignoring {:?}: category {:?} muted", alert.display_title(), category);
                return Ok(None);
            }
        }
        if alert.is_expired_at(now) {
            debug!("Ignoring {:?}: already expired", alert.display_title());
            return Ok(None);
        }

        let alert_id = resolve_alert_id(alert)?;
        let content_hash = compute_content_hash(alert);

        let reason = match self.states.get(&alert_id) {
            None => NotificationReason::NewAlert,
            Some(state) => self.reason_for_known(state, alert, &content_hash, priority, now),
        };

        if reason == NotificationReason::None {
            debug!("Suppressing {}: cooldown", alert_id);
            return Ok(None);
        }
        if !reason.bypasses_global_cooldown() && self.in_global_cooldown(now) {
            debug!("Suppressing {} ({}): global cooldown", alert_id, reason);
            return Ok(None);
        }

        Ok(Some(Candidate {
            index,
            alert,
            alert_id,
            content_hash,
            priority,
            reason,
        }))
    }

    fn reason_for_known(
        &self,
        state: &AlertState,
        alert: &WeatherAlert,
        content_hash: &str,
        priority: i32,
        now: DateTime<Utc>,
    ) -> NotificationReason {
        let settings = &self.settings;

        if !state.has_seen_content(content_hash) {
            if priority > state.severity_priority {
                let too_soon = state
                    .last_notified
                    .is_some_and(|last| now - last < settings.escalation_cooldown());
                return if too_soon {
                    NotificationReason::None
                } else {
                    NotificationReason::Escalation
                };
            }
            return NotificationReason::Updated;
        }

        match state.last_notified {
            None => {
                let issued = state.alert_sent_time.or_else(|| alert.issued_at());
                if is_fresh_at(issued, now, settings.freshness_window()) {
                    NotificationReason::FreshAlert
                } else {
                    // Old but the user was never told
                    NotificationReason::Reminder
                }
            }
            Some(last) if now - last < settings.per_alert_cooldown() => NotificationReason::None,
            Some(_) => NotificationReason::Reminder,
        }
    }

    fn record(&mut self, candidate: &Candidate<'_>, now: DateTime<Utc>) {
        let issued = candidate.alert.issued_at();
        let state = self
            .states
            .entry(candidate.alert_id.clone())
            .or_insert_with(|| {
                AlertState::observed(
                    candidate.alert_id.clone(),
                    candidate.content_hash.clone(),
                    candidate.priority,
                    issued,
                    now,
                )
            });
        state.record_notification(&candidate.content_hash, candidate.priority, issued, now);
        self.last_global_notification = Some(now);
    }
}

/// State snapshot awaiting its write. Holding `_order` keeps writes in the
/// same order as the mutations that produced them.
struct PendingSave<'a> {
    states: HashMap<String, AlertState>,
    _order: MutexGuard<'a, ()>,
}

/// Owns alert tracking state, the shared rate limiter and optional persistence.
///
/// All methods take `&self`; one mutex guards settings, state map and limiter
/// together so settings updates and statistics reads can run alongside a cycle.
pub struct AlertManager {
    inner: Mutex<ManagerState>,
    store: Option<AlertStateStore>,
    /// Taken while `inner` is still held, released after the file write.
    save_order: Mutex<()>,
}

impl AlertManager {
    /// Create a manager persisting to `alert_state.json` in `config_dir`.
    pub fn new(config_dir: impl Into<PathBuf>, settings: AlertSettings) -> Self {
        let store = AlertStateStore::new(config_dir);
        let now = Utc::now();
        let mut states = store.load();
        prune_stale(&mut states, now, Duration::days(STALE_STATE_MAX_AGE_DAYS));
        info!("Loaded {} tracked alerts from {:?}", states.len(), store.path());
        Self::from_parts(settings, states, Some(store), now)
    }

    /// Create a manager that keeps state in memory only.
    pub fn in_memory(settings: AlertSettings) -> Self {
        Self::from_parts(settings, HashMap::new(), None, Utc::now())
    }

    fn from_parts(
        settings: AlertSettings,
        states: HashMap<String, AlertState>,
        store: Option<AlertStateStore>,
        now: DateTime<Utc>,
    ) -> Self {
        let last_global_notification = states.values().filter_map(|s| s.last_notified).max();
        let limiter = TokenBucketRateLimiter::new(settings.max_notifications_per_hour, now);
        Self {
            inner: Mutex::new(ManagerState {
                settings,
                states,
                limiter,
                last_global_notification,
            }),
            store,
            save_order: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Select the alerts that merit a notification right now.
    pub fn process_alerts(&self, alerts: &WeatherAlerts) -> Vec<AlertNotification> {
        self.process_alerts_at(alerts, Utc::now())
    }

    /// Same as `process_alerts` with an explicit clock.
    ///
    /// Results are ordered by severity (highest first), then input order.
    pub fn process_alerts_at(
        &self,
        alerts: &WeatherAlerts,
        now: DateTime<Utc>,
    ) -> Vec<AlertNotification> {
        let (notifications, pending) = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            if !inner.settings.notifications_enabled {
                debug!("Notifications disabled; skipping {} alerts", alerts.len());
                return Vec::new();
            }

            let mut candidates = Vec::new();
            for (index, alert) in alerts.iter().enumerate() {
                match inner.evaluate(index, alert, now) {
                    Ok(Some(candidate)) => candidates.push(candidate),
                    Ok(None) => {}
                    Err(e) => warn!("Skipping alert {:?}: {}", alert.display_title(), e),
                }
            }

            // Sort before dedup so the most severe copy of a repeated id wins
            candidates.sort_by_key(|c| (Reverse(c.priority), c.index));
            let mut seen_ids = HashSet::new();
            candidates.retain(|c| {
                let first = seen_ids.insert(c.alert_id.clone());
                if !first {
                    debug!("Duplicate alert id {} in batch", c.alert_id);
                }
                first
            });

            let mut notifications = Vec::with_capacity(candidates.len());
            for candidate in &candidates {
                if !inner.limiter.check_at(now) {
                    info!(
                        "Rate limit reached; deferring {} ({})",
                        candidate.alert_id, candidate.reason
                    );
                    continue;
                }
                inner.record(candidate, now);
                notifications.push(AlertNotification {
                    alert: candidate.alert.clone(),
                    reason: candidate.reason,
                });
            }

            let pending = if notifications.is_empty() {
                None
            } else {
                self.begin_save(&inner.states)
            };
            (notifications, pending)
        };

        self.persist(pending);
        notifications
    }

    /// Snapshot `states` for writing. Must be called with `inner` locked.
    fn begin_save(&self, states: &HashMap<String, AlertState>) -> Option<PendingSave<'_>> {
        self.store.as_ref()?;
        Some(PendingSave {
            _order: self
                .save_order
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            states: states.clone(),
        })
    }

    fn persist(&self, pending: Option<PendingSave<'_>>) {
        let (Some(store), Some(pending)) = (&self.store, pending) else {
            return;
        };
        if let Err(e) = store.save(&pending.states) {
            warn!("Failed to save alert state to {:?}: {}", store.path(), e);
        }
    }

    /// Whether an alert issued at `issued_at` is inside the freshness window.
    pub fn is_alert_fresh(&self, issued_at: Option<DateTime<Utc>>) -> bool {
        let window = self.lock().settings.freshness_window();
        is_fresh_at(issued_at, Utc::now(), window)
    }

    pub fn settings(&self) -> AlertSettings {
        self.lock().settings.clone()
    }

    /// Replace settings. The limiter keeps its fractional fill level.
    pub fn update_settings(&self, settings: AlertSettings) {
        self.update_settings_at(settings, Utc::now());
    }

    pub fn update_settings_at(&self, settings: AlertSettings, now: DateTime<Utc>) {
        let mut inner = self.lock();
        if settings.max_notifications_per_hour != inner.settings.max_notifications_per_hour {
            inner
                .limiter
                .update_capacity(settings.max_notifications_per_hour, now);
        }
        inner.settings = settings;
        info!("Alert settings updated");
    }

    pub fn get_alert_statistics(&self) -> AlertStatistics {
        self.get_alert_statistics_at(Utc::now())
    }

    pub fn get_alert_statistics_at(&self, now: DateTime<Utc>) -> AlertStatistics {
        let mut inner = self.lock();
        let notified_alert_count = inner
            .states
            .values()
            .filter(|s| s.last_notified.is_some())
            .count();
        let total_notifications = inner
            .states
            .values()
            .map(|s| u64::from(s.notification_count))
            .sum();
        AlertStatistics {
            tracked_alert_count: inner.states.len(),
            notified_alert_count,
            total_notifications,
            last_global_notification: inner.last_global_notification,
            rate_limiter: inner.limiter.stats_at(now),
        }
    }

    /// Forget every tracked alert and persist the empty map.
    pub fn clear_state(&self) {
        let pending = {
            let mut inner = self.lock();
            inner.states.clear();
            inner.last_global_notification = None;
            self.begin_save(&inner.states)
        };
        self.persist(pending);
    }

    pub fn tracked_state(&self, alert_id: &str) -> Option<AlertState> {
        self.lock().states.get(alert_id).cloned()
    }

    #[cfg(test)]
    fn insert_state(&self, state: AlertState) {
        self.lock().states.insert(state.alert_id.clone(), state);
    }
}
