//! Periodic alert polling.
//!
//! A tokio task ticks on the refresh interval (or on demand), fetches from the
//! source, runs the manager and hands results to every sink. Each cycle runs
//! on the blocking pool; a tick that arrives while the previous cycle is still
//! running is skipped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::alerts::engine::AlertManager;
use super::notifier::NotificationSink;
use super::source::AlertSource;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub enum PollCommand {
    RefreshNow,
    Shutdown,
}

/// Fetch, decide and dispatch once. Returns how many notifications went out.
pub fn run_cycle(
    manager: &AlertManager,
    source: &dyn AlertSource,
    sinks: &[Arc<dyn NotificationSink>],
) -> usize {
    let alerts = match source.fetch() {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!("Alert fetch failed: {}", e);
            return 0;
        }
    };

    let notifications = manager.process_alerts(&alerts);
    debug!(
        "Alert cycle: {} fetched, {} selected",
        alerts.len(),
        notifications.len()
    );
    if !notifications.is_empty() {
        for sink in sinks {
            sink.dispatch(&notifications);
        }
    }
    notifications.len()
}

struct CycleContext {
    manager: Arc<AlertManager>,
    source: Arc<dyn AlertSource>,
    sinks: Vec<Arc<dyn NotificationSink>>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a cycle ends, even by panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Start a cycle unless one is already running.
fn start_cycle(ctx: &Arc<CycleContext>) -> Option<JoinHandle<()>> {
    if ctx.in_flight.swap(true, Ordering::SeqCst) {
        debug!("Previous alert cycle still running; skipping tick");
        return None;
    }
    let ctx = Arc::clone(ctx);
    Some(tokio::task::spawn_blocking(move || {
        let _guard = InFlightGuard(&ctx.in_flight);
        run_cycle(&ctx.manager, ctx.source.as_ref(), &ctx.sinks);
    }))
}

/// Handle to the background polling task.
pub struct AlertPoller {
    tx: mpsc::Sender<PollCommand>,
    handle: JoinHandle<()>,
    ctx: Arc<CycleContext>,
}

impl AlertPoller {
    /// Spawn the polling task on the current tokio runtime. The first cycle runs immediately.
    pub fn spawn(
        manager: Arc<AlertManager>,
        source: Arc<dyn AlertSource>,
        sinks: Vec<Arc<dyn NotificationSink>>,
        interval: Duration,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel(8);
        let ctx = Arc::new(CycleContext {
            manager,
            source,
            sinks,
            in_flight: AtomicBool::new(false),
        });
        let loop_ctx = Arc::clone(&ctx);
        let interval = interval.max(MIN_INTERVAL);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Alert poller started (every {:?})", interval);

            // Consume the immediate first tick and run the first cycle before
            // any queued command is looked at
            ticker.tick().await;
            let mut last_cycle = start_cycle(&loop_ctx);

            loop {
                tokio::select! {
                    biased;
                    _ = ticker.tick() => {}
                    cmd = rx.recv() => match cmd {
                        Some(PollCommand::RefreshNow) => debug!("Manual alert refresh requested"),
                        Some(PollCommand::Shutdown) | None => break,
                    },
                }
                if let Some(cycle) = start_cycle(&loop_ctx) {
                    last_cycle = Some(cycle);
                }
            }

            if let Some(cycle) = last_cycle {
                if let Err(e) = cycle.await {
                    warn!("Alert cycle ended abnormally: {}", e);
                }
            }
            info!("Alert poller stopped");
        });

        Self { tx, handle, ctx }
    }

    /// Request an immediate cycle. Returns false if the poller has stopped.
    pub async fn refresh_now(&self) -> bool {
        self.tx.send(PollCommand::RefreshNow).await.is_ok()
    }

    pub fn is_cycle_running(&self) -> bool {
        self.ctx.in_flight.load(Ordering::SeqCst)
    }

    /// Stop ticking and wait for any in-flight cycle to finish.
    pub async fn shutdown(self) {
        let _ = self.tx.send(PollCommand::Shutdown).await;
        if let Err(e) = self.handle.await {
            warn!("Alert poller task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::alerts::model::{AlertNotification, AlertSettings};
    use crate::core::error::{AlertError, AlertResult};
    use crate::core::model::{WeatherAlert, WeatherAlerts};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Emits a brand-new alert id on every fetch.
    struct CountingSource {
        fetches: AtomicUsize,
    }

    impl AlertSource for CountingSource {
        fn fetch(&self) -> AlertResult<WeatherAlerts> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(WeatherAlerts::new(vec![WeatherAlert {
                id: Some(format!("alert-{n}")),
                event: Some("Winter Storm Warning".to_string()),
                severity: Some("Severe".to_string()),
                ..Default::default()
            }]))
        }
    }

    struct FailingSource;

    impl AlertSource for FailingSource {
        fn fetch(&self) -> AlertResult<WeatherAlerts> {
            Err(AlertError::Source("offline".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<AlertNotification>>>,
    }

    impl RecordingSink {
        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn dispatch(&self, notifications: &[AlertNotification]) {
            self.batches.lock().unwrap().push(notifications.to_vec());
        }
    }

    fn manager() -> Arc<AlertManager> {
        Arc::new(AlertManager::in_memory(AlertSettings::default()))
    }

    async fn wait_for_batches(sink: &RecordingSink, expected: usize) {
        for _ in 0..300 {
            if sink.batch_count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[test]
    fn test_run_cycle_dispatches_only_selected() {
        let manager = manager();
        let sink = Arc::new(RecordingSink::default());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![sink.clone()];
        let source = CountingSource {
            fetches: AtomicUsize::new(0),
        };

        assert_eq!(run_cycle(&manager, &source, &sinks), 1);
        assert_eq!(sink.batch_count(), 1);

        assert_eq!(run_cycle(&manager, &FailingSource, &sinks), 0);
        assert_eq!(sink.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_poller_runs_first_cycle_and_shuts_down() {
        let sink = Arc::new(RecordingSink::default());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![sink.clone()];
        let poller = AlertPoller::spawn(
            manager(),
            Arc::new(CountingSource {
                fetches: AtomicUsize::new(0),
            }),
            sinks,
            Duration::from_secs(3600),
        );

        poller.shutdown().await;
        assert_eq!(sink.batch_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_now_triggers_cycle() {
        let sink = Arc::new(RecordingSink::default());
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![sink.clone()];
        let poller = AlertPoller::spawn(
            manager(),
            Arc::new(CountingSource {
                fetches: AtomicUsize::new(0),
            }),
            sinks,
            Duration::from_secs(3600),
        );

        wait_for_batches(&sink, 1).await;
        while poller.is_cycle_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(poller.refresh_now().await);
        wait_for_batches(&sink, 2).await;

        poller.shutdown().await;
        assert_eq!(sink.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_tick_skipped_while_cycle_in_flight() {
        let ctx = Arc::new(CycleContext {
            manager: manager(),
            source: Arc::new(FailingSource),
            sinks: Vec::new(),
            in_flight: AtomicBool::new(true),
        });
        assert!(start_cycle(&ctx).is_none());

        ctx.in_flight.store(false, Ordering::SeqCst);
        let cycle = start_cycle(&ctx).unwrap();
        cycle.await.unwrap();
        assert!(!ctx.in_flight.load(Ordering::SeqCst));
    }
}
