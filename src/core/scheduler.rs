//! Periodic background refresh of the rate cache.

use crate::core::config::AppConfig;
use crate::core::error::ConfigError;
use crate::core::updater::{RatesUpdater, UpdateResult};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    pub running: bool,
    pub update_count: u64,
    pub error_count: u64,
    pub success_rate: f64,
    pub last_update: Option<DateTime<Utc>>,
    pub interval: Duration,
}

/// State shared between the scheduler handle and its background tasks.
#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    update_count: AtomicU64,
    error_count: AtomicU64,
    last_update: Mutex<Option<DateTime<Utc>>>,
}

impl Shared {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn record(&self, failed: bool) -> u64 {
        let count = self.update_count.fetch_add(1, Ordering::SeqCst) + 1;
        if failed {
            self.error_count.fetch_add(1, Ordering::SeqCst);
        }
        if let Ok(mut last) = self.last_update.lock() {
            *last = Some(Utc::now());
        }
        count
    }
}

pub struct RatesScheduler {
    updater: Arc<RatesUpdater>,
    interval: Duration,
    tick: Duration,
    cooldown: Duration,
    stop_timeout: Duration,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RatesScheduler {
    pub fn new(updater: Arc<RatesUpdater>, interval: Duration) -> Self {
        RatesScheduler {
            updater,
            interval,
            tick: DEFAULT_TICK,
            cooldown: DEFAULT_COOLDOWN,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            shared: Arc::new(Shared::default()),
            task: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let updater = RatesUpdater::from_config(config)?;
        Ok(Self::new(Arc::new(updater), config.update_interval()))
    }

    /// Granularity at which the stop flag is checked while waiting.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Pause after an iteration that crashed.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn updater(&self) -> &Arc<RatesUpdater> {
        &self.updater
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .map(|task| task.as_ref().is_some_and(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }

    /// Launches the polling task. Does nothing if it is already running.
    ///
    /// With `run_immediately` one extra update is fired right away on its own
    /// task, so this call never waits on the network. Must be called from
    /// within a tokio runtime.
    pub fn start(&self, run_immediately: bool) {
        let Ok(mut task) = self.task.lock() else {
            error!("Scheduler state is poisoned, not starting");
            return;
        };
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            warn!("Scheduler is already running");
            return;
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        info!(
            "Starting rates scheduler with a {}s interval",
            self.interval.as_secs()
        );
        *task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.updater),
            Arc::clone(&self.shared),
            self.interval,
            self.tick,
            self.cooldown,
        )));

        if run_immediately {
            let updater = Arc::clone(&self.updater);
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                if let Err(e) = run_single_update(updater, Arc::clone(&shared)).await {
                    shared.record(true);
                    error!(error = %e, "Initial rates update crashed");
                }
            });
        }
    }

    /// Signals the polling task to stop and waits for it, up to the stop
    /// timeout. Safe to call when not running.
    pub async fn stop(&self) {
        let handle = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };
        let Some(mut handle) = handle else {
            return;
        };
        if handle.is_finished() {
            return;
        }

        info!("Stopping rates scheduler...");
        self.shared.stop.store(true, Ordering::SeqCst);
        match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(_) => info!("Rates scheduler stopped"),
            Err(_) => {
                warn!(
                    "Scheduler did not stop within {}s, aborting",
                    self.stop_timeout.as_secs()
                );
                handle.abort();
            }
        }
    }

    /// Runs one update directly, outside of the schedule.
    pub async fn run_once(&self) -> Result<UpdateResult, ConfigError> {
        self.updater.update_rates(None).await
    }

    pub fn get_stats(&self) -> SchedulerStats {
        let update_count = self.shared.update_count.load(Ordering::SeqCst);
        let error_count = self.shared.error_count.load(Ordering::SeqCst);
        SchedulerStats {
            running: self.is_running(),
            update_count,
            error_count,
            success_rate: update_count.saturating_sub(error_count) as f64
                / update_count.max(1) as f64,
            last_update: self.shared.last_update.lock().ok().and_then(|last| *last),
            interval: self.interval,
        }
    }
}

async fn run_loop(
    updater: Arc<RatesUpdater>,
    shared: Arc<Shared>,
    interval: Duration,
    tick: Duration,
    cooldown: Duration,
) {
    info!("Scheduler loop started");
    while !shared.stopped() {
        debug!("Waiting {}s until the next update", interval.as_secs());
        if !sleep_unless_stopped(&shared, interval, tick).await {
            break;
        }
        if let Err(e) = run_single_update(Arc::clone(&updater), Arc::clone(&shared)).await {
            shared.record(true);
            error!(error = %e, "Scheduled update crashed, cooling down");
            sleep_unless_stopped(&shared, cooldown, tick).await;
        }
    }
    info!("Scheduler loop finished");
}

/// Sleeps for `duration` in `tick` steps. Returns `false` if the stop flag
/// was raised.
async fn sleep_unless_stopped(shared: &Shared, duration: Duration, tick: Duration) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if shared.stopped() {
            return false;
        }
        let step = remaining.min(tick);
        tokio::time::sleep(step).await;
        remaining -= step;
    }
    !shared.stopped()
}

/// Runs one update on its own task so a panic inside it is contained.
async fn run_single_update(
    updater: Arc<RatesUpdater>,
    shared: Arc<Shared>,
) -> Result<(), JoinError> {
    let outcome = tokio::spawn(async move { updater.update_rates(None).await }).await?;
    match outcome {
        Ok(result) if result.is_success() => {
            let count = shared.record(false);
            info!("Scheduled update #{count} completed with {} rates", result.total_rates);
        }
        Ok(result) => {
            let count = shared.record(true);
            error!(
                errors = result.errors.len(),
                "Scheduled update #{count} finished with errors"
            );
        }
        Err(e) => {
            let count = shared.record(true);
            error!(error = %e, "Scheduled update #{count} failed");
        }
    }
    Ok(())
}
