//! Background matching loop with an explicit lifecycle
//!
//! The loop runs as an owned tokio task. `stop` cancels it through a
//! [`CancellationToken`], which the loop observes between ticks, then waits on
//! the task's [`JoinHandle`] for at most the configured grace period before
//! aborting it.

use crate::config::AppConfig;
use crate::error::{MatchmakingError, Result};
use crate::scheduler::tick::{TickProcessor, TickReport};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Scheduler lifecycle. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    NotStarted,
    Running,
    Draining,
    Stopped,
}

impl SchedulerState {
    /// Numeric form for the state gauge
    pub fn as_gauge(&self) -> i64 {
        match self {
            SchedulerState::NotStarted => 0,
            SchedulerState::Running => 1,
            SchedulerState::Draining => 2,
            SchedulerState::Stopped => 3,
        }
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::NotStarted => write!(f, "not_started"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::Draining => write!(f, "draining"),
            SchedulerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Scheduler timing
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Upper bound on how long `stop` waits for an in-flight tick
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Cumulative counters across all ticks
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub ticks_completed: u64,
    pub matches_formed: u64,
    pub matches_discarded: u64,
    pub users_evicted: u64,
    pub categories_skipped: u64,
    pub notifications_failed: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub last_tick_duration_ms: u64,
}

impl SchedulerStats {
    fn absorb(&mut self, report: &TickReport, at: DateTime<Utc>) {
        self.ticks_completed += 1;
        self.matches_formed += report.matches_committed as u64;
        self.matches_discarded += report.matches_discarded as u64;
        self.users_evicted += report.users_evicted as u64;
        self.categories_skipped += report.categories_skipped as u64;
        self.notifications_failed += report.notifications_failed as u64;
        self.last_tick_at = Some(at);
        self.last_tick_duration_ms = report.duration.as_millis() as u64;
    }
}

/// Owns the periodic matching loop
pub struct Scheduler {
    processor: Arc<TickProcessor>,
    config: SchedulerConfig,
    state: RwLock<SchedulerState>,
    stats: Arc<RwLock<SchedulerStats>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(processor: Arc<TickProcessor>, config: SchedulerConfig) -> Self {
        Self {
            processor,
            config,
            state: RwLock::new(SchedulerState::NotStarted),
            stats: Arc::new(RwLock::new(SchedulerStats::default())),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
            .read()
            .map(|state| *state)
            .unwrap_or(SchedulerState::Stopped)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Whether the loop task exists and has not finished
    pub async fn is_task_alive(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Transition `NotStarted -> Running` and spawn the tick loop
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;

        {
            let mut state = self
                .state
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("scheduler state"))?;
            if *state != SchedulerState::NotStarted {
                return Err(MatchmakingError::InvalidSchedulerState {
                    operation: "start".to_string(),
                    state: state.to_string(),
                }
                .into());
            }
            *state = SchedulerState::Running;
        }

        let handle = tokio::spawn(run_loop(
            self.processor.clone(),
            self.config.tick_interval,
            self.cancel.clone(),
            self.stats.clone(),
        ));
        *task = Some(handle);

        info!(
            "Scheduler started with tick interval {:?}",
            self.config.tick_interval
        );
        Ok(())
    }

    /// Drain and stop the loop. Safe to call repeatedly and concurrently.
    ///
    /// The in-flight tick may finish within the grace period; after that the
    /// task is aborted. No tick starts and no match is committed once draining
    /// has begun. Notifications for matches committed before that are always
    /// awaited, even past the grace period.
    pub async fn stop(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|_| MatchmakingError::lock_poisoned("scheduler state"))?;
            match *state {
                SchedulerState::NotStarted => {
                    *state = SchedulerState::Stopped;
                    info!("Scheduler stopped before it was started");
                    return Ok(());
                }
                SchedulerState::Running => {
                    *state = SchedulerState::Draining;
                    info!("Scheduler draining");
                }
                SchedulerState::Draining | SchedulerState::Stopped => {}
            }
        }

        self.cancel.cancel();

        let mut task = self.task.lock().await;
        if let Some(mut handle) = task.take() {
            match tokio::time::timeout(self.config.shutdown_grace, &mut handle).await {
                Ok(Ok(())) => debug!("Scheduler loop finished"),
                Ok(Err(e)) => warn!("Scheduler loop ended abnormally: {}", e),
                Err(_) => {
                    warn!(
                        "Scheduler loop did not drain within {:?}, aborting",
                        self.config.shutdown_grace
                    );
                    handle.abort();
                    // Cancellation result only
                    let _ = handle.await;
                }
            }
        }

        let pending = self.processor.pending_deliveries();
        if pending > 0 {
            info!("Waiting for {} match notification(s) to finish", pending);
        }
        self.processor.drain_deliveries().await;

        let mut state = self
            .state
            .write()
            .map_err(|_| MatchmakingError::lock_poisoned("scheduler state"))?;
        if *state != SchedulerState::Stopped {
            *state = SchedulerState::Stopped;
            info!("Scheduler stopped");
        }

        Ok(())
    }
}

async fn run_loop(
    processor: Arc<TickProcessor>,
    tick_interval: Duration,
    cancel: CancellationToken,
    stats: Arc<RwLock<SchedulerStats>>,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        let report = processor.run_tick_until(&cancel).await;
        record_tick(&stats, &report);
    }

    debug!("Scheduler loop exited");
}

fn record_tick(stats: &RwLock<SchedulerStats>, report: &TickReport) {
    match stats.write() {
        Ok(mut stats) => stats.absorb(report, current_timestamp()),
        Err(_) => warn!("Failed to acquire scheduler stats lock"),
    }
}
