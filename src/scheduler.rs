use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::collector::Collector;
use crate::config::Config;
use crate::error::AppError;
use crate::types::{RunSummary, Trigger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub runs_completed: u64,
    pub triggers_dropped: u64,
    pub last_run: Option<RunSummary>,
    pub last_error: Option<String>,
}

/// Holds the Running state. Dropping it (pass finished, task cancelled or
/// panicked) always returns the scheduler to Idle.
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Fires collection passes on a fixed cadence or on demand, never more than
/// one at a time. Triggers that arrive mid-pass are dropped, not queued.
pub struct Scheduler {
    collector: Arc<Collector>,
    interval: Duration,
    running: Arc<AtomicBool>,
    runs_completed: AtomicU64,
    triggers_dropped: AtomicU64,
    last_run: Mutex<Option<RunSummary>>,
    last_error: Mutex<Option<String>>,
}

impl Scheduler {
    pub fn new(collector: Arc<Collector>, cfg: &Config) -> Arc<Self> {
        Arc::new(Self {
            collector,
            interval: cfg.collection_interval,
            running: Arc::new(AtomicBool::new(false)),
            runs_completed: AtomicU64::new(0),
            triggers_dropped: AtomicU64::new(0),
            last_run: Mutex::new(None),
            last_error: Mutex::new(None),
        })
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.load(Ordering::Acquire) {
            SchedulerState::Running
        } else {
            SchedulerState::Idle
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            state: self.state(),
            runs_completed: self.runs_completed.load(Ordering::Relaxed),
            triggers_dropped: self.triggers_dropped.load(Ordering::Relaxed),
            last_run: self.last_run.lock().map(|g| g.clone()).unwrap_or(None),
            last_error: self.last_error.lock().map(|g| g.clone()).unwrap_or(None),
        }
    }

    /// Idle → Running. Returns `None` (and counts the drop) if a pass is
    /// already in progress.
    pub fn try_begin(&self, trigger: Trigger) -> Option<RunGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.triggers_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(trigger = %trigger, "collection already running, trigger dropped");
            return None;
        }
        Some(RunGuard { running: Arc::clone(&self.running) })
    }

    /// Runs one pass while holding `guard`. The outcome is recorded before
    /// Running → Idle, so an Idle status always carries the latest pass.
    pub async fn run_pass(&self, guard: RunGuard, trigger: Trigger) -> Option<RunSummary> {
        info!(trigger = %trigger, "collection triggered");
        let result = self.collector.run_collection().await;

        let outcome = match result {
            Ok(summary) => {
                self.runs_completed.fetch_add(1, Ordering::Relaxed);
                if let Ok(mut last) = self.last_run.lock() {
                    *last = Some(summary.clone());
                }
                if let Ok(mut last) = self.last_error.lock() {
                    *last = None;
                }
                Some(summary)
            }
            Err(e) => {
                error!(trigger = %trigger, error = %e, "collection pass aborted");
                if let Ok(mut last) = self.last_error.lock() {
                    *last = Some(e.to_string());
                }
                None
            }
        };
        drop(guard);
        outcome
    }

    /// Begin-and-run in one call. `None` if dropped or the pass aborted.
    pub async fn trigger(&self, trigger: Trigger) -> Option<RunSummary> {
        let guard = self.try_begin(trigger)?;
        self.run_pass(guard, trigger).await
    }

    /// Manual pass for the one-shot command: a dropped or aborted pass is an error.
    pub async fn collect_once(&self) -> crate::error::Result<RunSummary> {
        let Some(guard) = self.try_begin(Trigger::Manual) else {
            return Err(AppError::Collection("a collection pass is already running".to_string()));
        };
        self.run_pass(guard, Trigger::Manual).await.ok_or_else(|| {
            let reason = self.status().last_error.unwrap_or_else(|| "pass aborted".to_string());
            AppError::Collection(reason)
        })
    }

    /// Starts a manual pass in the background. Returns false if one is
    /// already running.
    pub fn spawn_manual(self: &Arc<Self>) -> bool {
        let Some(guard) = self.try_begin(Trigger::Manual) else {
            return false;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_pass(guard, Trigger::Manual).await;
        });
        true
    }

    /// Timer loop. Each tick spawns its pass so a tick landing mid-pass is
    /// observed and dropped rather than queued behind it.
    pub async fn run(self: Arc<Self>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // consume immediate first tick

        info!(interval_secs = self.interval.as_secs(), "scheduler started");

        loop {
            ticker.tick().await;
            if let Some(guard) = self.try_begin(Trigger::Timer) {
                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    this.run_pass(guard, Trigger::Timer).await;
                });
            }
        }
    }
}
