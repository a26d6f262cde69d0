//! Cross-worker lifecycle coordination.
//!
//! Wraps the log store behind its own mutex. Workers publish status
//! heartbeats here and poll `any_running` to decide whether to keep going:
//! a worker publishes RUNNING before checking, so a transiently empty queue
//! never makes the whole pool exit while one worker still holds an item.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::Result;

use trawl_db::{LogLevel, LogStore};
use trawl_types::{WorkerCounters, WorkerState, WorkerStatus};

pub struct LifecycleCoordinator {
    log: Mutex<LogStore>,
}

impl LifecycleCoordinator {
    #[must_use]
    pub fn new(log: LogStore) -> Self {
        Self {
            log: Mutex::new(log),
        }
    }

    fn log(&self) -> MutexGuard<'_, LogStore> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert one worker's status row.
    pub fn publish(
        &self,
        worker: &str,
        state: WorkerState,
        counters: WorkerCounters,
        started: Instant,
    ) -> Result<()> {
        self.log()
            .publish_status(worker, state, counters, started.elapsed().as_secs())
    }

    /// True iff at least one worker is currently RUNNING.
    pub fn any_running(&self) -> Result<bool> {
        self.log().any_running()
    }

    /// Append an operational log entry.
    pub fn record(
        &self,
        level: LogLevel,
        label: &str,
        text: Option<&str>,
        worker: &str,
    ) -> Result<()> {
        self.log().record(level, label, text, worker)
    }

    /// All worker rows, for the end-of-run summary.
    pub fn statuses(&self) -> Result<Vec<WorkerStatus>> {
        self.log().statuses()
    }
}
