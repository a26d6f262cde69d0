//! Operational log database: message labels, log entries and worker status.
//!
//! The `thread_status` table doubles as the termination signal: a worker may
//! keep polling only while at least one row is RUNNING. The table is
//! truncated at process start so stale rows from a previous run cannot keep
//! workers alive.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

use trawl_types::{WorkerCounters, WorkerState, WorkerStatus};

use crate::util::{now_text, open_db, open_db_in_memory, parse_timestamp};

/// Severity of a log entry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Error => "ERROR",
        }
    }
}

/// The fixed label vocabulary of `log_entries.message_label`.
pub const MESSAGE_LABELS: &[&str] = &[
    "DEBUG",
    "ERROR",
    "PROCESS_URL",
    "DISALLOWED",
    "MAX_DEPTH_REACHED",
    "PROCESSED_OK",
    "THREAD_STARTED",
    "THREAD_FINISHED",
    "THREAD_ABORTED",
    "THREAD_INTERRUPTED",
    "DOWNLOADED",
];

pub struct LogStore {
    db: Connection,
}

impl LogStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS messages (
            label TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS log_entries (
            id INTEGER PRIMARY KEY,
            type TEXT NOT NULL,
            message_label TEXT REFERENCES messages(label),
            text TEXT,
            thread TEXT,
            timestamp TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS thread_status (
            id INTEGER PRIMARY KEY,
            thread TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            running_time INTEGER,
            parsed INTEGER,
            added INTEGER,
            downloaded INTEGER,
            timestamp TEXT NOT NULL
        );
    ";

    /// Open the log database, seed the message vocabulary and wipe worker
    /// status rows from any previous run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = open_db(path.as_ref())?;
        Self::initialize(db)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = open_db_in_memory()?;
        Self::initialize(db)
    }

    fn initialize(db: Connection) -> Result<Self> {
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create log schema")?;
        for label in MESSAGE_LABELS {
            db.execute(
                "INSERT OR IGNORE INTO messages (label) VALUES (?1)",
                params![label],
            )
            .context("Failed to seed message labels")?;
        }
        db.execute("DELETE FROM thread_status", [])
            .context("Failed to truncate thread status")?;
        Ok(Self { db })
    }

    /// Append a log entry.
    pub fn record(
        &self,
        level: LogLevel,
        label: &str,
        text: Option<&str>,
        worker: &str,
    ) -> Result<()> {
        self.db
            .execute(
                "INSERT INTO log_entries (type, message_label, text, thread, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![level.as_str(), label, text, worker, now_text()],
            )
            .context("Failed to insert log entry")?;
        Ok(())
    }

    /// Upsert one worker's status row.
    pub fn publish_status(
        &self,
        worker: &str,
        state: WorkerState,
        counters: WorkerCounters,
        running_secs: u64,
    ) -> Result<()> {
        self.db
            .execute(
                "INSERT INTO thread_status
                 (thread, status, running_time, parsed, added, downloaded, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(thread) DO UPDATE SET
                     status = excluded.status,
                     running_time = excluded.running_time,
                     parsed = excluded.parsed,
                     added = excluded.added,
                     downloaded = excluded.downloaded,
                     timestamp = excluded.timestamp",
                params![
                    worker,
                    state.as_str(),
                    running_secs as i64,
                    counters.parsed as i64,
                    counters.added as i64,
                    counters.downloaded as i64,
                    now_text(),
                ],
            )
            .context("Failed to publish worker status")?;
        Ok(())
    }

    /// True iff at least one worker row is RUNNING.
    pub fn any_running(&self) -> Result<bool> {
        let n: i64 = self
            .db
            .query_row(
                "SELECT COUNT(*) FROM thread_status WHERE status = ?1",
                params![WorkerState::Running.as_str()],
                |row| row.get(0),
            )
            .context("Failed to count running workers")?;
        Ok(n > 0)
    }

    /// All worker rows, for the end-of-run summary.
    pub fn statuses(&self) -> Result<Vec<WorkerStatus>> {
        let mut stmt = self
            .db
            .prepare(
                "SELECT thread, status, parsed, added, downloaded, running_time, timestamp
                 FROM thread_status ORDER BY thread",
            )
            .context("Failed to prepare status query")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .context("Failed to query worker statuses")?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read worker status rows")?;

        let mut statuses = Vec::with_capacity(rows.len());
        for (worker, status, parsed, added, downloaded, running_time, timestamp) in rows {
            statuses.push(WorkerStatus {
                worker,
                state: WorkerState::parse(&status)
                    .context("Malformed worker state in database")?,
                counters: WorkerCounters {
                    parsed: parsed as u64,
                    added: added as u64,
                    downloaded: downloaded as u64,
                },
                running_secs: running_time as u64,
                timestamp: parse_timestamp(&timestamp)?,
            });
        }
        Ok(statuses)
    }
}
