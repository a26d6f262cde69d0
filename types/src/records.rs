//! Records persisted by the crawl and log databases.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type ResourceId = i64;
pub type PendingId = i64;
pub type DocumentId = i64;

/// A URL the crawler knows about. Created at most once per canonical URL;
/// the URL is immutable after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub title: Option<String>,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    /// When the resource was last fetched, if ever.
    pub fetched: Option<DateTime<Utc>>,
    /// HTTP status of the last fetch, if any.
    pub last_code: Option<u16>,
    pub document_id: Option<DocumentId>,
}

/// A directed edge between two resources, carrying the anchor text observed
/// at discovery time. Repeated (referrer, target) pairs are kept as distinct
/// rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: i64,
    pub text: Option<String>,
    pub referrer_id: ResourceId,
    pub target_id: ResourceId,
}

/// A work ticket for one resource awaiting fetch.
///
/// At most one pending item exists per resource at any moment. `priority` is
/// a hint: higher pops first, `None` sorts after every prioritized item.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingItem {
    pub id: PendingId,
    pub priority: Option<i64>,
    pub resource: Resource,
    /// Link hops from the seed; 0 for the seed itself.
    pub depth: u32,
    pub retries: u32,
    pub timestamp: DateTime<Utc>,
}

/// A document persisted to disk (or deliberately not written, for rejected
/// documents with no rejected folder). Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub name: Option<String>,
    pub author: Option<String>,
    pub mime: String,
    pub filename: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub relevancy: f64,
    pub num_pages: Option<i64>,
    pub accepted: bool,
    pub timestamp: DateTime<Utc>,
    pub uuid: String,
}

/// Lifecycle state of one dispatcher worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Waiting,
    Running,
    Interrupted,
    Aborted,
    Finished,
}

const WORKER_STATE_VALUES: &[&str] =
    &["WAITING", "RUNNING", "INTERRUPTED", "ABORTED", "FINISHED"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid worker state '{raw}'; expected one of: {WORKER_STATE_VALUES:?}")]
pub struct WorkerStateParseError {
    raw: String,
}

impl WorkerState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            WorkerState::Waiting => "WAITING",
            WorkerState::Running => "RUNNING",
            WorkerState::Interrupted => "INTERRUPTED",
            WorkerState::Aborted => "ABORTED",
            WorkerState::Finished => "FINISHED",
        }
    }

    /// True for states a worker can still leave.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, WorkerState::Waiting | WorkerState::Running)
    }

    pub fn parse(raw: &str) -> Result<Self, WorkerStateParseError> {
        match raw {
            "WAITING" => Ok(WorkerState::Waiting),
            "RUNNING" => Ok(WorkerState::Running),
            "INTERRUPTED" => Ok(WorkerState::Interrupted),
            "ABORTED" => Ok(WorkerState::Aborted),
            "FINISHED" => Ok(WorkerState::Finished),
            _ => Err(WorkerStateParseError {
                raw: raw.to_string(),
            }),
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-worker progress counters published with every heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerCounters {
    /// Pages successfully processed (HTML parsed or terminal states).
    pub parsed: u64,
    /// Resources this worker appended to the frontier.
    pub added: u64,
    /// Documents handed to the sink.
    pub downloaded: u64,
}

/// One worker's row in the status table.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerStatus {
    pub worker: String,
    pub state: WorkerState,
    pub counters: WorkerCounters,
    pub running_secs: u64,
    pub timestamp: DateTime<Utc>,
}
