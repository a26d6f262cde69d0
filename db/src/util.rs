//! Shared SQLite open preamble and timestamp formatting.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

/// Open a SQLite database at `path`, creating the parent directory if needed
/// and applying the pragmas every trawl database runs with.
pub(crate) fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let db = Connection::open(path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    apply_pragmas(&db)?;
    Ok(db)
}

pub(crate) fn open_db_in_memory() -> Result<Connection> {
    let db = Connection::open_in_memory().context("Failed to open in-memory database")?;
    apply_pragmas(&db)?;
    Ok(db)
}

fn apply_pragmas(db: &Connection) -> Result<()> {
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL; PRAGMA foreign_keys=ON;")
        .context("Failed to set database pragmas")
}

/// Timestamps are stored as RFC 3339 text.
pub(crate) fn now_text() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Malformed timestamp in database: {raw}"))
}
