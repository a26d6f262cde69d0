//! Crawl database: resources, links, pending queue rows and documents.
//!
//! The store is a thin typed layer over SQLite. It performs no locking and no
//! queue ordering of its own; the frontier owns both. Every method is a
//! single statement or transaction so that callers holding the frontier lock
//! commit before releasing it.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use trawl_types::{Document, DocumentId, Link, PendingId, PendingItem, Resource, ResourceId};

use crate::util::{now_text, open_db, open_db_in_memory, parse_timestamp};

/// Fields of a document row to be created. Timestamp and uuid are filled in
/// by the store.
#[derive(Debug)]
pub struct NewDocument<'a> {
    pub name: Option<&'a str>,
    pub author: Option<&'a str>,
    pub mime: &'a str,
    pub filename: &'a str,
    pub metadata: &'a serde_json::Map<String, serde_json::Value>,
    pub relevancy: f64,
    pub num_pages: Option<i64>,
    pub accepted: bool,
}

pub struct CrawlStore {
    db: Connection,
}

impl CrawlStore {
    const SCHEMA: &'static str = r"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY,
            name TEXT,
            author TEXT,
            type TEXT NOT NULL,
            filename TEXT NOT NULL,
            meta_data TEXT,
            relevancy REAL NOT NULL DEFAULT 0,
            num_pages INTEGER,
            accepted INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            uuid TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS resources (
            id INTEGER PRIMARY KEY,
            title TEXT,
            url TEXT NOT NULL UNIQUE,
            timestamp TEXT NOT NULL,
            fetched TEXT,
            last_code INTEGER,
            document_id INTEGER REFERENCES documents(id)
        );

        CREATE TABLE IF NOT EXISTS links (
            id INTEGER PRIMARY KEY,
            text TEXT,
            referrer_id INTEGER NOT NULL REFERENCES resources(id),
            target_id INTEGER NOT NULL REFERENCES resources(id)
        );

        CREATE TABLE IF NOT EXISTS pending (
            id INTEGER PRIMARY KEY,
            priority INTEGER,
            resource_id INTEGER NOT NULL UNIQUE REFERENCES resources(id),
            depth INTEGER NOT NULL DEFAULT 0,
            retries INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_links_referrer ON links(referrer_id);
    ";

    const DROP: &'static str = r"
        DROP TABLE IF EXISTS pending;
        DROP TABLE IF EXISTS links;
        DROP TABLE IF EXISTS resources;
        DROP TABLE IF EXISTS documents;
    ";

    /// Open (or create) the crawl database. `reset` drops every table first,
    /// losing all crawl history.
    pub fn open(path: impl AsRef<Path>, reset: bool) -> Result<Self> {
        let db = open_db(path.as_ref())?;
        Self::initialize(db, reset)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = open_db_in_memory()?;
        Self::initialize(db, false)
    }

    fn initialize(db: Connection, reset: bool) -> Result<Self> {
        if reset {
            db.execute_batch(Self::DROP)
                .context("Failed to drop crawl tables")?;
        }
        db.execute_batch(Self::SCHEMA)
            .context("Failed to create crawl schema")?;
        Ok(Self { db })
    }

    // ── resources ───────────────────────────────────────────────────────

    pub fn insert_resource(&self, url: &str, title: Option<&str>) -> Result<Resource> {
        let created = now_text();
        self.db
            .execute(
                "INSERT INTO resources (title, url, timestamp) VALUES (?1, ?2, ?3)",
                params![title, url, created],
            )
            .with_context(|| format!("Failed to insert resource: {url}"))?;
        let id = self.db.last_insert_rowid();

        Ok(Resource {
            id,
            title: title.map(ToString::to_string),
            url: url.to_string(),
            timestamp: parse_timestamp(&created)?,
            fetched: None,
            last_code: None,
            document_id: None,
        })
    }

    pub fn find_resource_by_url(&self, url: &str) -> Result<Option<Resource>> {
        let raw = self
            .db
            .query_row(
                "SELECT id, title, url, timestamp, fetched, last_code, document_id
                 FROM resources WHERE url = ?1",
                params![url],
                raw_resource,
            )
            .optional()
            .context("Failed to query resource by URL")?;
        raw.map(RawResource::into_resource).transpose()
    }

    pub fn get_resource(&self, id: ResourceId) -> Result<Resource> {
        let raw = self
            .db
            .query_row(
                "SELECT id, title, url, timestamp, fetched, last_code, document_id
                 FROM resources WHERE id = ?1",
                params![id],
                raw_resource,
            )
            .with_context(|| format!("Resource {id} not found"))?;
        raw.into_resource()
    }

    pub fn set_resource_title(&self, id: ResourceId, title: &str) -> Result<()> {
        self.db
            .execute(
                "UPDATE resources SET title = ?1 WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update resource title")?;
        Ok(())
    }

    /// Record the outcome of a fetch: last status code and fetch time.
    pub fn record_fetch(&self, id: ResourceId, code: u16) -> Result<()> {
        self.db
            .execute(
                "UPDATE resources SET last_code = ?1, fetched = ?2 WHERE id = ?3",
                params![i64::from(code), now_text(), id],
            )
            .context("Failed to record fetch")?;
        Ok(())
    }

    pub fn attach_document(&self, resource_id: ResourceId, document_id: DocumentId) -> Result<()> {
        self.db
            .execute(
                "UPDATE resources SET document_id = ?1 WHERE id = ?2",
                params![document_id, resource_id],
            )
            .context("Failed to attach document to resource")?;
        Ok(())
    }

    /// All known URLs, for seeding the frontier's dedup set.
    pub fn known_urls(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT url FROM resources")
            .context("Failed to prepare URL query")?;
        let urls = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to query URLs")?
            .collect::<rusqlite::Result<Vec<String>>>()
            .context("Failed to read URL rows")?;
        Ok(urls)
    }

    // ── links ───────────────────────────────────────────────────────────

    pub fn insert_link(
        &self,
        text: Option<&str>,
        referrer_id: ResourceId,
        target_id: ResourceId,
    ) -> Result<Link> {
        self.db
            .execute(
                "INSERT INTO links (text, referrer_id, target_id) VALUES (?1, ?2, ?3)",
                params![text, referrer_id, target_id],
            )
            .context("Failed to insert link")?;
        Ok(Link {
            id: self.db.last_insert_rowid(),
            text: text.map(ToString::to_string),
            referrer_id,
            target_id,
        })
    }

    // ── pending ─────────────────────────────────────────────────────────

    pub fn insert_pending(
        &self,
        resource: &Resource,
        priority: Option<i64>,
        depth: u32,
    ) -> Result<PendingItem> {
        let created = now_text();
        self.db
            .execute(
                "INSERT INTO pending (priority, resource_id, depth, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![priority, resource.id, i64::from(depth), created],
            )
            .with_context(|| format!("Failed to insert pending item for {}", resource.url))?;

        Ok(PendingItem {
            id: self.db.last_insert_rowid(),
            priority,
            resource: resource.clone(),
            depth,
            retries: 0,
            timestamp: parse_timestamp(&created)?,
        })
    }

    pub fn get_pending(&self, id: PendingId) -> Result<Option<PendingItem>> {
        self.query_pending("p.id = ?1", id)
    }

    pub fn find_pending_by_resource(&self, resource_id: ResourceId) -> Result<Option<PendingItem>> {
        self.query_pending("p.resource_id = ?1", resource_id)
    }

    fn query_pending(&self, filter: &str, key: i64) -> Result<Option<PendingItem>> {
        let sql = format!(
            "SELECT p.id, p.priority, p.depth, p.retries, p.timestamp,
                    r.id, r.title, r.url, r.timestamp, r.fetched, r.last_code, r.document_id
             FROM pending p JOIN resources r ON r.id = p.resource_id
             WHERE {filter}"
        );
        let raw = self
            .db
            .query_row(&sql, params![key], raw_pending)
            .optional()
            .context("Failed to query pending item")?;
        raw.map(RawPending::into_item).transpose()
    }

    /// Raise (or set) the priority of a queued item.
    pub fn set_pending_priority(&self, id: PendingId, priority: i64) -> Result<()> {
        self.db
            .execute(
                "UPDATE pending SET priority = ?1 WHERE id = ?2",
                params![priority, id],
            )
            .context("Failed to update pending priority")?;
        Ok(())
    }

    /// Persist a retry: bumped count and decayed priority.
    pub fn record_retry(&self, id: PendingId, retries: u32, priority: Option<i64>) -> Result<()> {
        self.db
            .execute(
                "UPDATE pending SET retries = ?1, priority = ?2 WHERE id = ?3",
                params![i64::from(retries), priority, id],
            )
            .context("Failed to record retry")?;
        Ok(())
    }

    pub fn delete_pending(&self, id: PendingId) -> Result<bool> {
        let n = self
            .db
            .execute("DELETE FROM pending WHERE id = ?1", params![id])
            .context("Failed to delete pending item")?;
        Ok(n > 0)
    }

    /// Wipe the pending table. Returns the number of deleted rows.
    pub fn clear_pending(&self) -> Result<usize> {
        self.db
            .execute("DELETE FROM pending", [])
            .context("Failed to clear pending table")
    }

    /// The queue in pop order: prioritized items first (higher priority, then
    /// insertion id), then the unprioritized FIFO tail.
    pub fn queue_snapshot(&self) -> Result<Vec<(PendingId, Option<i64>)>> {
        let mut stmt = self
            .db
            .prepare(
                "SELECT id, priority FROM pending
                 ORDER BY (priority IS NULL) ASC, priority DESC, id ASC",
            )
            .context("Failed to prepare queue snapshot")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .context("Failed to query queue snapshot")?
            .collect::<rusqlite::Result<Vec<(PendingId, Option<i64>)>>>()
            .context("Failed to read queue snapshot rows")?;
        Ok(rows)
    }

    // ── documents ───────────────────────────────────────────────────────

    pub fn insert_document(&self, new: &NewDocument<'_>) -> Result<Document> {
        let created = now_text();
        let uuid = uuid::Uuid::new_v4().to_string();
        let meta = serde_json::to_string(new.metadata).context("Failed to serialize metadata")?;
        self.db
            .execute(
                "INSERT INTO documents
                 (name, author, type, filename, meta_data, relevancy, num_pages, accepted, timestamp, uuid)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    new.name,
                    new.author,
                    new.mime,
                    new.filename,
                    meta,
                    new.relevancy,
                    new.num_pages,
                    new.accepted,
                    created,
                    uuid,
                ],
            )
            .with_context(|| format!("Failed to insert document: {}", new.filename))?;

        Ok(Document {
            id: self.db.last_insert_rowid(),
            name: new.name.map(ToString::to_string),
            author: new.author.map(ToString::to_string),
            mime: new.mime.to_string(),
            filename: new.filename.to_string(),
            metadata: new.metadata.clone(),
            relevancy: new.relevancy,
            num_pages: new.num_pages,
            accepted: new.accepted,
            timestamp: parse_timestamp(&created)?,
            uuid,
        })
    }

    pub fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
        let raw = self
            .db
            .query_row(
                "SELECT id, name, author, type, filename, meta_data, relevancy,
                        num_pages, accepted, timestamp, uuid
                 FROM documents WHERE id = ?1",
                params![id],
                |row| {
                    Ok(RawDocument {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        author: row.get(2)?,
                        mime: row.get(3)?,
                        filename: row.get(4)?,
                        meta_data: row.get(5)?,
                        relevancy: row.get(6)?,
                        num_pages: row.get(7)?,
                        accepted: row.get(8)?,
                        timestamp: row.get(9)?,
                        uuid: row.get(10)?,
                    })
                },
            )
            .optional()
            .context("Failed to query document")?;
        raw.map(RawDocument::into_document).transpose()
    }

    // ── counts (summaries and tests) ────────────────────────────────────

    pub fn resource_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM resources")
    }

    pub fn pending_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM pending")
    }

    pub fn link_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM links")
    }

    pub fn document_count(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM documents")
    }

    fn count(&self, sql: &str) -> Result<u64> {
        let n: i64 = self
            .db
            .query_row(sql, [], |row| row.get(0))
            .context("Failed to run count query")?;
        Ok(n as u64)
    }
}

// Row mappers return raw column values inside the rusqlite closure; timestamp
// parsing happens afterwards where anyhow context is available.

struct RawResource {
    id: i64,
    title: Option<String>,
    url: String,
    timestamp: String,
    fetched: Option<String>,
    last_code: Option<i64>,
    document_id: Option<i64>,
}

fn raw_resource(row: &Row<'_>) -> rusqlite::Result<RawResource> {
    Ok(RawResource {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        timestamp: row.get(3)?,
        fetched: row.get(4)?,
        last_code: row.get(5)?,
        document_id: row.get(6)?,
    })
}

impl RawResource {
    fn into_resource(self) -> Result<Resource> {
        Ok(Resource {
            id: self.id,
            title: self.title,
            url: self.url,
            timestamp: parse_timestamp(&self.timestamp)?,
            fetched: self.fetched.as_deref().map(parse_timestamp).transpose()?,
            last_code: self.last_code.map(|c| c as u16),
            document_id: self.document_id,
        })
    }
}

struct RawPending {
    id: i64,
    priority: Option<i64>,
    depth: i64,
    retries: i64,
    timestamp: String,
    resource: RawResource,
}

fn raw_pending(row: &Row<'_>) -> rusqlite::Result<RawPending> {
    Ok(RawPending {
        id: row.get(0)?,
        priority: row.get(1)?,
        depth: row.get(2)?,
        retries: row.get(3)?,
        timestamp: row.get(4)?,
        resource: RawResource {
            id: row.get(5)?,
            title: row.get(6)?,
            url: row.get(7)?,
            timestamp: row.get(8)?,
            fetched: row.get(9)?,
            last_code: row.get(10)?,
            document_id: row.get(11)?,
        },
    })
}

impl RawPending {
    fn into_item(self) -> Result<PendingItem> {
        Ok(PendingItem {
            id: self.id,
            priority: self.priority,
            resource: self.resource.into_resource()?,
            depth: self.depth as u32,
            retries: self.retries as u32,
            timestamp: parse_timestamp(&self.timestamp)?,
        })
    }
}

struct RawDocument {
    id: i64,
    name: Option<String>,
    author: Option<String>,
    mime: String,
    filename: String,
    meta_data: Option<String>,
    relevancy: f64,
    num_pages: Option<i64>,
    accepted: bool,
    timestamp: String,
    uuid: String,
}

impl RawDocument {
    fn into_document(self) -> Result<Document> {
        let metadata = match self.meta_data.as_deref() {
            Some(raw) => serde_json::from_str(raw).context("Malformed document metadata")?,
            None => serde_json::Map::new(),
        };
        Ok(Document {
            id: self.id,
            name: self.name,
            author: self.author,
            mime: self.mime,
            filename: self.filename,
            metadata,
            relevancy: self.relevancy,
            num_pages: self.num_pages,
            accepted: self.accepted,
            timestamp: parse_timestamp(&self.timestamp)?,
            uuid: self.uuid,
        })
    }
}
