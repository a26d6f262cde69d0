//! The frontier: a persistent priority queue of URLs yet to fetch.
//!
//! One process-wide object owning the durable queue plus two in-memory
//! indexes: the ordered `(id, priority)` sequence that defines pop order, and
//! the set of every known URL for cheap dedup. All three live behind a single
//! mutex; every database write issued by a frontier method commits before the
//! lock is released, and the lock is never held across an await point.
//!
//! Pop order: higher priority first, then smaller insertion id; items with no
//! priority form a FIFO tail after every prioritized item.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::anyhow;
use thiserror::Error;
use url::Url;

use trawl_db::{CrawlStore, NewDocument};
use trawl_types::{Document, FoundLink, PendingId, PendingItem, ResourceId};

#[derive(Debug, Error)]
pub enum FrontierError {
    #[error("URL '{url}' not valid; use http or https with a host component")]
    MalformedUrl { url: String },
    #[error("URL '{url}' is outside the base domain of '{referrer}'")]
    NotInBaseDomain { url: String, referrer: String },
    #[error("pending queue is empty")]
    QueueEmpty,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub struct Frontier {
    inner: Mutex<FrontierInner>,
    all_domains: bool,
    retry_cap: u32,
}

struct FrontierInner {
    store: CrawlStore,
    /// Pop order; each pending id appears at most once.
    queue: VecDeque<(PendingId, Option<i64>)>,
    urls: HashSet<String>,
}

impl Frontier {
    /// Wrap an opened store, rebuilding the in-memory indexes from it so a
    /// restarted process resumes where it stopped.
    pub fn open(store: CrawlStore, all_domains: bool, retry_cap: u32) -> Result<Self, FrontierError> {
        let queue = VecDeque::from(store.queue_snapshot()?);
        let urls = store.known_urls()?.into_iter().collect();
        Ok(Self {
            inner: Mutex::new(FrontierInner { store, queue, urls }),
            all_domains,
            retry_cap,
        })
    }

    fn inner(&self) -> MutexGuard<'_, FrontierInner> {
        // A panicking worker must not take the queue down with it.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current cached queue length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner().queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner().queue.is_empty()
    }

    /// Pop the head of the queue and load the full item.
    ///
    /// The database row is deliberately left in place; only `discard` and
    /// `discard_or_retry` delete it, so an item in flight with a worker
    /// survives a crash.
    pub fn next(&self) -> Result<PendingItem, FrontierError> {
        let mut inner = self.inner();
        let (id, _) = *inner.queue.front().ok_or(FrontierError::QueueEmpty)?;
        let item = inner
            .store
            .get_pending(id)?
            .ok_or_else(|| anyhow!("pending row {id} vanished from storage"))?;
        // Pop only after the load succeeded so an error leaves the queue intact.
        inner.queue.pop_front();
        Ok(item)
    }

    /// Admit one URL to the queue.
    ///
    /// The URL is normalized (fragment stripped, resolved against the
    /// referrer, `;jsessionid` segment removed) and validated before any
    /// state changes. Returns the pending item and whether it was newly
    /// queued. Rediscovery of a queued URL raises its priority when the new
    /// hint is higher, and never touches its depth.
    pub fn add(
        &self,
        url: &str,
        title: Option<&str>,
        referrer: Option<&PendingItem>,
        priority: Option<i64>,
    ) -> Result<(PendingItem, bool), FrontierError> {
        let normalized = normalize_url(url, referrer.map(|r| r.resource.url.as_str()))?;
        if !self.all_domains
            && let Some(referrer) = referrer
            && !same_authority(&normalized, &referrer.resource.url)
        {
            return Err(FrontierError::NotInBaseDomain {
                url: normalized.into(),
                referrer: referrer.resource.url.clone(),
            });
        }
        let depth = referrer.map_or(0, |r| r.depth + 1);

        let mut inner = self.inner();
        inner.admit(normalized.as_str(), title, priority, depth)
    }

    /// Apply a parsed page: set the referrer's title, admit every link and
    /// record a link edge for each one that passes validation. Returns
    /// `(added, rejected)` counts.
    pub fn add_list(
        &self,
        referrer: &PendingItem,
        title: Option<&str>,
        links: &[FoundLink],
    ) -> Result<(u64, u64), FrontierError> {
        if let Some(title) = title {
            self.inner().store.set_resource_title(referrer.resource.id, title)?;
        }

        let mut added = 0;
        let mut rejected = 0;
        for link in links {
            match self.add(&link.url, link.text.as_deref(), Some(referrer), link.priority) {
                Ok((item, is_new)) => {
                    self.inner().store.insert_link(
                        link.text.as_deref(),
                        referrer.resource.id,
                        item.resource.id,
                    )?;
                    if is_new {
                        added += 1;
                    }
                }
                Err(FrontierError::MalformedUrl { url }) => {
                    tracing::debug!(%url, "rejected link");
                    rejected += 1;
                }
                Err(FrontierError::NotInBaseDomain { url, .. }) => {
                    tracing::debug!(%url, "rejected link outside base domain");
                    rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        Ok((added, rejected))
    }

    /// Remove a successfully processed item. Terminal.
    pub fn discard(&self, item: &PendingItem) -> Result<(), FrontierError> {
        let mut inner = self.inner();
        inner.queue.retain(|(id, _)| *id != item.id);
        inner.store.delete_pending(item.id)?;
        Ok(())
    }

    /// Retry a failed item, or drop it once its retries are spent.
    ///
    /// Returns true when the item was deleted. Otherwise the retry count is
    /// bumped, the priority halved (when present) so a failing item drifts
    /// toward the back of its band, and the item re-enters the queue.
    pub fn discard_or_retry(&self, item: &PendingItem) -> Result<bool, FrontierError> {
        let mut inner = self.inner();
        if item.retries + 1 >= self.retry_cap {
            inner.queue.retain(|(id, _)| *id != item.id);
            inner.store.delete_pending(item.id)?;
            return Ok(true);
        }
        let priority = item.priority.map(|p| p / 2);
        inner.store.record_retry(item.id, item.retries + 1, priority)?;
        inner.insert_ordered(item.id, priority);
        Ok(false)
    }

    /// Wipe the queue (cache and table). Returns the number of deleted items.
    pub fn clear(&self) -> Result<usize, FrontierError> {
        let mut inner = self.inner();
        inner.queue.clear();
        Ok(inner.store.clear_pending()?)
    }

    /// Record a fetch outcome on the item's resource.
    pub fn record_fetch(&self, resource_id: ResourceId, code: u16) -> Result<(), FrontierError> {
        self.inner().store.record_fetch(resource_id, code)?;
        Ok(())
    }

    /// Create a document row and attach it to its resource.
    pub fn record_document(
        &self,
        resource_id: ResourceId,
        new: &NewDocument<'_>,
    ) -> Result<Document, FrontierError> {
        let inner = self.inner();
        let doc = inner.store.insert_document(new)?;
        inner.store.attach_document(resource_id, doc.id)?;
        Ok(doc)
    }
}

impl FrontierInner {
    fn admit(
        &mut self,
        url: &str,
        title: Option<&str>,
        priority: Option<i64>,
        depth: u32,
    ) -> Result<(PendingItem, bool), FrontierError> {
        if self.urls.contains(url) {
            let resource = self
                .store
                .find_resource_by_url(url)?
                .ok_or_else(|| anyhow!("URL set out of sync with storage: {url}"))?;
            return match self.store.find_pending_by_resource(resource.id)? {
                // Known URL with no queue entry: it was processed before.
                // Queue it again against the existing resource row.
                None => {
                    let item = self.store.insert_pending(&resource, priority, depth)?;
                    self.insert_ordered(item.id, priority);
                    Ok((item, true))
                }
                Some(existing) => {
                    if raises_priority(priority, existing.priority) {
                        self.store.set_pending_priority(existing.id, priority.unwrap_or(0))?;
                        self.insert_ordered(existing.id, priority);
                        Ok((PendingItem { priority, ..existing }, false))
                    } else {
                        Ok((existing, false))
                    }
                }
            };
        }

        let resource = self.store.insert_resource(url, title)?;
        let item = self.store.insert_pending(&resource, priority, depth)?;
        self.insert_ordered(item.id, priority);
        self.urls.insert(url.to_string());
        Ok((item, true))
    }

    /// Insert `(id, priority)` into the ordered sequence: before the first
    /// element whose priority is absent or strictly lower, or at the end. Any
    /// stale entry for the same id is dropped first.
    fn insert_ordered(&mut self, id: PendingId, priority: Option<i64>) {
        self.queue.retain(|(queued, _)| *queued != id);

        let Some(p) = priority else {
            self.queue.push_back((id, None));
            return;
        };
        let slot = self
            .queue
            .iter()
            .position(|(_, queued)| queued.is_none_or(|q| q < p));
        match slot {
            Some(index) => self.queue.insert(index, (id, Some(p))),
            None => self.queue.push_back((id, Some(p))),
        }
    }
}

/// Does `priority` beat `current`? Absent priorities lose to everything.
fn raises_priority(priority: Option<i64>, current: Option<i64>) -> bool {
    match (priority, current) {
        (Some(new), Some(old)) => new > old,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// Normalize a URL: strip the fragment, resolve against the referrer when
/// relative, drop any `;jsessionid` suffix, and require an http(s) scheme
/// with a host.
fn normalize_url(raw: &str, referrer: Option<&str>) -> Result<Url, FrontierError> {
    let malformed = || FrontierError::MalformedUrl {
        url: raw.to_string(),
    };

    let mut parsed = match referrer {
        Some(base) => Url::parse(base)
            .and_then(|base| base.join(raw))
            .map_err(|_| malformed())?,
        None => Url::parse(raw).map_err(|_| malformed())?,
    };
    parsed.set_fragment(None);

    let mut text = parsed.to_string();
    if let Some(pos) = text.find(";jsessionid") {
        text.truncate(pos);
        parsed = Url::parse(&text).map_err(|_| malformed())?;
    }

    let valid_scheme = matches!(parsed.scheme(), "http" | "https");
    if !valid_scheme || parsed.host_str().is_none_or(str::is_empty) {
        return Err(malformed());
    }
    Ok(parsed)
}

/// Do two URLs share scheme-appropriate authority (host and port)?
fn same_authority(url: &Url, other: &str) -> bool {
    let Ok(other) = Url::parse(other) else {
        return false;
    };
    url.host_str() == other.host_str()
        && url.port_or_known_default() == other.port_or_known_default()
}
