//! The worker loop: pull an item, fetch it, route by MIME type, then either
//! discard the item (done) or send it back through the retry path.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use encoding_rs::Encoding;
use rand::RngExt;
use url::Url;

use trawl_db::LogLevel;
use trawl_fetch::{FetchOutcome, Fetcher, RobotsCache};
use trawl_types::{DocumentProcessor, LinkParser, PendingItem, WorkerCounters, WorkerState};

use crate::coordinator::LifecycleCoordinator;
use crate::frontier::{Frontier, FrontierError};
use crate::sink::DocumentSink;

/// Charset guesses tried, in order, when the server declares none. The first
/// decode without errors wins.
const CHARSET_GUESSES: &[&str] = &[
    "iso-8859-1",
    "utf-8",
    "windows-1251",
    "windows-1252",
    "iso-8859-15",
    "iso-8859-9",
    "ascii",
];

/// Everything a dispatcher needs to run. Parser, processor and robots cache
/// are per-worker instances; the frontier and coordinator are shared.
pub struct DispatcherSetup {
    pub name: String,
    pub frontier: Arc<Frontier>,
    pub coordinator: Arc<LifecycleCoordinator>,
    pub fetcher: Fetcher,
    pub robots: RobotsCache,
    pub parser: Box<dyn LinkParser + Sync>,
    pub processor: Box<dyn DocumentProcessor + Sync>,
    pub sink: DocumentSink,
    pub max_depth: Option<u32>,
    pub min_relevancy: f64,
    pub wait_secs: RangeInclusive<u64>,
    pub shutdown: Arc<AtomicBool>,
}

/// How the main loop ended, before the terminal status is published.
enum LoopExit {
    Interrupted,
    Failed(anyhow::Error),
}

pub struct Dispatcher {
    setup: DispatcherSetup,
    counters: WorkerCounters,
    started: Instant,
}

impl Dispatcher {
    #[must_use]
    pub fn new(setup: DispatcherSetup) -> Self {
        Self {
            setup,
            counters: WorkerCounters::default(),
            started: Instant::now(),
        }
    }

    /// Run to completion. Returns the terminal state for FINISHED and
    /// INTERRUPTED; an unexpected error publishes ABORTED and propagates.
    pub async fn run(mut self) -> Result<WorkerState> {
        self.started = Instant::now();
        self.record(LogLevel::Info, "THREAD_STARTED", None)?;
        self.publish(WorkerState::Waiting)?;
        // Let the seed page be parsed before the pool starts competing.
        self.wait_a_little().await;
        self.publish(WorkerState::Running)?;

        match self.main_loop().await {
            Ok(()) => {
                self.publish(WorkerState::Finished)?;
                self.record(LogLevel::Info, "THREAD_FINISHED", None)?;
                Ok(WorkerState::Finished)
            }
            Err(LoopExit::Interrupted) => {
                self.publish(WorkerState::Interrupted)?;
                self.record(LogLevel::Info, "THREAD_INTERRUPTED", None)?;
                Ok(WorkerState::Interrupted)
            }
            Err(LoopExit::Failed(err)) => {
                self.publish(WorkerState::Aborted)?;
                self.record(LogLevel::Error, "THREAD_ABORTED", Some(&err.to_string()))?;
                Err(err)
            }
        }
    }

    async fn main_loop(&mut self) -> Result<(), LoopExit> {
        while self.coordinator().any_running().map_err(LoopExit::Failed)? {
            if self.setup.shutdown.load(Ordering::Relaxed) {
                return Err(LoopExit::Interrupted);
            }
            match self.setup.frontier.next() {
                Ok(item) => self.process(item).await.map_err(LoopExit::Failed)?,
                Err(FrontierError::QueueEmpty) => {
                    // Peers may still be adding items; sleep and re-check.
                    self.publish(WorkerState::Waiting).map_err(LoopExit::Failed)?;
                    self.wait_a_little().await;
                }
                Err(err) => return Err(LoopExit::Failed(err.into())),
            }
        }
        Ok(())
    }

    async fn process(&mut self, item: PendingItem) -> Result<()> {
        self.publish(WorkerState::Running)?;
        self.record(LogLevel::Info, "PROCESS_URL", Some(&item.resource.url))?;

        let Ok(url) = Url::parse(&item.resource.url) else {
            // Stored URLs are normalized; a row that no longer parses can
            // never be fetched, so drop it.
            tracing::error!(url = %item.resource.url, "stored URL does not parse, discarding");
            self.setup.frontier.discard(&item)?;
            return Ok(());
        };

        if !self.setup.robots.allowed(&url).await {
            tracing::info!(url = %item.resource.url, "disallowed by robots policy");
            self.record(LogLevel::Info, "DISALLOWED", Some(&item.resource.url))?;
            self.setup.frontier.discard(&item)?;
            return Ok(());
        }

        let outcome = self.setup.fetcher.fetch(&url).await;
        if let Some(code) = outcome.status {
            self.setup.frontier.record_fetch(item.resource.id, code)?;
        }

        let process_ok = match outcome.status {
            Some(200) => self.route(&item, &outcome)?,
            Some(code) => {
                tracing::warn!(url = %item.resource.url, code, "fetch failed");
                false
            }
            None => {
                tracing::warn!(url = %item.resource.url, "unreachable");
                false
            }
        };

        if process_ok {
            self.record(LogLevel::Info, "PROCESSED_OK", Some(&item.resource.url))?;
            self.setup.frontier.discard(&item)?;
            self.counters.parsed += 1;
            self.publish(WorkerState::Running)?;
        } else if self.setup.frontier.discard_or_retry(&item)? {
            tracing::warn!(url = %item.resource.url, "retries exhausted, discarded");
        }
        Ok(())
    }

    /// Route a 200 response by MIME type. Returns whether the item counts as
    /// processed (false sends it down the retry path).
    fn route(&mut self, item: &PendingItem, outcome: &FetchOutcome) -> Result<bool> {
        match outcome.mime.as_deref() {
            Some("text/html") => self.route_html(item, outcome),
            Some("application/pdf") => self.route_pdf(item, outcome),
            other => {
                // Neither harvestable nor parseable. The URL is terminal:
                // retrying a successful fetch of the wrong type buys nothing.
                tracing::debug!(url = %item.resource.url, mime = ?other, "discarded by MIME type");
                Ok(true)
            }
        }
    }

    fn route_html(&mut self, item: &PendingItem, outcome: &FetchOutcome) -> Result<bool> {
        let depth_open = self.setup.max_depth.is_none_or(|max| item.depth < max);
        if !depth_open {
            self.record(LogLevel::Info, "MAX_DEPTH_REACHED", Some(&item.resource.url))?;
            return Ok(true);
        }

        let Some(text) = decode_body(&outcome.body, outcome.charset.as_deref()) else {
            tracing::warn!(url = %item.resource.url, "cannot decode page");
            return Ok(false);
        };

        let page = self.setup.parser.parse(&text);
        let (added, rejected) =
            self.setup
                .frontier
                .add_list(item, page.title.as_deref(), &page.links)?;
        self.counters.added += added;
        tracing::debug!(
            url = %item.resource.url,
            queued = self.setup.frontier.len(),
            added,
            rejected,
            "parsed page"
        );
        Ok(true)
    }

    fn route_pdf(&mut self, item: &PendingItem, outcome: &FetchOutcome) -> Result<bool> {
        match self
            .setup
            .processor
            .process(&outcome.body, "application/pdf")
        {
            Ok(processed) => {
                let accepted = processed.relevancy >= self.setup.min_relevancy;
                let filename = outcome.filename.as_deref().unwrap_or_default();
                let name = self.setup.sink.store(
                    &self.setup.frontier,
                    &item.resource,
                    "application/pdf",
                    filename,
                    &processed,
                    accepted,
                    &outcome.body,
                )?;
                self.counters.downloaded += 1;
                self.publish(WorkerState::Running)?;
                tracing::info!(
                    name = %name,
                    relevancy = processed.relevancy,
                    accepted,
                    "document found"
                );
                self.record(LogLevel::Info, "DOWNLOADED", Some(&name))?;
            }
            Err(err) => {
                // The content was fetched; a processing error is not
                // retryable, so the item still counts as done.
                tracing::warn!(url = %item.resource.url, error = %err, "processing failed");
            }
        }
        Ok(true)
    }

    fn coordinator(&self) -> &LifecycleCoordinator {
        &self.setup.coordinator
    }

    fn publish(&self, state: WorkerState) -> Result<()> {
        self.coordinator()
            .publish(&self.setup.name, state, self.counters, self.started)
    }

    fn record(&self, level: LogLevel, label: &str, text: Option<&str>) -> Result<()> {
        self.coordinator()
            .record(level, label, text, &self.setup.name)
    }

    async fn wait_a_little(&self) {
        let secs = rand::rng().random_range(self.setup.wait_secs.clone());
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }
}

/// Decode an HTML body: the declared charset when present, otherwise the
/// first guess that decodes without errors.
fn decode_body(body: &[u8], declared: Option<&str>) -> Option<String> {
    if let Some(label) = declared {
        let encoding = Encoding::for_label(label.as_bytes())?;
        let (text, _, had_errors) = encoding.decode(body);
        return (!had_errors).then(|| text.into_owned());
    }

    for label in CHARSET_GUESSES {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            let (text, had_errors) = encoding.decode_without_bom_handling(body);
            if !had_errors {
                return Some(text.into_owned());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_charset_decodes() {
        // "café" in ISO-8859-1.
        let body = b"caf\xe9";
        let text = decode_body(body, Some("iso-8859-1")).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn declared_charset_that_fails_is_an_error() {
        // Invalid UTF-8 with a declared utf-8 charset.
        let body = b"\xff\xfe\xff";
        assert_eq!(decode_body(body, Some("utf-8")), None);
    }

    #[test]
    fn unknown_declared_charset_is_an_error() {
        assert_eq!(decode_body(b"hello", Some("klingon-8")), None);
    }

    #[test]
    fn guess_chain_handles_undeclared_latin1() {
        let body = b"caf\xe9";
        let text = decode_body(body, None).unwrap();
        assert_eq!(text, "café");
    }

    #[test]
    fn guess_chain_accepts_plain_ascii() {
        let text = decode_body(b"<html></html>", None).unwrap();
        assert_eq!(text, "<html></html>");
    }
}
