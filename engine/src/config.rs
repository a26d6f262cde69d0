//! Resolved run configuration.

use std::ops::RangeInclusive;
use std::path::PathBuf;

/// Settings for one crawl run, assembled by the CLI (or tests) before the
/// orchestrator starts.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Seed URL. When present the pending queue is cleared first unless
    /// `preserve_queue` is set.
    pub seed: Option<String>,
    /// Drop and recreate the crawl tables before starting.
    pub reset: bool,
    /// Keep the existing pending queue even when a seed is given.
    pub preserve_queue: bool,
    /// Enqueue links to any domain, not just the referrer's.
    pub all_domains: bool,
    pub workers: usize,
    /// Failed fetches per item before it is dropped from the queue.
    pub retry_cap: u32,
    /// Maximum link depth to parse; `None` removes the limit.
    pub max_depth: Option<u32>,
    /// Documents scoring below this go to the rejected folder (or nowhere).
    pub min_relevancy: f64,
    pub keywords: Vec<String>,
    pub accepted_dir: PathBuf,
    pub rejected_dir: Option<PathBuf>,
    /// Registry name of the HTML parser.
    pub parser: String,
    /// Registry name of the document processor.
    pub processor: String,
    pub crawl_db: PathBuf,
    pub log_db: PathBuf,
    /// Seconds a worker sleeps at startup and on an empty queue; the actual
    /// wait is drawn uniformly from this range. Tests narrow it.
    pub wait_secs: RangeInclusive<u64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            seed: None,
            reset: false,
            preserve_queue: false,
            all_domains: false,
            workers: 10,
            retry_cap: 3,
            max_depth: Some(5),
            min_relevancy: 1.0,
            keywords: Vec::new(),
            accepted_dir: PathBuf::from("files"),
            rejected_dir: None,
            parser: "simple".to_string(),
            processor: "keyword".to_string(),
            crawl_db: PathBuf::from("crawl.sqlite"),
            log_db: PathBuf::from("log.sqlite"),
            wait_secs: 3..=7,
        }
    }
}
