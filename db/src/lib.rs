//! SQLite persistence for trawl.
//!
//! Two databases: the crawl database (`resources`, `links`, `pending`,
//! `documents`) holds everything the frontier needs to survive a restart; the
//! log database (`messages`, `log_entries`, `thread_status`) holds
//! operational telemetry and the per-worker status rows that drive collective
//! termination.
//!
//! Neither store is internally synchronized. The frontier serializes access
//! to the crawl store under its own mutex; the coordinator does the same for
//! the log store.

mod crawl_store;
mod log_store;
mod util;

pub use crawl_store::{CrawlStore, NewDocument};
pub use log_store::{LogLevel, LogStore};
