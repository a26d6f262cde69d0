//! The crawl core: shared persistent frontier, worker pool, politeness layer
//! and the cross-worker lifecycle coordinator.
//!
//! One [`run`] seeds the [`Frontier`] with one URL and spawns N
//! [`Dispatcher`]s. Each dispatcher pulls from the frontier,
//! consults its robots cache, fetches, and either feeds discovered links back
//! into the frontier (HTML), hands the body to its processor and the
//! [`DocumentSink`] (PDF), or discards by MIME type. Workers publish
//! heartbeats to the [`LifecycleCoordinator`] and terminate collectively when
//! no peer is RUNNING.

mod config;
mod coordinator;
mod dispatcher;
mod frontier;
mod orchestrator;
mod sink;

pub use config::CrawlConfig;
pub use coordinator::LifecycleCoordinator;
pub use dispatcher::{Dispatcher, DispatcherSetup};
pub use frontier::{Frontier, FrontierError};
pub use orchestrator::{CrawlSummary, run};
pub use sink::DocumentSink;
