//! Bootstraps the frontier and coordinator, spawns the worker pool and waits
//! for collective termination.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::task::JoinSet;

use trawl_db::{CrawlStore, LogStore};
use trawl_extract::{make_parser, make_processor};
use trawl_fetch::{Fetcher, RobotsCache};
use trawl_types::{WorkerCounters, WorkerState, WorkerStatus};

use crate::config::CrawlConfig;
use crate::coordinator::LifecycleCoordinator;
use crate::dispatcher::{Dispatcher, DispatcherSetup};
use crate::frontier::Frontier;
use crate::sink::DocumentSink;

/// End-of-run accounting.
#[derive(Debug)]
pub struct CrawlSummary {
    pub statuses: Vec<WorkerStatus>,
    pub totals: WorkerCounters,
    pub elapsed: Duration,
    /// True when any worker ended INTERRUPTED.
    pub interrupted: bool,
}

/// Run one crawl to completion.
///
/// Opens both databases, optionally clears and seeds the queue, spawns the
/// configured number of dispatchers and joins them all. The first worker
/// error is propagated after every worker has ended.
pub async fn run(config: CrawlConfig) -> Result<CrawlSummary> {
    let started = Instant::now();

    let coordinator = Arc::new(LifecycleCoordinator::new(LogStore::open(&config.log_db)?));
    let store = CrawlStore::open(&config.crawl_db, config.reset)?;
    if config.reset {
        tracing::info!("database wiped");
    }
    let frontier = Arc::new(Frontier::open(
        store,
        config.all_domains,
        config.retry_cap,
    )?);

    if let Some(seed) = &config.seed {
        if !config.preserve_queue {
            let deleted = frontier.clear()?;
            tracing::info!(deleted, "pending queue cleared");
        }
        let (item, is_new) = frontier.add(seed, None, None, None)?;
        if is_new {
            tracing::info!(url = %item.resource.url, "seed added to the queue");
        } else {
            tracing::info!(url = %item.resource.url, "seed already on the queue");
        }
    }
    tracing::info!(queued = frontier.len(), workers = config.workers, "starting crawl");

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping workers");
                shutdown.store(true, Ordering::Relaxed);
            }
        });
    }

    let fetcher = Fetcher::new();
    let mut workers = JoinSet::new();
    for index in 0..config.workers {
        let dispatcher = Dispatcher::new(DispatcherSetup {
            name: index.to_string(),
            frontier: Arc::clone(&frontier),
            coordinator: Arc::clone(&coordinator),
            fetcher: fetcher.clone(),
            robots: RobotsCache::new(fetcher.client()),
            parser: make_parser(&config.parser)?,
            processor: make_processor(&config.processor, &config.keywords)?,
            sink: DocumentSink::new(config.accepted_dir.clone(), config.rejected_dir.clone()),
            max_depth: config.max_depth,
            min_relevancy: config.min_relevancy,
            wait_secs: config.wait_secs.clone(),
            shutdown: Arc::clone(&shutdown),
        });
        workers.spawn(dispatcher.run());
    }

    let mut failure: Option<anyhow::Error> = None;
    let mut interrupted = false;
    while let Some(joined) = workers.join_next().await {
        match joined.context("worker task panicked")? {
            Ok(WorkerState::Interrupted) => interrupted = true,
            Ok(_) => {}
            Err(err) => {
                tracing::error!(error = %err, "worker aborted");
                failure.get_or_insert(err);
            }
        }
    }

    let statuses = coordinator.statuses()?;
    let totals = statuses
        .iter()
        .fold(WorkerCounters::default(), |mut acc, status| {
            acc.parsed += status.counters.parsed;
            acc.added += status.counters.added;
            acc.downloaded += status.counters.downloaded;
            acc
        });
    let elapsed = started.elapsed();
    for status in &statuses {
        tracing::info!(
            worker = %status.worker,
            state = %status.state,
            parsed = status.counters.parsed,
            added = status.counters.added,
            downloaded = status.counters.downloaded,
            "worker finished"
        );
    }
    tracing::info!(
        parsed = totals.parsed,
        added = totals.added,
        downloaded = totals.downloaded,
        elapsed_secs = elapsed.as_secs(),
        "crawl complete"
    );

    if let Some(err) = failure {
        return Err(err);
    }
    Ok(CrawlSummary {
        statuses,
        totals,
        elapsed,
        interrupted,
    })
}
