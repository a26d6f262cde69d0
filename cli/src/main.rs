//! trawl CLI - argument parsing, logging bootstrap and exit-code mapping.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use trawl_engine::CrawlConfig;

#[derive(Parser, Debug)]
#[command(
    name = "trawl",
    version,
    about = "Multi-worker web crawler that harvests PDF documents and scores them against a keyword list"
)]
struct Args {
    /// Seed URL; replaces the pending queue unless --preserve-queue is given
    seed: Option<String>,

    /// Reset the database (crawl data will be LOST)
    #[arg(short, long)]
    reset: bool,

    /// Don't remove the pending queue when a seed URL is provided
    #[arg(short, long)]
    preserve_queue: bool,

    /// Parser used on fetched HTML content
    #[arg(long, value_name = "CLASS", default_value = "simple")]
    parser: String,

    /// Processor used on fetched documents
    #[arg(long, value_name = "CLASS", default_value = "keyword")]
    processor: String,

    /// Add resources from any domain (default is the referrer's domain only)
    #[arg(short, long)]
    all_domains: bool,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 10)]
    threads: usize,

    /// Failed fetches per URL before it is dropped from the queue
    #[arg(short = 'R', long, default_value_t = 3)]
    retries: u32,

    /// Comma-separated keywords for relevancy scoring
    #[arg(long, value_name = "CSV", value_delimiter = ',')]
    keywords: Vec<String>,

    /// Folder for accepted documents
    #[arg(long, value_name = "PATH", default_value = "files")]
    download_folder: PathBuf,

    /// Folder for rejected documents (omit to discard them)
    #[arg(long, value_name = "PATH")]
    rejected_folder: Option<PathBuf>,

    /// Maximum number of recursive link levels
    #[arg(long, default_value_t = 5)]
    depth: u32,

    /// Minimum relevancy for a document to be accepted
    #[arg(long, default_value_t = 1.0)]
    min_relevancy: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> CrawlConfig {
        CrawlConfig {
            seed: self.seed,
            reset: self.reset,
            preserve_queue: self.preserve_queue,
            all_domains: self.all_domains,
            workers: self.threads,
            retry_cap: self.retries,
            max_depth: Some(self.depth),
            min_relevancy: self.min_relevancy,
            keywords: self
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            accepted_dir: self.download_folder,
            rejected_dir: self.rejected_folder,
            parser: self.parser,
            processor: self.processor,
            ..CrawlConfig::default()
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::try_new("info").expect("info filter is valid"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let summary = trawl_engine::run(args.into_config()).await?;
    if summary.interrupted {
        anyhow::bail!("crawl interrupted");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let args = Args::try_parse_from(["trawl"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.seed, None);
        assert_eq!(config.workers, 10);
        assert_eq!(config.retry_cap, 3);
        assert_eq!(config.max_depth, Some(5));
        assert_eq!(config.min_relevancy, 1.0);
        assert_eq!(config.accepted_dir, PathBuf::from("files"));
        assert_eq!(config.rejected_dir, None);
        assert_eq!(config.parser, "simple");
        assert_eq!(config.processor, "keyword");
        assert!(!config.all_domains);
        assert!(!config.reset);
    }

    #[test]
    fn full_invocation_parses() {
        let args = Args::try_parse_from([
            "trawl",
            "http://example.com/",
            "--reset",
            "--all-domains",
            "--threads",
            "4",
            "--retries",
            "2",
            "--keywords",
            "deep learning, crawling ,",
            "--download-folder",
            "out",
            "--rejected-folder",
            "bad",
            "--depth",
            "3",
            "--min-relevancy",
            "2.5",
            "--verbose",
        ])
        .unwrap();
        let config = args.into_config();
        assert_eq!(config.seed.as_deref(), Some("http://example.com/"));
        assert!(config.reset);
        assert!(config.all_domains);
        assert_eq!(config.workers, 4);
        assert_eq!(config.retry_cap, 2);
        assert_eq!(config.keywords, vec!["deep learning", "crawling"]);
        assert_eq!(config.accepted_dir, PathBuf::from("out"));
        assert_eq!(config.rejected_dir, Some(PathBuf::from("bad")));
        assert_eq!(config.max_depth, Some(3));
        assert_eq!(config.min_relevancy, 2.5);
    }

    #[test]
    fn short_flags_match_the_long_ones() {
        let args = Args::try_parse_from(["trawl", "-r", "-p", "-a", "-t", "2", "-R", "1", "-v"])
            .unwrap();
        assert!(args.reset);
        assert!(args.preserve_queue);
        assert!(args.all_domains);
        assert_eq!(args.threads, 2);
        assert_eq!(args.retries, 1);
        assert!(args.verbose);
    }
}
