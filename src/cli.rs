//! Command-line interface definitions for newsdesk.
//!
//! Every option can also be set through an environment variable. Values
//! given here override the `crawler` section of the configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for one crawl run.
///
/// # Examples
///
/// ```sh
/// # Crawl every due source listed in config.yaml
/// newsdesk -c config.yaml -o ./out/articles.jsonl
///
/// # Debug one source at a time with a short budget
/// newsdesk --single --timeout 300
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML configuration listing sources and profiles
    #[arg(short, long, env = "NEWSDESK_CONFIG", default_value = "config.yaml")]
    pub config: PathBuf,

    /// JSON Lines file collected articles are appended to
    #[arg(short, long, env = "NEWSDESK_OUTPUT", default_value = "articles.jsonl")]
    pub output: PathBuf,

    /// Where to write the JSON run report
    #[arg(short, long, env = "NEWSDESK_REPORT")]
    pub report: Option<PathBuf>,

    /// Override the requested number of parallel workers
    #[arg(long, env = "NEWSDESK_MAX_CRAWLER")]
    pub max_crawler: Option<usize>,

    /// Override the crawl budget, in seconds
    #[arg(long, env = "NEWSDESK_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Run with a single worker
    #[arg(long)]
    pub single: bool,

    /// Lock file that keeps two runs from overlapping
    #[arg(long, env = "NEWSDESK_LOCK_FILE", default_value = "newsdesk.lock")]
    pub lock_file: PathBuf,
}
