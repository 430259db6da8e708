//! # newsdesk
//!
//! Crawl the news sources listed in a YAML configuration, in parallel, and
//! append the new articles to a JSON Lines file.
//!
//! ## Usage
//!
//! ```sh
//! newsdesk -c config.yaml -o ./out/articles.jsonl -r ./out/report.json
//! ```
//!
//! ## Flow
//!
//! 1. **Lock**: refuse to start while another run holds the lock file
//! 2. **Load**: read sources and profiles; apply CLI overrides
//! 3. **Crawl**: run the scheduler over every due source
//! 4. **Persist**: save stamped `last_run` values and write the run report

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use newsdesk::config::SourceBook;
use newsdesk::outputs::json::{JsonLinesExporter, load_known, write_report};
use newsdesk::scheduler::Scheduler;
use newsdesk::scrapers::{HttpFetcher, HttpLauncher};
use newsdesk::store::ArticleStore;
use newsdesk::utils::{SessionLock, ensure_writable_dir};

mod cli;

use cli::Cli;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newsdesk starting up");

    let args = Cli::parse();
    debug!(?args.config, ?args.output, ?args.report, "Parsed CLI arguments");

    let lock = match SessionLock::acquire(&args.lock_file) {
        Ok(lock) => lock,
        Err(e) => {
            error!(error = %e, "Crawler is already running; exiting");
            return Err(e.into());
        }
    };

    // ---- Configuration ----
    let mut book = SourceBook::load(&args.config).await?;
    let settings = book.settings_mut();
    if let Some(max_crawler) = args.max_crawler {
        settings.max_crawler = max_crawler;
    }
    if let Some(timeout) = args.timeout {
        settings.timeout_seconds = timeout;
    }
    if args.single {
        info!("Single-crawler mode");
        settings.max_crawler = 1;
    }
    let settings = settings.clone();

    // Early check: outputs must be writable before anything is crawled
    for path in std::iter::once(&args.output).chain(args.report.as_ref()) {
        let dir = parent_dir(path);
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let mut store = ArticleStore::from_articles(load_known(&args.output).await?);
    info!(known = store.len(), "Seeded article store");

    // ---- Crawl ----
    let launcher = HttpLauncher::new(settings.user_agent.clone(), settings.request_timeout());
    let fetcher = HttpFetcher::new(&book.config().profiles)?;
    let exporter = JsonLinesExporter::new(&args.output);
    info!(path = %exporter.path().display(), "Exporting new articles");

    let scheduler = Scheduler::new(settings.scheduler_config(), launcher, fetcher).with_exporter(exporter);
    debug!(config = ?scheduler.config(), "Scheduler ready");
    let run = scheduler.run_into(&mut book, &mut store).await?;

    // ---- Persist ----
    if let Err(e) = book.save().await {
        error!(error = %e, "Failed to save last_run timestamps");
    }

    if let Some(report_path) = &args.report {
        if let Err(e) = write_report(&run.report, report_path).await {
            error!(path = %report_path.display(), error = %e, "Failed to write run report");
        }
    }

    drop(lock);

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        new_articles = run.articles.len(),
        known_articles = store.len(),
        "Execution complete"
    );

    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
