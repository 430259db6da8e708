//! A single crawl worker.
//!
//! A worker owns one browser session for its whole life and walks through
//! `Idle → Claiming → Fetching → … → Draining → Done`:
//!
//! - **Claiming** runs [`WorkerState::claim`] under the shared lock.
//! - **Fetching** calls the [`ArticleFetcher`] with the lock released.
//!   Errors and panics are logged and the job counts as done.
//! - **Draining** quits the session and flushes collected articles to the
//!   shared output sink. It runs on every exit path the worker controls.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};

use crate::collaborators::{ArticleFetcher, BrowserSession, SessionLauncher};
use crate::models::{CrawlJob, CrawlType};
use crate::scheduler::queue::{Claim, FinishReason, WorkerState};
use crate::scheduler::shared::Shared;
use crate::store::ArticleStore;

pub(crate) struct WorkerContext<L: SessionLauncher, F> {
    pub id: String,
    pub shared: Shared<L::Session>,
    pub launcher: Arc<L>,
    pub fetcher: Arc<F>,
    pub pause_between_jobs: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchOutcome {
    Fetched,
    Failed,
    Skipped,
}

#[instrument(level = "info", skip_all, fields(worker = %ctx.id))]
pub(crate) async fn run_worker<L, F>(ctx: WorkerContext<L, F>)
where
    L: SessionLauncher,
    F: ArticleFetcher<L::Session>,
{
    info!(phase = "idle", "Crawler started");

    let session = match ctx.launcher.launch(&ctx.id).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!(phase = "idle", error = %e, "Could not launch browser session; crawler exits without jobs");
            ctx.shared.lock().await.tally.launch_failures += 1;
            return;
        }
    };
    ctx.shared
        .lock()
        .await
        .registry
        .register(&ctx.id, Arc::clone(&session));

    let mut state = WorkerState::default();
    let mut collected = ArticleStore::new();

    let reason = loop {
        let claim = {
            let mut guard = ctx.shared.lock().await;
            let signal = guard.signal;
            state.claim(&mut guard.queue, signal)
        };

        let job = match claim {
            Claim::Fetch(job) => job,
            Claim::Finish(reason) => break reason,
        };

        let outcome = fetch_job(&ctx, &job, &session, &mut collected).await;
        {
            let mut guard = ctx.shared.lock().await;
            guard.tally.completed += 1;
            if outcome == FetchOutcome::Failed {
                guard.tally.failed += 1;
            }
        }

        if !ctx.pause_between_jobs.is_zero() {
            tokio::time::sleep(ctx.pause_between_jobs).await;
        }
    };

    drain(&ctx, &session, &state, collected, reason).await;
}

async fn fetch_job<L, F>(
    ctx: &WorkerContext<L, F>,
    job: &CrawlJob,
    session: &Arc<L::Session>,
    collected: &mut ArticleStore,
) -> FetchOutcome
where
    L: SessionLauncher,
    F: ArticleFetcher<L::Session>,
{
    if job.crawl_type != CrawlType::Newspaper {
        debug!(phase = "fetching", job = %job.name, crawl_type = ?job.crawl_type, "Crawl type not handled; skipping job");
        return FetchOutcome::Skipped;
    }

    info!(phase = "fetching", job = %job.name, profile = %job.browser_profile, "Crawling newspaper");
    let mut found = Vec::new();
    let result = AssertUnwindSafe(ctx.fetcher.fetch(job, session.as_ref(), &mut found))
        .catch_unwind()
        .await;
    let inserted = collected.extend(found);

    match result {
        Ok(Ok(())) => {
            info!(phase = "fetching", job = %job.name, new_articles = inserted, "Newspaper crawled");
            FetchOutcome::Fetched
        }
        Ok(Err(e)) => {
            warn!(phase = "fetching", job = %job.name, error = %e, kept_articles = inserted, "Crawl failed; moving on");
            FetchOutcome::Failed
        }
        Err(_) => {
            error!(phase = "fetching", job = %job.name, kept_articles = inserted, "Fetcher panicked; moving on");
            FetchOutcome::Failed
        }
    }
}

async fn drain<L, F>(
    ctx: &WorkerContext<L, F>,
    session: &Arc<L::Session>,
    state: &WorkerState,
    collected: ArticleStore,
    reason: FinishReason,
) where
    L: SessionLauncher,
{
    match reason {
        FinishReason::TimedOut => info!(
            phase = "draining",
            abandoned = state.pending(),
            "Timeout detected; finishing"
        ),
        _ => info!(phase = "draining", ?reason, profile = ?state.profile(), "No more jobs for this crawler; finishing"),
    }

    if let Err(e) = session.quit().await {
        warn!(phase = "draining", error = %e, "Failed to quit browser session");
    }

    let count = collected.len();
    let mut guard = ctx.shared.lock().await;
    guard.registry.release(&ctx.id);
    guard.output.extend(collected.into_articles());
    drop(guard);

    info!(phase = "done", articles = count, "Crawler finished");
}
