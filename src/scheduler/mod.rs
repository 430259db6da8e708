//! Crawl orchestration.
//!
//! [`Scheduler::run`] drives one crawl run end to end:
//!
//! 1. **Seeding**: ask the [`JobSource`] for eligible jobs, stamp their
//!    `last_run`, and fill the shared [`JobQueue`]
//! 2. **Sizing**: pick the worker pool size with [`size_pool`]
//! 3. **Supervising**: on every tick, launch workers while there is work,
//!    raise the timeout signal once the crawl budget is spent, and kill
//!    whatever is left once the grace period expires. The loop also wakes
//!    at the next deadline, so neither depends on the poll interval
//! 4. **Aggregating**: drain worker output into an [`ArticleStore`] and hand
//!    new articles to the exporters
//!
//! # Cancellation
//!
//! Cancellation is two-tier. The soft tier flips the shared
//! [`TimeoutSignal`]; workers see it at their next claim and drain. The hard
//! tier runs `grace_period` later: every session still registered is
//! force-quit and every live worker task is aborted, which loses whatever
//! those workers had not flushed yet.

pub mod queue;
pub mod shared;
mod worker;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::collaborators::{
    ArticleFetcher, BrowserSession, CapacityProbe, HostCapacity, JobSource, SessionLauncher,
};
use crate::error::SchedulerError;
use crate::models::Article;
use crate::outputs::ArticleExporter;
use crate::store::ArticleStore;

pub use queue::{Claim, FinishReason, JobQueue, WorkerState};
pub use shared::{BrowserRegistry, RunTally, Shared, SharedState, TimeoutSignal};

use worker::{WorkerContext, run_worker};

/// Delay between a soft timeout and forced termination.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(120);
/// How often the orchestrator checks on its workers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Politeness delay a worker takes after every job.
pub const DEFAULT_PAUSE_BETWEEN_JOBS: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Requested number of parallel workers.
    pub max_workers: usize,
    /// Global crawl budget, after which workers are asked to stop.
    pub timeout: Duration,
    pub grace_period: Duration,
    pub poll_interval: Duration,
    pub pause_between_jobs: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            timeout: Duration::from_secs(30 * 60),
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pause_between_jobs: DEFAULT_PAUSE_BETWEEN_JOBS,
        }
    }
}

/// Decide how many workers to run.
///
/// The request is clamped to what the host can sustain (a capacity of `0`
/// counts as `1`), then shrunk to `job_count / 2 + 1` when it exceeds
/// `job_count / 2`, and never drops below one.
pub fn size_pool(requested: usize, capacity: usize, job_count: usize) -> usize {
    let capacity = capacity.max(1);
    let mut effective = requested;

    if requested > capacity {
        warn!(
            requested,
            capacity, "Host cannot sustain the requested crawlers; clamping for this run (reduce max_crawler)"
        );
        effective = capacity;
    } else if requested < capacity {
        info!(
            requested,
            capacity, "Host can sustain more crawlers (consider increasing max_crawler)"
        );
    }

    let half = job_count / 2;
    if effective > half {
        debug!(job_count, from = effective, to = half + 1, "Few sources to crawl; shrinking pool");
        effective = half + 1;
    }

    effective.max(1)
}

/// Summary of one crawl run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Jobs enqueued this run.
    pub jobs_attempted: usize,
    /// Jobs left out because their re-crawl interval had not elapsed.
    pub jobs_skipped: usize,
    pub jobs_completed: usize,
    pub jobs_failed: usize,
    /// Enqueued jobs that were never fetched to completion.
    pub jobs_abandoned: usize,
    pub effective_workers: usize,
    pub workers_launched: usize,
    pub launch_failures: usize,
    /// New articles, after deduplication.
    pub articles_found: usize,
    pub timed_out: bool,
    pub hard_terminated: bool,
    pub workers_force_terminated: usize,
    pub sessions_force_quit: usize,
    pub export_failures: usize,
}

/// Articles discovered by a run, plus its report.
#[derive(Debug)]
pub struct CrawlRun {
    pub articles: Vec<Article>,
    pub report: RunReport,
}

struct WorkerHandle {
    id: String,
    handle: JoinHandle<()>,
}

pub struct Scheduler<L, F> {
    config: SchedulerConfig,
    launcher: Arc<L>,
    fetcher: Arc<F>,
    capacity: Box<dyn CapacityProbe>,
    exporters: Vec<Box<dyn ArticleExporter>>,
}

impl<L, F> Scheduler<L, F>
where
    L: SessionLauncher,
    F: ArticleFetcher<L::Session>,
{
    pub fn new(config: SchedulerConfig, launcher: L, fetcher: F) -> Self {
        Self {
            config,
            launcher: Arc::new(launcher),
            fetcher: Arc::new(fetcher),
            capacity: Box::new(HostCapacity),
            exporters: Vec::new(),
        }
    }

    pub fn with_capacity_probe(mut self, probe: impl CapacityProbe + 'static) -> Self {
        self.capacity = Box::new(probe);
        self
    }

    pub fn with_exporter(mut self, exporter: impl ArticleExporter + 'static) -> Self {
        self.exporters.push(Box::new(exporter));
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Crawl every eligible job of `source` and return the new articles.
    pub async fn run<J: JobSource>(&self, source: &mut J) -> Result<CrawlRun, SchedulerError> {
        let mut store = ArticleStore::new();
        self.run_into(source, &mut store).await
    }

    /// Like [`Scheduler::run`], deduplicating against the articles already
    /// in `store`. Only articles new to `store` are returned and exported.
    #[instrument(level = "info", skip_all)]
    pub async fn run_into<J: JobSource>(
        &self,
        source: &mut J,
        store: &mut ArticleStore,
    ) -> Result<CrawlRun, SchedulerError> {
        self.validate()?;
        let started_at = Utc::now();
        let clock = Instant::now();

        // ---- Seeding ----
        // `mark_run` stamps by name, so names must be unique across every
        // configured job, not only the due ones.
        let mut names = HashSet::new();
        for job in source.jobs() {
            if names.contains(&job.name) {
                return Err(SchedulerError::DuplicateJob(job.name));
            }
            names.insert(job.name);
        }
        let eligible = source.eligible_jobs(started_at);
        for (job, remaining_minutes) in &eligible.skipped {
            info!(job = %job.name, remaining_minutes, "Ignoring source; re-crawl interval not reached");
        }

        let mut jobs = eligible.due;
        for job in &mut jobs {
            source.mark_run(&job.name, started_at);
            job.last_run = Some(started_at);
        }
        let jobs_attempted = jobs.len();
        let jobs_skipped = eligible.skipped.len();
        info!(jobs = jobs_attempted, skipped = jobs_skipped, "Crawl queue initialized");

        // ---- Sizing ----
        let effective = size_pool(
            self.config.max_workers,
            self.capacity.max_supported_parallel_workers(),
            jobs_attempted,
        );
        info!(effective, timeout = ?self.config.timeout, "Crawlers to run in parallel");

        let shared: Shared<L::Session> =
            Arc::new(Mutex::new(SharedState::new(JobQueue::from_jobs(jobs))));

        // ---- Supervising ----
        let mut workers: Vec<WorkerHandle> = Vec::new();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut timed_out_at: Option<Instant> = None;
        let mut hard_terminated = false;
        let mut workers_force_terminated = 0;
        let mut sessions_force_quit = 0;

        loop {
            let deadline = match timed_out_at {
                None => deadline_after(clock, self.config.timeout),
                Some(at) => deadline_after(at, self.config.grace_period),
            };
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::time::sleep_until(deadline) => {}
            }

            let mut alive = workers.iter().filter(|w| !w.handle.is_finished()).count();
            let queued = shared.lock().await.queue.len();
            debug!(alive, queued, "Supervisor tick");

            if alive == 0 && queued == 0 {
                info!("All crawlers finished");
                break;
            }
            if alive == 0 && timed_out_at.is_some() {
                info!(abandoned = queued, "All crawlers stopped after timeout");
                break;
            }

            while timed_out_at.is_none() && alive < effective && queued > 0 {
                let id = (workers.len() + 1).to_string();
                let ctx = WorkerContext {
                    id: id.clone(),
                    shared: Arc::clone(&shared),
                    launcher: Arc::clone(&self.launcher),
                    fetcher: Arc::clone(&self.fetcher),
                    pause_between_jobs: self.config.pause_between_jobs,
                };
                info!(worker = %id, "Starting crawler");
                workers.push(WorkerHandle {
                    id,
                    handle: tokio::spawn(run_worker(ctx)),
                });
                alive += 1;
            }

            match timed_out_at {
                None if clock.elapsed() >= self.config.timeout => {
                    warn!(grace_period = ?self.config.grace_period, "Timeout; informing crawlers, terminating all after grace period");
                    shared.lock().await.signal.raise(TimeoutSignal::TimedOut);
                    timed_out_at = Some(Instant::now());
                }
                None => {
                    let remaining = self.config.timeout.saturating_sub(clock.elapsed());
                    debug!(remaining_secs = remaining.as_secs(), "Remaining time to timeout");
                }
                Some(at) if at.elapsed() >= self.config.grace_period => {
                    warn!("Grace period over; killing remaining crawlers");
                    let sessions = {
                        let mut guard = shared.lock().await;
                        guard.signal.raise(TimeoutSignal::Terminating);
                        guard.registry.drain()
                    };
                    sessions_force_quit += quit_sessions(sessions).await;
                    for worker in workers.iter().filter(|w| !w.handle.is_finished()) {
                        warn!(worker = %worker.id, "Terminating crawler");
                        worker.handle.abort();
                        workers_force_terminated += 1;
                    }
                    hard_terminated = true;
                    break;
                }
                Some(at) => {
                    let remaining = self.config.grace_period.saturating_sub(at.elapsed());
                    debug!(remaining_secs = remaining.as_secs(), "Remaining time to terminate");
                }
            }
        }

        let workers_launched = workers.len();
        for worker in workers {
            if let Err(e) = worker.handle.await {
                if e.is_panic() {
                    error!(worker = %worker.id, error = %e, "Crawler crashed");
                }
            }
        }

        // Sessions of crashed or aborted workers.
        let leftovers = shared.lock().await.registry.drain();
        sessions_force_quit += quit_sessions(leftovers).await;

        // ---- Aggregating ----
        let (output, tally, queued) = {
            let mut guard = shared.lock().await;
            (std::mem::take(&mut guard.output), guard.tally, guard.queue.len())
        };
        let mut articles = Vec::new();
        for article in output {
            if store.merge(article.clone()) {
                debug!(newspaper = %article.newspaper, topic = %article.topic, "New article");
                articles.push(article);
            }
        }

        let export_failures = self.export(&articles).await;

        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            jobs_attempted,
            jobs_skipped,
            jobs_completed: tally.completed,
            jobs_failed: tally.failed,
            jobs_abandoned: jobs_attempted.saturating_sub(tally.completed),
            effective_workers: effective,
            workers_launched,
            launch_failures: tally.launch_failures,
            articles_found: articles.len(),
            timed_out: timed_out_at.is_some(),
            hard_terminated,
            workers_force_terminated,
            sessions_force_quit,
            export_failures,
        };

        info!(
            articles = report.articles_found,
            completed = report.jobs_completed,
            abandoned = report.jobs_abandoned,
            left_in_queue = queued,
            timed_out = report.timed_out,
            hard_terminated = report.hard_terminated,
            force_terminated = report.workers_force_terminated,
            elapsed = ?clock.elapsed(),
            "Finished crawling"
        );

        Ok(CrawlRun { articles, report })
    }

    fn validate(&self) -> Result<(), SchedulerError> {
        if self.config.poll_interval.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Hand every article to every exporter, returning the failure count.
    async fn export(&self, articles: &[Article]) -> usize {
        let mut failures = 0;
        for exporter in &self.exporters {
            for article in articles {
                if let Err(e) = exporter.export(article).await {
                    error!(exporter = exporter.name(), id = %article.id, error = %e, "Export failed");
                    failures += 1;
                }
            }
        }
        failures
    }
}

/// `start + delay`, saturating at roughly thirty years out.
fn deadline_after(start: Instant, delay: Duration) -> Instant {
    start
        .checked_add(delay)
        .unwrap_or_else(|| start + Duration::from_secs(86400 * 365 * 30))
}

async fn quit_sessions<S: BrowserSession>(sessions: Vec<(String, Arc<S>)>) -> usize {
    let count = sessions.len();
    for (worker, session) in sessions {
        warn!(worker = %worker, profile = ?session.profile(), "Found a running browser; closing it");
        if let Err(e) = session.quit().await {
            warn!(worker = %worker, error = %e, "Failed to close browser");
        }
    }
    count
}
