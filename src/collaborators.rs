//! Capabilities the scheduler depends on.
//!
//! The scheduler never scrapes, drives a browser or reads configuration by
//! itself. It sees each collaborator through one of these traits:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`JobSource`] | Lists crawl jobs and stamps `last_run` |
//! | [`CapacityProbe`] | Reports how many workers the host can sustain |
//! | [`SessionLauncher`] | Creates one [`BrowserSession`] per worker |
//! | [`ArticleFetcher`] | Scrapes one job with one session |
//!
//! Futures returned by session and fetcher methods must be `Send` because
//! every worker runs on its own tokio task.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::error::{FetchError, SessionError};
use crate::models::{Article, CrawlJob, Eligibility};

/// Handle to one browser-automation instance, owned by a single worker.
pub trait BrowserSession: Send + Sync + 'static {
    /// Profile the session is signed in with, if it has been bound to one.
    fn profile(&self) -> Option<String>;

    /// Shut the session down. Calling `quit` on a closed session is a no-op.
    fn quit(&self) -> impl Future<Output = Result<(), SessionError>> + Send;
}

/// Creates sessions for newly launched workers.
pub trait SessionLauncher: Send + Sync + 'static {
    type Session: BrowserSession;

    fn launch(&self, worker: &str) -> impl Future<Output = Result<Self::Session, SessionError>> + Send;
}

/// Performs the scrape for one job.
///
/// Articles are appended to `sink` as they are found, so a fetch that fails
/// halfway still leaves the articles it collected before the failure.
pub trait ArticleFetcher<S: BrowserSession>: Send + Sync + 'static {
    fn fetch(
        &self,
        job: &CrawlJob,
        session: &S,
        sink: &mut Vec<Article>,
    ) -> impl Future<Output = Result<(), FetchError>> + Send;
}

/// Reports how many workers the host can run in parallel.
pub trait CapacityProbe: Send + Sync {
    /// A result of `0` is treated as `1` by the scheduler.
    fn max_supported_parallel_workers(&self) -> usize;
}

/// Capacity derived from the host's available parallelism.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostCapacity;

impl CapacityProbe for HostCapacity {
    fn max_supported_parallel_workers(&self) -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

/// Jobs that passed the interval check, and the ones that did not.
#[derive(Debug, Default)]
pub struct EligibleJobs {
    pub due: Vec<CrawlJob>,
    /// Skipped jobs with the minutes they still have to wait.
    pub skipped: Vec<(CrawlJob, i64)>,
}

/// Where crawl jobs come from and where their `last_run` is recorded.
pub trait JobSource {
    /// Every configured job, eligible or not.
    fn jobs(&self) -> Vec<CrawlJob>;

    /// Record that the job named `name` was enqueued at `at`.
    fn mark_run(&mut self, name: &str, at: DateTime<Utc>);

    /// Split the configured jobs by eligibility at `now`.
    fn eligible_jobs(&self, now: DateTime<Utc>) -> EligibleJobs {
        let mut out = EligibleJobs::default();
        for job in self.jobs() {
            match job.eligibility(now) {
                Eligibility::Due => out.due.push(job),
                Eligibility::Waiting { remaining_minutes } => {
                    out.skipped.push((job, remaining_minutes))
                }
            }
        }
        out
    }
}

impl JobSource for Vec<CrawlJob> {
    fn jobs(&self) -> Vec<CrawlJob> {
        self.clone()
    }

    fn mark_run(&mut self, name: &str, at: DateTime<Utc>) {
        if let Some(job) = self.iter_mut().find(|job| job.name == name) {
            job.last_run = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_eligible_jobs_split() {
        let now = Utc::now();
        let jobs = vec![
            CrawlJob::new("recent", "https://a.example").with_interval(10, Some(now - Duration::minutes(5))),
            CrawlJob::new("stale", "https://b.example").with_interval(10, Some(now - Duration::minutes(15))),
            CrawlJob::new("fresh", "https://c.example"),
        ];

        let split = jobs.eligible_jobs(now);
        let due: Vec<_> = split.due.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(due, vec!["stale", "fresh"]);
        assert_eq!(split.skipped.len(), 1);
        assert_eq!(split.skipped[0].0.name, "recent");
        assert_eq!(split.skipped[0].1, 5);
    }

    #[test]
    fn test_vec_mark_run() {
        let now = Utc::now();
        let mut jobs = vec![CrawlJob::new("a", "https://a.example")];
        jobs.mark_run("a", now);
        jobs.mark_run("missing", now);
        assert_eq!(jobs[0].last_run, Some(now));
    }

    #[test]
    fn test_host_capacity_is_positive() {
        assert!(HostCapacity.max_supported_parallel_workers() >= 1);
    }
}
