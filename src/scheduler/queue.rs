//! The shared job queue and the per-worker claim algorithm.
//!
//! A worker's first claim fixes its browser profile:
//! - a **default** (`""`) profile lets the worker keep taking default jobs,
//!   one per claim;
//! - an **exclusive** profile makes the worker take every queued job with
//!   that profile in one atomic partition, then serve them from its private
//!   list until it runs dry.
//!
//! [`WorkerState::claim`] is only ever called with the shared lock held, so
//! no other worker observes a half-partitioned queue.

use std::collections::VecDeque;

use crate::models::CrawlJob;
use crate::scheduler::shared::TimeoutSignal;

#[derive(Debug, Default)]
pub struct JobQueue {
    jobs: VecDeque<CrawlJob>,
}

impl JobQueue {
    pub fn from_jobs(jobs: impl IntoIterator<Item = CrawlJob>) -> Self {
        Self {
            jobs: jobs.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn pop(&mut self) -> Option<CrawlJob> {
        self.jobs.pop_front()
    }

    /// Remove and return the first job matching `pred`; the rest stay queued.
    pub fn take_first(&mut self, pred: impl Fn(&CrawlJob) -> bool) -> Option<CrawlJob> {
        let index = self.jobs.iter().position(pred)?;
        self.jobs.remove(index)
    }

    /// Remove and return every job matching `pred`; the rest stay queued.
    pub fn extract_matching(&mut self, pred: impl Fn(&CrawlJob) -> bool) -> Vec<CrawlJob> {
        let (matching, rest): (Vec<_>, Vec<_>) = self.jobs.drain(..).partition(|job| pred(job));
        self.jobs = rest.into();
        matching
    }
}

/// Why a worker stopped claiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    TimedOut,
    QueueEmpty,
    /// Default-profile worker found only exclusive jobs left.
    NoDefaultJobLeft,
    /// Exclusive-profile worker served every job of its profile.
    ProfileExhausted,
}

#[derive(Debug, PartialEq)]
pub enum Claim {
    Fetch(CrawlJob),
    Finish(FinishReason),
}

/// What one worker has claimed so far. Never shared with other workers.
#[derive(Debug, Default)]
pub struct WorkerState {
    profile: Option<String>,
    jobs: VecDeque<CrawlJob>,
    finished: Option<FinishReason>,
}

impl WorkerState {
    pub fn profile(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// Jobs claimed for this worker that it has not fetched yet.
    pub fn pending(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Decide what the worker does next. Must run under the shared lock.
    pub fn claim(&mut self, queue: &mut JobQueue, signal: TimeoutSignal) -> Claim {
        if let Some(reason) = self.finished {
            return Claim::Finish(reason);
        }
        if !signal.is_running() {
            return self.finish(FinishReason::TimedOut);
        }
        if let Some(job) = self.jobs.pop_front() {
            return Claim::Fetch(job);
        }
        if queue.is_empty() {
            return self.finish(FinishReason::QueueEmpty);
        }

        let profile = self.profile.clone();
        match profile.as_deref() {
            None => {
                let Some(job) = queue.pop() else {
                    return self.finish(FinishReason::QueueEmpty);
                };
                let profile = job.browser_profile.clone();
                if !profile.is_empty() {
                    self.jobs
                        .extend(queue.extract_matching(|other| other.browser_profile == profile));
                }
                self.profile = Some(profile);
                Claim::Fetch(job)
            }
            Some("") => match queue.take_first(CrawlJob::is_default_profile) {
                Some(job) => Claim::Fetch(job),
                None => self.finish(FinishReason::NoDefaultJobLeft),
            },
            Some(_) => self.finish(FinishReason::ProfileExhausted),
        }
    }

    fn finish(&mut self, reason: FinishReason) -> Claim {
        self.finished = Some(reason);
        Claim::Finish(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    fn job(name: &str, profile: &str) -> CrawlJob {
        CrawlJob::new(name, format!("https://{name}.example")).with_profile(profile)
    }

    fn fetched(claim: Claim) -> String {
        match claim {
            Claim::Fetch(job) => job.name,
            Claim::Finish(reason) => panic!("expected a job, worker finished: {reason:?}"),
        }
    }

    #[test]
    fn test_take_first_keeps_other_jobs() {
        let mut queue = JobQueue::from_jobs(vec![job("a", "x"), job("b", ""), job("c", "")]);
        let taken = queue.take_first(CrawlJob::is_default_profile).unwrap();
        assert_eq!(taken.name, "b");
        assert_eq!(queue.len(), 2);
        assert!(queue.take_first(|j| j.name == "zzz").is_none());
    }

    #[test]
    fn test_extract_matching_partitions_queue() {
        let mut queue = JobQueue::from_jobs(vec![job("a", "x"), job("b", ""), job("c", "x"), job("d", "y")]);
        let matching = queue.extract_matching(|j| j.browser_profile == "x");

        let names: Vec<_> = matching.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(queue.len(), 2);
        assert!(queue.extract_matching(|j| j.browser_profile == "x").is_empty());
    }

    #[test]
    fn test_extract_matching_keeps_remaining_order() {
        let mut queue = JobQueue::from_jobs(vec![job("a", "x"), job("b", ""), job("c", "x"), job("d", "y")]);
        queue.extract_matching(|j| j.browser_profile == "x");

        assert_eq!(queue.pop().unwrap().name, "b");
        assert_eq!(queue.pop().unwrap().name, "d");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_exclusive_profile_claims_whole_group() {
        let mut queue = JobQueue::from_jobs(vec![job("j2", "A"), job("j1", ""), job("j3", "A")]);
        let mut worker = WorkerState::default();

        assert_eq!(fetched(worker.claim(&mut queue, TimeoutSignal::Running)), "j2");
        assert_eq!(worker.profile(), Some("A"));
        assert_eq!(worker.pending(), 1);
        assert_eq!(queue.len(), 1);

        assert_eq!(fetched(worker.claim(&mut queue, TimeoutSignal::Running)), "j3");
        assert_eq!(
            worker.claim(&mut queue, TimeoutSignal::Running),
            Claim::Finish(FinishReason::ProfileExhausted)
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_default_worker_skips_exclusive_jobs() {
        let mut queue = JobQueue::from_jobs(vec![job("j1", ""), job("j5", "B"), job("j4", "")]);
        let mut worker = WorkerState::default();

        assert_eq!(fetched(worker.claim(&mut queue, TimeoutSignal::Running)), "j1");
        assert_eq!(worker.profile(), Some(""));
        assert_eq!(fetched(worker.claim(&mut queue, TimeoutSignal::Running)), "j4");
        assert_eq!(
            worker.claim(&mut queue, TimeoutSignal::Running),
            Claim::Finish(FinishReason::NoDefaultJobLeft)
        );

        let left = queue.pop().unwrap();
        assert_eq!(left.name, "j5");
    }

    #[test]
    fn test_timeout_stops_claiming_even_with_private_jobs() {
        let mut queue = JobQueue::from_jobs(vec![job("a", "P"), job("b", "P"), job("c", "")]);
        let mut worker = WorkerState::default();

        assert_eq!(fetched(worker.claim(&mut queue, TimeoutSignal::Running)), "a");
        assert_eq!(
            worker.claim(&mut queue, TimeoutSignal::TimedOut),
            Claim::Finish(FinishReason::TimedOut)
        );
        assert_eq!(worker.pending(), 1);
        assert!(worker.is_finished());
        assert_eq!(
            worker.claim(&mut queue, TimeoutSignal::Running),
            Claim::Finish(FinishReason::TimedOut)
        );
    }

    #[test]
    fn test_empty_queue_finishes_fresh_worker() {
        let mut queue = JobQueue::default();
        let mut worker = WorkerState::default();
        assert_eq!(
            worker.claim(&mut queue, TimeoutSignal::Running),
            Claim::Finish(FinishReason::QueueEmpty)
        );
        assert_eq!(worker.profile(), None);
    }

    #[test]
    fn test_interleaved_workers_never_share_or_drop_jobs() {
        let jobs = vec![
            job("j1", ""),
            job("j2", "A"),
            job("j3", "A"),
            job("j4", ""),
            job("j5", "B"),
            job("j6", "A"),
            job("j7", ""),
            job("j8", "B"),
        ];
        let total = jobs.len();
        let mut queue = JobQueue::from_jobs(jobs);
        let mut workers: Vec<WorkerState> = (0..3).map(|_| WorkerState::default()).collect();
        let mut claimed_by: HashMap<String, usize> = HashMap::new();
        let mut profiles: HashMap<String, HashSet<usize>> = HashMap::new();

        // Round-robin claims, replacing finished workers with fresh ones.
        let mut next_id = workers.len();
        let mut ids: Vec<usize> = (0..workers.len()).collect();
        while !queue.is_empty() || workers.iter().any(|w| w.pending() > 0) {
            for slot in 0..workers.len() {
                match workers[slot].claim(&mut queue, TimeoutSignal::Running) {
                    Claim::Fetch(job) => {
                        assert!(claimed_by.insert(job.name.clone(), ids[slot]).is_none());
                        profiles
                            .entry(job.browser_profile.clone())
                            .or_default()
                            .insert(ids[slot]);
                        assert_eq!(workers[slot].profile(), Some(job.browser_profile.as_str()));
                    }
                    Claim::Finish(_) => {
                        workers[slot] = WorkerState::default();
                        ids[slot] = next_id;
                        next_id += 1;
                    }
                }
            }
        }

        assert_eq!(claimed_by.len(), total);
        assert_eq!(profiles["A"].len(), 1);
        assert_eq!(profiles["B"].len(), 1);
        assert!(profiles[""].is_disjoint(&profiles["A"]));
        assert!(profiles[""].is_disjoint(&profiles["B"]));
    }
}
