//! State shared between the orchestrator and its workers.
//!
//! Everything here sits behind one coarse [`tokio::sync::Mutex`]. Critical
//! sections only pop/push jobs, partition the queue, flip the timeout signal
//! or append to the registry and output sink; no fetch or quit ever runs
//! while the lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::models::Article;
use crate::scheduler::queue::JobQueue;

/// Run-wide cancellation state. Ordered so that it only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimeoutSignal {
    #[default]
    Running,
    /// Workers should stop claiming and drain.
    TimedOut,
    /// The grace period expired; remaining workers are being killed.
    Terminating,
}

impl TimeoutSignal {
    pub fn is_running(self) -> bool {
        self == TimeoutSignal::Running
    }

    /// Move to `next` unless the signal is already past it.
    pub fn raise(&mut self, next: TimeoutSignal) {
        if next > *self {
            *self = next;
        }
    }
}

/// Sessions currently held by live workers, keyed by worker id.
///
/// Only used as a safety net: the orchestrator force-quits whatever is still
/// registered once the grace period is over.
#[derive(Debug)]
pub struct BrowserRegistry<S> {
    sessions: HashMap<String, Arc<S>>,
}

impl<S> Default for BrowserRegistry<S> {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

impl<S> BrowserRegistry<S> {
    pub fn register(&mut self, worker: &str, session: Arc<S>) {
        self.sessions.insert(worker.to_string(), session);
    }

    pub fn release(&mut self, worker: &str) -> Option<Arc<S>> {
        self.sessions.remove(worker)
    }

    /// Take every registered session out of the registry.
    pub fn drain(&mut self) -> Vec<(String, Arc<S>)> {
        self.sessions.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Per-job outcomes accumulated by workers as they go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTally {
    /// Jobs whose fetch returned, successfully or not.
    pub completed: usize,
    /// Subset of `completed` whose fetch failed or panicked.
    pub failed: usize,
    pub launch_failures: usize,
}

#[derive(Debug)]
pub struct SharedState<S> {
    pub queue: JobQueue,
    pub signal: TimeoutSignal,
    pub registry: BrowserRegistry<S>,
    /// Articles flushed by finished workers.
    pub output: Vec<Article>,
    pub tally: RunTally,
}

impl<S> SharedState<S> {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            signal: TimeoutSignal::Running,
            registry: BrowserRegistry::default(),
            output: Vec::new(),
            tally: RunTally::default(),
        }
    }
}

pub type Shared<S> = Arc<Mutex<SharedState<S>>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_is_monotonic() {
        let mut signal = TimeoutSignal::Running;
        signal.raise(TimeoutSignal::TimedOut);
        assert_eq!(signal, TimeoutSignal::TimedOut);

        signal.raise(TimeoutSignal::Running);
        assert_eq!(signal, TimeoutSignal::TimedOut);

        signal.raise(TimeoutSignal::Terminating);
        signal.raise(TimeoutSignal::TimedOut);
        assert_eq!(signal, TimeoutSignal::Terminating);
        assert!(!signal.is_running());
    }

    #[test]
    fn test_registry_register_release_drain() {
        let mut registry = BrowserRegistry::default();
        registry.register("1", Arc::new("session-1"));
        registry.register("2", Arc::new("session-2"));

        assert_eq!(registry.release("1").as_deref(), Some(&"session-1"));
        assert!(registry.release("1").is_none());

        let left = registry.drain();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, "2");
        assert!(registry.is_empty());
    }
}
