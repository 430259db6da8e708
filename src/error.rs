//! Error types for the crawler.
//!
//! Failures are contained at the narrowest boundary that can handle them:
//! [`FetchError`] and [`SessionError`] never leave a worker, [`ExportError`]
//! never fails a run, and [`SchedulerError`] is the only error that escapes
//! [`Scheduler::run`](crate::scheduler::Scheduler::run).

use std::path::PathBuf;

use thiserror::Error;

/// Failure while scraping one job.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("invalid url {url}: {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid css selector `{0}`")]
    Selector(String),

    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("{0}")]
    Other(String),
}

/// Failure launching or quitting a browser session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to launch session for worker {worker}: {reason}")]
    Launch { worker: String, reason: String },

    #[error("failed to quit session {session}: {reason}")]
    Quit { session: String, reason: String },
}

/// Failure persisting crawled articles.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize article: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Setup failure that aborts a whole run.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid scheduler configuration: {0}")]
    InvalidConfig(String),

    #[error("job `{0}` is listed more than once")]
    DuplicateJob(String),
}

/// Failure reading or writing the YAML source book.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failure taking the single-run lock file.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another crawl run holds {} (remove it if no run is active)", .0.display())]
    Held(PathBuf),

    #[error("cannot create lock file: {0}")]
    Io(#[from] std::io::Error),
}
