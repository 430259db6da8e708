//! HTTP collaborators for the scheduler.
//!
//! Every source is scraped with the same two-phase pattern:
//!
//! 1. **Indexing**: download the source's index page and collect article links
//! 2. **Fetching**: download each article and parse title, body and date
//!
//! # Modules
//!
//! | Module | Provides |
//! |--------|----------|
//! | [`http`] | [`HttpLauncher`], [`HttpSession`], [`HttpFetcher`] |
//! | [`retry`] | [`RetryGet`], exponential backoff for page downloads |
//!
//! Failed article downloads are logged and skipped; only a failed index
//! download fails the job.

pub mod http;
pub mod retry;

pub use http::{HttpFetcher, HttpLauncher, HttpSession};
pub use retry::{PageGet, RetryGet};
