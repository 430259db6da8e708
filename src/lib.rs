//! # newsdesk
//!
//! A parallel news crawler. A run takes the sources whose re-crawl interval
//! has elapsed, spreads them over a pool of workers, and collects the
//! articles they find until the queue is empty or the crawl budget is spent.
//!
//! ## Architecture
//!
//! 1. **Seeding**: [`config::SourceBook`] lists sources; due ones are stamped
//!    and queued
//! 2. **Crawling**: [`scheduler::Scheduler`] supervises workers, each with its
//!    own session. Jobs sharing a non-default browser profile are all
//!    served by the one worker that claimed the profile first
//! 3. **Output**: new articles are deduplicated in an [`store::ArticleStore`]
//!    and handed to [`outputs::ArticleExporter`]s
//!
//! Collaborators (sessions, fetchers, capacity) sit behind the traits in
//! [`collaborators`]; [`scrapers`] provides the HTTP implementations.

pub mod collaborators;
pub mod config;
pub mod error;
pub mod models;
pub mod outputs;
pub mod scheduler;
pub mod scrapers;
pub mod store;
pub mod utils;
