//! Output generation for crawled articles and run summaries.
//!
//! # Submodules
//!
//! - [`json`]: Appends articles to a JSON Lines file, reads earlier exports
//!   back, and writes the run report
//!
//! # Output Structure
//!
//! ```text
//! articles.jsonl   # one article per line, appended run after run
//! report.json      # summary of the latest run
//! ```

use futures::future::BoxFuture;

use crate::error::ExportError;
use crate::models::Article;

pub mod json;

/// A destination for newly discovered articles.
///
/// Export is best-effort: the scheduler logs and counts failures but never
/// fails a run because of them.
pub trait ArticleExporter: Send + Sync {
    /// Short name used in log events.
    fn name(&self) -> &str;

    fn export<'a>(&'a self, article: &'a Article) -> BoxFuture<'a, Result<(), ExportError>>;
}
