//! JSON output for articles and run reports.
//!
//! Articles are written as JSON Lines: one compact JSON object per line,
//! appended to the same file on every run. The file doubles as the record
//! of what has already been crawled; [`load_known`] reads it back so the
//! next run only exports articles it has not seen.

use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use crate::error::ExportError;
use crate::models::Article;
use crate::outputs::ArticleExporter;
use crate::scheduler::RunReport;

/// Appends every exported article to a JSON Lines file.
#[derive(Debug, Clone)]
pub struct JsonLinesExporter {
    path: PathBuf,
}

impl JsonLinesExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, article: &Article) -> Result<(), ExportError> {
        let mut line = serde_json::to_string(article)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

impl ArticleExporter for JsonLinesExporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn export<'a>(&'a self, article: &'a Article) -> BoxFuture<'a, Result<(), ExportError>> {
        self.append(article).boxed()
    }
}

/// Read articles exported by earlier runs.
///
/// A missing file yields no articles. Lines that do not parse are logged
/// and skipped.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_known(path: &Path) -> Result<Vec<Article>, ExportError> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut articles = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Article>(line) {
            Ok(article) => articles.push(article),
            Err(e) => warn!(line = index + 1, error = %e, "Skipping unreadable exported article"),
        }
    }
    info!(count = articles.len(), "Loaded previously exported articles");
    Ok(articles)
}

/// Write the run report as pretty-printed JSON, replacing any earlier one.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_report(report: &RunReport, path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json).await?;
    info!("Wrote run report");
    Ok(())
}
