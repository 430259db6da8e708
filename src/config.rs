//! YAML configuration: crawler settings, browser profiles and sources.
//!
//! The configuration file is also where each source's `last_run` lives.
//! [`SourceBook`] loads it, serves its sources as crawl jobs through
//! [`JobSource`], and writes the stamped timestamps back with
//! [`SourceBook::save`].
//!
//! # Example
//!
//! ```yaml
//! crawler:
//!   max_crawler: 4
//!   timeout_seconds: 1800
//! profiles:
//!   paywalled:
//!     headers:
//!       Cookie: "session=abc"
//! sources:
//!   - name: vnexpress
//!     url: https://vnexpress.net
//!     min_interval_minutes: 30
//!   - name: paper-with-login
//!     url: https://paper.example
//!     browser_profile: paywalled
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, instrument};

use crate::collaborators::JobSource;
use crate::error::ConfigError;
use crate::models::CrawlJob;
use crate::scheduler::{
    DEFAULT_GRACE_PERIOD, DEFAULT_PAUSE_BETWEEN_JOBS, DEFAULT_POLL_INTERVAL, SchedulerConfig,
};

/// Knobs for the scheduler and the HTTP collaborators.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CrawlerSettings {
    pub max_crawler: usize,
    pub timeout_seconds: u64,
    pub grace_period_seconds: u64,
    pub poll_interval_seconds: u64,
    pub pause_between_jobs_seconds: u64,
    pub request_timeout_seconds: u64,
    pub user_agent: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            max_crawler: 4,
            timeout_seconds: 30 * 60,
            grace_period_seconds: DEFAULT_GRACE_PERIOD.as_secs(),
            poll_interval_seconds: DEFAULT_POLL_INTERVAL.as_secs(),
            pause_between_jobs_seconds: DEFAULT_PAUSE_BETWEEN_JOBS.as_secs(),
            request_timeout_seconds: 30,
            user_agent: concat!("newsdesk/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl CrawlerSettings {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_workers: self.max_crawler,
            timeout: Duration::from_secs(self.timeout_seconds),
            grace_period: Duration::from_secs(self.grace_period_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            pause_between_jobs: Duration::from_secs(self.pause_between_jobs_seconds),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Request headers identifying one browser profile (login cookies, tokens).
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CrawlerConfig {
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    #[serde(default)]
    pub sources: Vec<CrawlJob>,
}

/// The configuration file, loaded for one run.
#[derive(Debug)]
pub struct SourceBook {
    path: PathBuf,
    config: CrawlerConfig,
}

impl SourceBook {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let yaml = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
        let config: CrawlerConfig = serde_yaml::from_str(&yaml)?;
        info!(
            sources = config.sources.len(),
            profiles = config.profiles.len(),
            "Loaded configuration"
        );
        Ok(Self { path, config })
    }

    /// Write the configuration back, including stamped `last_run` values.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub async fn save(&self) -> Result<(), ConfigError> {
        let yaml = serde_yaml::to_string(&self.config)?;
        fs::write(&self.path, yaml)
            .await
            .map_err(|source| ConfigError::Io {
                path: self.path.clone(),
                source,
            })?;
        info!("Saved configuration");
        Ok(())
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    pub fn settings_mut(&mut self) -> &mut CrawlerSettings {
        &mut self.config.crawler
    }
}

impl JobSource for SourceBook {
    fn jobs(&self) -> Vec<CrawlJob> {
        self.config.sources.clone()
    }

    fn mark_run(&mut self, name: &str, at: DateTime<Utc>) {
        self.config.sources.mark_run(name, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CrawlType;

    const SAMPLE: &str = r#"
crawler:
  max_crawler: 6
  timeout_seconds: 900
profiles:
  paywalled:
    headers:
      Cookie: "session=abc"
sources:
  - name: vnexpress
    url: https://vnexpress.net
    min_interval_minutes: 30
    last_run: 2025-05-06T08:00:00Z
  - name: paper-with-login
    url: https://paper.example
    browser_profile: paywalled
    language: vi
  - name: fanpage
    url: https://social.example/page
    crawl_type: social
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: CrawlerConfig = serde_yaml::from_str(SAMPLE).unwrap();

        assert_eq!(config.crawler.max_crawler, 6);
        assert_eq!(config.crawler.timeout_seconds, 900);
        assert_eq!(config.crawler.grace_period_seconds, 120);
        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].browser_profile, "paywalled");
        assert_eq!(config.sources[2].crawl_type, CrawlType::Reserved);
        assert_eq!(
            config.profiles["paywalled"].headers["Cookie"],
            "session=abc"
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: CrawlerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.crawler, CrawlerSettings::default());
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_scheduler_config_conversion() {
        let settings = CrawlerSettings {
            max_crawler: 3,
            timeout_seconds: 60,
            grace_period_seconds: 5,
            poll_interval_seconds: 2,
            pause_between_jobs_seconds: 0,
            ..CrawlerSettings::default()
        };
        let config = settings.scheduler_config();

        assert_eq!(config.max_workers, 3);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.grace_period, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert!(config.pause_between_jobs.is_zero());
    }

    #[tokio::test]
    async fn test_mark_run_is_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, SAMPLE).await.unwrap();

        let mut book = SourceBook::load(&path).await.unwrap();
        let now = Utc::now();
        book.mark_run("paper-with-login", now);
        book.save().await.unwrap();

        let reloaded = SourceBook::load(&path).await.unwrap();
        let job = reloaded
            .jobs()
            .into_iter()
            .find(|j| j.name == "paper-with-login")
            .unwrap();
        assert_eq!(job.last_run, Some(now));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SourceBook::load(dir.path().join("missing.yaml"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
