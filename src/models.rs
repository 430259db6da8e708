//! Data models for crawl jobs and the articles they produce.
//!
//! This module defines the core data structures shared by the scheduler and
//! its collaborators:
//! - [`CrawlJob`]: One news source to crawl, with its profile affinity and
//!   re-crawl interval
//! - [`CrawlType`]: Which kind of crawl a job asks for
//! - [`ArticleSelectors`]: CSS selectors the HTTP fetcher uses for a source
//! - [`Article`]: A scraped article, keyed by its identity
//!
//! Jobs are deserialized straight from the `sources` list of the YAML
//! configuration, so every field the configuration may omit has a default.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of crawl a [`CrawlJob`] requests.
///
/// Only [`CrawlType::Newspaper`] triggers fetching. Any other value found in
/// the configuration is kept as [`CrawlType::Reserved`] and skipped by
/// workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlType {
    /// Crawl the source's index page and the articles it links to.
    #[default]
    Newspaper,
    /// Reserved for future job kinds.
    #[serde(other)]
    Reserved,
}

/// CSS selectors used to pull links and article fields out of a source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleSelectors {
    /// Selects anchors on the index page that point to articles.
    #[serde(default = "default_link_selector")]
    pub link: String,
    /// Selects the article headline.
    #[serde(default = "default_title_selector")]
    pub title: String,
    /// Selects the paragraphs making up the article body.
    #[serde(default = "default_body_selector")]
    pub body: String,
    /// Selects the element carrying the publication timestamp.
    #[serde(default = "default_published_selector")]
    pub published: String,
}

fn default_link_selector() -> String {
    "article a[href]".to_string()
}

fn default_title_selector() -> String {
    "h1".to_string()
}

fn default_body_selector() -> String {
    "article p".to_string()
}

fn default_published_selector() -> String {
    "time[datetime]".to_string()
}

impl Default for ArticleSelectors {
    fn default() -> Self {
        Self {
            link: default_link_selector(),
            title: default_title_selector(),
            body: default_body_selector(),
            published: default_published_selector(),
        }
    }
}

/// A single source-crawl task.
///
/// # Browser profiles
///
/// `browser_profile` is an affinity tag. The empty string means the
/// *default* profile: any default-profile worker may serve the job, and
/// several workers may serve default jobs side by side. A non-empty value is
/// *exclusive*: every job carrying it is served by one worker's single
/// session for the whole run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CrawlJob {
    /// Stable identity of the source.
    pub name: String,
    /// Index page of the source.
    pub url: String,
    #[serde(default)]
    pub crawl_type: CrawlType,
    #[serde(default)]
    pub browser_profile: String,
    /// When the source was last enqueued; `None` if it never was.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_interval_minutes: i64,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_articles")]
    pub max_articles: usize,
    #[serde(default)]
    pub selectors: ArticleSelectors,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_articles() -> usize {
    30
}

/// Whether a job may be crawled in the current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Due,
    /// The re-crawl interval has not elapsed yet.
    Waiting { remaining_minutes: i64 },
}

impl CrawlJob {
    /// Build a newspaper job with default metadata.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            crawl_type: CrawlType::Newspaper,
            browser_profile: String::new(),
            last_run: None,
            min_interval_minutes: 0,
            language: default_language(),
            max_articles: default_max_articles(),
            selectors: ArticleSelectors::default(),
        }
    }

    /// Set the browser profile this job must be served with.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.browser_profile = profile.into();
        self
    }

    /// Set the re-crawl interval and the time of the previous run.
    pub fn with_interval(mut self, min_interval_minutes: i64, last_run: Option<DateTime<Utc>>) -> Self {
        self.min_interval_minutes = min_interval_minutes;
        self.last_run = last_run;
        self
    }

    pub fn is_default_profile(&self) -> bool {
        self.browser_profile.is_empty()
    }

    /// Decide eligibility at `now`.
    ///
    /// Elapsed time is counted in whole minutes and must be strictly greater
    /// than `min_interval_minutes`. A job that never ran is always due.
    pub fn eligibility(&self, now: DateTime<Utc>) -> Eligibility {
        let Some(last_run) = self.last_run else {
            return Eligibility::Due;
        };
        let minutes_passed = (now - last_run).num_minutes();
        if minutes_passed > self.min_interval_minutes {
            Eligibility::Due
        } else {
            Eligibility::Waiting {
                remaining_minutes: self.min_interval_minutes - minutes_passed,
            }
        }
    }
}

/// A scraped news article.
///
/// `id` is the article's identity: two articles with the same `id` are the
/// same article regardless of their other fields.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    pub id: String,
    pub topic: String,
    pub href: String,
    pub published: Option<DateTime<Utc>>,
    /// Name of the source the article was found on.
    pub newspaper: String,
    pub body: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl Article {
    /// Build an article identified by its URL.
    pub fn new(href: impl Into<String>, topic: impl Into<String>, job: &CrawlJob) -> Self {
        let href = href.into();
        Self {
            id: href.clone(),
            topic: topic.into(),
            href,
            published: None,
            newspaper: job.name.clone(),
            body: String::new(),
            language: job.language.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_job_ran_five_minutes_ago_waits() {
        let now = Utc::now();
        let job = CrawlJob::new("vnexpress", "https://vnexpress.net")
            .with_interval(10, Some(now - Duration::minutes(5)));

        assert_eq!(
            job.eligibility(now),
            Eligibility::Waiting { remaining_minutes: 5 }
        );
    }

    #[test]
    fn test_job_ran_fifteen_minutes_ago_is_due() {
        let now = Utc::now();
        let job = CrawlJob::new("vnexpress", "https://vnexpress.net")
            .with_interval(10, Some(now - Duration::minutes(15)));

        assert_eq!(job.eligibility(now), Eligibility::Due);
    }

    #[test]
    fn test_interval_boundary_is_not_due() {
        let now = Utc::now();
        let job = CrawlJob::new("a", "https://a.example")
            .with_interval(10, Some(now - Duration::seconds(10 * 60 + 59)));

        assert_eq!(
            job.eligibility(now),
            Eligibility::Waiting { remaining_minutes: 0 }
        );
    }

    #[test]
    fn test_never_run_job_is_due() {
        let job = CrawlJob::new("a", "https://a.example").with_interval(600, None);
        assert_eq!(job.eligibility(Utc::now()), Eligibility::Due);
    }

    #[test]
    fn test_default_profile() {
        let job = CrawlJob::new("a", "https://a.example");
        assert!(job.is_default_profile());
        assert!(!job.with_profile("facebook").is_default_profile());
    }

    #[test]
    fn test_job_deserialization_defaults() {
        let yaml = r#"
name: tuoitre
url: https://tuoitre.vn
"#;
        let job: CrawlJob = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.crawl_type, CrawlType::Newspaper);
        assert_eq!(job.browser_profile, "");
        assert_eq!(job.last_run, None);
        assert_eq!(job.max_articles, 30);
        assert_eq!(job.selectors, ArticleSelectors::default());
    }

    #[test]
    fn test_unknown_crawl_type_is_reserved() {
        let yaml = r#"
name: fanpage
url: https://facebook.com/somepage
crawl_type: facebook
browser_profile: fb_account
"#;
        let job: CrawlJob = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(job.crawl_type, CrawlType::Reserved);
        assert_eq!(job.browser_profile, "fb_account");
    }

    #[test]
    fn test_article_identity_is_href() {
        let job = CrawlJob::new("vnexpress", "https://vnexpress.net");
        let article = Article::new("https://vnexpress.net/a-1.html", "Headline", &job);

        assert_eq!(article.id, article.href);
        assert_eq!(article.newspaper, "vnexpress");
        assert_eq!(article.language, "en");
    }

    #[test]
    fn test_article_serialization() {
        let job = CrawlJob::new("vnexpress", "https://vnexpress.net");
        let article = Article::new("https://vnexpress.net/a-1.html", "Headline", &job);

        let json = serde_json::to_string(&article).unwrap();
        let back: Article = serde_json::from_str(&json).unwrap();
        assert_eq!(back, article);
    }
}
