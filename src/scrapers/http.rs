//! HTTP-backed session and fetcher.
//!
//! [`HttpSession`] stands in for a browser: each worker gets its own
//! `reqwest` client with a private cookie store, so a profile's login
//! cookies stay with the one worker serving that profile. [`HttpFetcher`]
//! scrapes a source in two phases:
//!
//! 1. **Indexing**: download the source's index page and collect article
//!    links with the job's `link` selector
//! 2. **Fetching**: download each article (up to `max_articles`) and pull
//!    out title, body and publication date
//!
//! Articles that fail to download or parse are logged and skipped without
//! failing the job. Profile headers from the configuration are sent with
//! every request made for a job carrying that profile.

use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::collaborators::{ArticleFetcher, BrowserSession, SessionLauncher};
use crate::config::ProfileConfig;
use crate::error::{FetchError, SessionError};
use crate::models::{Article, ArticleSelectors, CrawlJob};
use crate::scrapers::retry::{PageGet, RetryGet};
use crate::utils::{normalize_whitespace, truncate_for_log};

/// One worker's HTTP client.
#[derive(Debug)]
pub struct HttpSession {
    id: String,
    client: reqwest::Client,
    profile: OnceLock<String>,
    closed: AtomicBool,
}

impl HttpSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Bind the session to the profile of the first job it serves.
    fn bind_profile(&self, profile: &str) {
        if self.profile.set(profile.to_string()).is_err() {
            if let Some(bound) = self.profile.get() {
                if bound != profile {
                    warn!(session = %self.id, bound = %bound, requested = %profile, "Session reused across profiles");
                }
            }
        }
    }

    fn client(&self) -> Result<&reqwest::Client, FetchError> {
        if self.is_closed() {
            return Err(FetchError::SessionClosed(self.id.clone()));
        }
        Ok(&self.client)
    }
}

impl BrowserSession for HttpSession {
    fn profile(&self) -> Option<String> {
        self.profile.get().cloned()
    }

    async fn quit(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!(session = %self.id, "Session already closed");
        } else {
            debug!(session = %self.id, "Session closed");
        }
        Ok(())
    }
}

/// Launches one [`HttpSession`] per worker.
#[derive(Debug, Clone)]
pub struct HttpLauncher {
    user_agent: String,
    request_timeout: Duration,
}

impl HttpLauncher {
    pub fn new(user_agent: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            user_agent: user_agent.into(),
            request_timeout,
        }
    }
}

impl SessionLauncher for HttpLauncher {
    type Session = HttpSession;

    async fn launch(&self, worker: &str) -> Result<HttpSession, SessionError> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(self.request_timeout)
            .cookie_store(true)
            .build()
            .map_err(|e| SessionError::Launch {
                worker: worker.to_string(),
                reason: e.to_string(),
            })?;
        debug!(%worker, "Launched HTTP session");
        Ok(HttpSession {
            id: format!("session-{worker}"),
            client,
            profile: OnceLock::new(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Downloads pages through one session with a fixed set of headers.
struct SessionPage<'a> {
    session: &'a HttpSession,
    headers: &'a HeaderMap,
}

impl PageGet for SessionPage<'_> {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .session
            .client()?
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })
    }
}

/// Scrapes newspaper sources over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    profile_headers: HashMap<String, HeaderMap>,
    max_retries: usize,
    base_delay: Duration,
}

impl HttpFetcher {
    /// Build a fetcher sending each profile's configured headers.
    pub fn new(profiles: &BTreeMap<String, ProfileConfig>) -> Result<Self, FetchError> {
        let mut profile_headers = HashMap::new();
        for (profile, config) in profiles {
            let mut headers = HeaderMap::new();
            for (name, value) in &config.headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    FetchError::Other(format!("profile {profile}: invalid header name {name}: {e}"))
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| {
                    FetchError::Other(format!("profile {profile}: invalid value for header {name}: {e}"))
                })?;
                headers.insert(name, value);
            }
            profile_headers.insert(profile.clone(), headers);
        }
        Ok(Self {
            profile_headers,
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        })
    }
}

impl ArticleFetcher<HttpSession> for HttpFetcher {
    #[instrument(level = "info", skip_all, fields(job = %job.name, session = %session.id()))]
    async fn fetch(
        &self,
        job: &CrawlJob,
        session: &HttpSession,
        sink: &mut Vec<Article>,
    ) -> Result<(), FetchError> {
        session.bind_profile(&job.browser_profile);

        let no_headers = HeaderMap::new();
        let headers = self
            .profile_headers
            .get(&job.browser_profile)
            .unwrap_or(&no_headers);
        let pages = RetryGet::new(SessionPage { session, headers }, self.max_retries, self.base_delay);

        let base = Url::parse(&job.url).map_err(|source| FetchError::Url {
            url: job.url.clone(),
            source,
        })?;
        let index = pages.get(&job.url).await?;
        let links = extract_links(&index, &base, &job.selectors.link)?;
        info!(count = links.len(), "Indexed article links");

        for link in links.into_iter().take(job.max_articles) {
            let html = match pages.get(&link).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(%link, error = %e, "Article fetch failed");
                    continue;
                }
            };
            match extract_article(&html, &job.selectors)? {
                Some(parsed) => {
                    debug!(%link, body = %truncate_for_log(&parsed.body, 120), "Parsed article");
                    let mut article = Article::new(link, parsed.title, job);
                    article.body = parsed.body;
                    article.published = parsed.published;
                    sink.push(article);
                }
                None => warn!(%link, "Article page had no title; skipping"),
            }
        }

        Ok(())
    }
}

/// Fields extracted from one article page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArticle {
    pub title: String,
    pub body: String,
    pub published: Option<DateTime<Utc>>,
}

fn parse_selector(selector: &str) -> Result<Selector, FetchError> {
    Selector::parse(selector).map_err(|_| FetchError::Selector(selector.to_string()))
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

/// Collect absolute, deduplicated http(s) article links from an index page.
pub fn extract_links(html: &str, base: &Url, selector: &str) -> Result<Vec<String>, FetchError> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    let links = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .map(|mut url| {
            url.set_fragment(None);
            url.to_string()
        })
        .unique()
        .collect();
    Ok(links)
}

/// Extract title, body and publication date from an article page.
///
/// Returns `Ok(None)` when the page has no title.
pub fn extract_article(html: &str, selectors: &ArticleSelectors) -> Result<Option<ParsedArticle>, FetchError> {
    let title_selector = parse_selector(&selectors.title)?;
    let body_selector = parse_selector(&selectors.body)?;
    let published_selector = parse_selector(&selectors.published)?;
    let document = Html::parse_document(html);

    let title = document
        .select(&title_selector)
        .next()
        .map(element_text)
        .unwrap_or_default();
    if title.is_empty() {
        return Ok(None);
    }

    let body = document
        .select(&body_selector)
        .map(element_text)
        .filter(|paragraph| !paragraph.is_empty())
        .join("\n");

    let published = document.select(&published_selector).next().and_then(|element| {
        let raw = element
            .value()
            .attr("datetime")
            .or_else(|| element.value().attr("content"))
            .map(str::to_string)
            .unwrap_or_else(|| element_text(element));
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    });

    Ok(Some(ParsedArticle {
        title,
        body,
        published,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r##"
<html><body>
  <article><a href="/news/a-1.html">A</a></article>
  <article><a href="https://vnexpress.net/news/a-2.html#comments">B</a></article>
  <article><a href="/news/a-1.html">A again</a></article>
  <article><a href="mailto:desk@vnexpress.net">Mail</a></article>
  <nav><a href="/about">About</a></nav>
</body></html>
"##;

    const ARTICLE: &str = r#"
<html><body>
  <h1>  Storm   reaches
      the coast </h1>
  <time datetime="2025-05-06T08:30:00+07:00">6 May</time>
  <article>
    <p>First paragraph.</p>
    <p>   </p>
    <p>Second   paragraph.</p>
  </article>
</body></html>
"#;

    #[test]
    fn test_extract_links_resolves_and_dedupes() {
        let base = Url::parse("https://vnexpress.net").unwrap();
        let links = extract_links(INDEX, &base, "article a[href]").unwrap();
        assert_eq!(
            links,
            vec![
                "https://vnexpress.net/news/a-1.html",
                "https://vnexpress.net/news/a-2.html",
            ]
        );
    }

    #[test]
    fn test_extract_links_invalid_selector() {
        let base = Url::parse("https://vnexpress.net").unwrap();
        let err = extract_links(INDEX, &base, "a[").unwrap_err();
        assert!(matches!(err, FetchError::Selector(_)));
    }

    #[test]
    fn test_extract_article_fields() {
        let parsed = extract_article(ARTICLE, &ArticleSelectors::default())
            .unwrap()
            .unwrap();
        assert_eq!(parsed.title, "Storm reaches the coast");
        assert_eq!(parsed.body, "First paragraph.\nSecond paragraph.");
        assert_eq!(
            parsed.published.unwrap().to_rfc3339(),
            "2025-05-06T01:30:00+00:00"
        );
    }

    #[test]
    fn test_extract_article_without_title() {
        let parsed = extract_article("<html><body><p>x</p></body></html>", &ArticleSelectors::default()).unwrap();
        assert!(parsed.is_none());
    }

    #[tokio::test]
    async fn test_session_quit_is_idempotent_and_blocks_requests() {
        let launcher = HttpLauncher::new("newsdesk-test", Duration::from_secs(5));
        let session = launcher.launch("7").await.unwrap();
        assert_eq!(session.id(), "session-7");
        assert_eq!(session.profile(), None);

        session.bind_profile("paywalled");
        assert_eq!(session.profile().as_deref(), Some("paywalled"));

        session.quit().await.unwrap();
        session.quit().await.unwrap();
        assert!(session.is_closed());
        assert!(matches!(session.client(), Err(FetchError::SessionClosed(_))));
    }

    #[test]
    fn test_fetcher_rejects_invalid_profile_headers() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "broken".to_string(),
            ProfileConfig {
                headers: [("bad header".to_string(), "x".to_string())].into_iter().collect(),
            },
        );
        assert!(HttpFetcher::new(&profiles).is_err());
    }

    #[test]
    fn test_fetcher_builds_profile_headers() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "paywalled".to_string(),
            ProfileConfig {
                headers: [("Cookie".to_string(), "session=abc".to_string())].into_iter().collect(),
            },
        );
        let fetcher = HttpFetcher::new(&profiles).unwrap();
        assert_eq!(fetcher.profile_headers["paywalled"]["cookie"], "session=abc");
    }
}
