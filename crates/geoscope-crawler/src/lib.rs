//! Same-origin crawler with bounded concurrency.
//!
//! The crawler owns URL discovery for one audit: it normalizes and
//! deduplicates links, respects robots.txt, and drains the frontier with a
//! semaphore-bounded fan-out. Per-URL failures are collected, never fatal;
//! cancellation aborts in-flight fetches and returns partial results.

pub mod frontier;
pub mod url_norm;

use std::sync::Arc;
use std::time::Duration;

use geoscope_analyzer::{analyze, PageInput};
use geoscope_fetch::{Fetcher, RobotsManager};
use geoscope_types::{AuditError, Language, PageReport, Result};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::frontier::CrawlFrontier;

static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// Concurrent fetches for a primary site crawl.
pub const PRIMARY_CONCURRENCY: usize = 5;
/// Concurrent fetches for competitor crawls, kept lower so they never
/// starve the primary.
pub const COMPETITOR_CONCURRENCY: usize = 3;

/// Crawl parameters for one site.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub cap: usize,
    pub concurrency: usize,
    pub allow_subdomains: bool,
    pub language: Language,
    pub mobile: bool,
    pub timeout: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            cap: 50,
            concurrency: PRIMARY_CONCURRENCY,
            allow_subdomains: false,
            language: Language::En,
            mobile: false,
            timeout: Duration::from_secs(20),
        }
    }
}

/// A non-fatal failure for one URL.
#[derive(Debug, Clone)]
pub struct CrawlError {
    pub url: String,
    pub kind: &'static str,
    pub message: String,
}

impl CrawlError {
    fn new(url: &Url, error: &AuditError) -> Self {
        Self {
            url: url.to_string(),
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// A fetched and analyzed page plus its outbound links.
#[derive(Debug, Clone)]
pub struct AnalyzedPage {
    pub report: PageReport,
    pub links: Vec<Url>,
    pub final_url: Url,
}

/// Everything a crawl produced.
#[derive(Debug, Default)]
pub struct CrawlOutcome {
    pub pages: Vec<PageReport>,
    pub errors: Vec<CrawlError>,
    pub canceled: bool,
}

enum TaskOutput {
    Page(Box<AnalyzedPage>),
    RobotsSkipped,
    Failed(AuditError),
}

/// Crawler over a shared fetcher and robots cache.
#[derive(Clone)]
pub struct Crawler {
    fetcher: Arc<Fetcher>,
    robots: Arc<RobotsManager>,
}

impl Crawler {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        let robots = Arc::new(RobotsManager::new(fetcher.clone()));
        Self { fetcher, robots }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Fetch and analyze a single page. Server errors (5xx) are failures;
    /// client errors still produce a report with the status preserved.
    pub async fn fetch_page(&self, url: &Url, config: &CrawlConfig) -> Result<AnalyzedPage> {
        let fetched = self
            .fetcher
            .fetch_with_timeout(url.as_str(), config.language, config.mobile, config.timeout)
            .await?;
        if fetched.status >= 500 {
            return Err(AuditError::from_status(fetched.status));
        }

        let final_url = Url::parse(&fetched.final_url).unwrap_or_else(|_| url.clone());
        let report = analyze(&PageInput {
            url: final_url.as_str(),
            body: &fetched.body,
            content_type: fetched.content_type.as_deref(),
            status: fetched.status,
            truncated: fetched.truncated,
        });
        let links = extract_links(&fetched.body, fetched.content_type.as_deref(), &final_url);
        Ok(AnalyzedPage {
            report,
            links,
            final_url,
        })
    }

    /// Crawl outward from an already-fetched seed page until the frontier
    /// empties or the cap is reached. The seed itself is not re-fetched;
    /// its report is not included in the outcome.
    pub async fn crawl(
        &self,
        cancel: &CancellationToken,
        seed: &AnalyzedPage,
        config: &CrawlConfig,
        mut on_progress: impl FnMut(usize),
    ) -> CrawlOutcome {
        let mut frontier = CrawlFrontier::new(&seed.final_url, config.cap, config.allow_subdomains);
        for link in &seed.links {
            frontier.try_enqueue(link);
        }

        let tick = (config.cap / 20).max(1);
        let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let mut tasks: JoinSet<(Url, TaskOutput)> = JoinSet::new();
        let mut outcome = CrawlOutcome::default();
        let mut processed = 0usize;

        loop {
            // Fill available permits from the frontier.
            while let Ok(permit) = semaphore.clone().try_acquire_owned() {
                let Some(url) = frontier.next() else {
                    drop(permit);
                    break;
                };
                let crawler = self.clone();
                let task_config = config.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    if !crawler.robots.is_allowed(&url, task_config.mobile).await {
                        return (url, TaskOutput::RobotsSkipped);
                    }
                    match crawler.fetch_page(&url, &task_config).await {
                        Ok(page) => (url, TaskOutput::Page(Box::new(page))),
                        Err(e) => (url, TaskOutput::Failed(e)),
                    }
                });
            }

            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(processed = processed, "crawl canceled, aborting in-flight fetches");
                    tasks.shutdown().await;
                    outcome.canceled = true;
                    return outcome;
                }
                joined = tasks.join_next() => {
                    let Some(joined) = joined else { continue };
                    match joined {
                        Ok((url, TaskOutput::Page(page))) => {
                            processed += 1;
                            for link in &page.links {
                                frontier.try_enqueue(link);
                            }
                            debug!(url = %url, score = page.report.geo_score, "page crawled");
                            outcome.pages.push(page.report);
                            if processed % tick == 0 {
                                on_progress(processed);
                            }
                        }
                        Ok((url, TaskOutput::RobotsSkipped)) => {
                            debug!(url = %url, "skipped by robots.txt");
                        }
                        Ok((url, TaskOutput::Failed(error))) => {
                            outcome.errors.push(CrawlError::new(&url, &error));
                        }
                        Err(join_error) => {
                            outcome.errors.push(CrawlError {
                                url: String::new(),
                                kind: "internal",
                                message: format!("crawl task panicked: {}", join_error),
                            });
                        }
                    }
                }
            }
        }

        outcome
    }
}

/// Outbound links of an HTML document, resolved against its final URL.
fn extract_links(body: &[u8], content_type: Option<&str>, base: &Url) -> Vec<Url> {
    let is_html = content_type.map(|ct| ct.contains("html")).unwrap_or(true);
    if !is_html || body.is_empty() {
        return Vec::new();
    }
    let html = String::from_utf8_lossy(body);
    let document = Html::parse_document(&html);
    document
        .select(&ANCHORS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| base.join(href).ok())
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .collect()
}

/// Pick the page that best represents a site: highest GEO score, ties
/// broken by dimension scores in category order.
pub fn best_page(pages: &[PageReport]) -> Option<&PageReport> {
    pages.iter().max_by(|a, b| {
        a.geo_score
            .partial_cmp(&b.geo_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                for ((_, score_a), (_, score_b)) in
                    a.dimension_scores().iter().zip(b.dimension_scores().iter())
                {
                    match score_a.partial_cmp(score_b) {
                        Some(std::cmp::Ordering::Equal) | None => continue,
                        Some(order) => return order,
                    }
                }
                std::cmp::Ordering::Equal
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoscope_fetch::FetchConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_crawler() -> Crawler {
        let fetcher = Arc::new(
            Fetcher::new(FetchConfig {
                allow_loopback: true,
                ..FetchConfig::default()
            })
            .unwrap(),
        );
        Crawler::new(fetcher)
    }

    fn page_html(title: &str, links: &[&str]) -> String {
        let anchors: String = links
            .iter()
            .map(|l| format!("<a href=\"{}\">{}</a>", l, l))
            .collect();
        format!(
            "<html><head><meta charset=\"utf-8\"><title>{t}</title></head>\
             <body><h1>{t}</h1><p>Body copy for {t} that is long enough to \
             read like an answer.</p>{a}</body></html>",
            t = title,
            a = anchors
        )
    }

    async fn mount_page(server: &MockServer, route: &str, body: String) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    async fn seed_page(crawler: &Crawler, server: &MockServer, config: &CrawlConfig) -> AnalyzedPage {
        let url = Url::parse(&format!("{}/", server.uri())).unwrap();
        crawler.fetch_page(&url, config).await.unwrap()
    }

    #[tokio::test]
    async fn discovers_same_origin_links() {
        let server = MockServer::start().await;
        mount_page(&server, "/", page_html("home", &["/a", "/b", "https://elsewhere.com/x"])).await;
        mount_page(&server, "/a", page_html("a", &["/b"])).await;
        mount_page(&server, "/b", page_html("b", &[])).await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = test_crawler();
        let config = CrawlConfig {
            cap: 10,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let outcome = crawler.crawl(&cancel, &seed, &config, |_| {}).await;

        assert!(!outcome.canceled);
        assert_eq!(outcome.pages.len(), 2); // /a and /b, each once
        assert!(outcome.errors.is_empty());
    }

    #[tokio::test]
    async fn cap_limits_pages() {
        let server = MockServer::start().await;
        let many: Vec<String> = (0..20).map(|i| format!("/p{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        mount_page(&server, "/", page_html("home", &refs)).await;
        for route in &many {
            mount_page(&server, route, page_html(route, &[])).await;
        }
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = test_crawler();
        let config = CrawlConfig {
            cap: 5,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let outcome = crawler.crawl(&cancel, &seed, &config, |_| {}).await;

        // seed occupies one cap slot; at most cap-1 further pages fetched
        assert!(outcome.pages.len() <= 4);
        assert!(!outcome.pages.is_empty());
    }

    #[tokio::test]
    async fn robots_disallowed_pages_are_skipped_not_errored() {
        let server = MockServer::start().await;
        mount_page(&server, "/", page_html("home", &["/open", "/private/x"])).await;
        mount_page(&server, "/open", page_html("open", &[])).await;
        mount_page(&server, "/private/x", page_html("secret", &[])).await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("User-agent: *\nDisallow: /private\n"),
            )
            .mount(&server)
            .await;

        let crawler = test_crawler();
        let config = CrawlConfig {
            cap: 10,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let outcome = crawler.crawl(&cancel, &seed, &config, |_| {}).await;

        assert_eq!(outcome.pages.len(), 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.pages[0].url, format!("{}/open", server.uri()));
    }

    #[tokio::test]
    async fn server_errors_are_collected_not_fatal() {
        let server = MockServer::start().await;
        mount_page(&server, "/", page_html("home", &["/ok", "/broken"])).await;
        mount_page(&server, "/ok", page_html("ok", &[])).await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = test_crawler();
        let config = CrawlConfig {
            cap: 10,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let outcome = crawler.crawl(&cancel, &seed, &config, |_| {}).await;

        assert_eq!(outcome.pages.len(), 1);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].kind, "http_5xx");
    }

    #[tokio::test]
    async fn cancellation_returns_partial_outcome() {
        let server = MockServer::start().await;
        let many: Vec<String> = (0..30).map(|i| format!("/s{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        mount_page(&server, "/", page_html("home", &refs)).await;
        for route in &many {
            Mock::given(method("GET"))
                .and(path(route.as_str()))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "text/html")
                        .set_body_string(page_html(route, &[]))
                        .set_delay(Duration::from_secs(10)),
                )
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = test_crawler();
        let config = CrawlConfig {
            cap: 100,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel_clone.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = crawler.crawl(&cancel, &seed, &config, |_| {}).await;
        assert!(outcome.canceled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn progress_ticks_fire() {
        let server = MockServer::start().await;
        let many: Vec<String> = (0..6).map(|i| format!("/t{}", i)).collect();
        let refs: Vec<&str> = many.iter().map(String::as_str).collect();
        mount_page(&server, "/", page_html("home", &refs)).await;
        for route in &many {
            mount_page(&server, route, page_html(route, &[])).await;
        }
        Mock::given(method("GET"))
            .and(path("/robots.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let crawler = test_crawler();
        // cap 10 -> tick every max(1, 10/20) = 1 page
        let config = CrawlConfig {
            cap: 10,
            ..CrawlConfig::default()
        };
        let seed = seed_page(&crawler, &server, &config).await;
        let cancel = CancellationToken::new();
        let mut ticks = Vec::new();
        let outcome = crawler
            .crawl(&cancel, &seed, &config, |n| ticks.push(n))
            .await;
        assert_eq!(ticks.len(), outcome.pages.len());
    }

    #[test]
    fn best_page_breaks_ties_by_category_order() {
        let mut a = sample_report("https://example.com/a", 50.0);
        let mut b = sample_report("https://example.com/b", 50.0);
        a.structure.score = 80.0;
        b.structure.score = 60.0;
        let pages = vec![a, b];
        assert_eq!(best_page(&pages).unwrap().url, "https://example.com/a");
    }

    fn sample_report(url: &str, score: f64) -> PageReport {
        let input = PageInput {
            url,
            body: b"<html><body><h1>x</h1><p>body</p></body></html>",
            content_type: Some("text/html"),
            status: 200,
            truncated: false,
        };
        let mut report = analyze(&input);
        report.geo_score = score;
        report
    }
}
