//! Audit pipeline orchestrator.
//!
//! [`Orchestrator::run`] drives one audit through its nine fixed stages,
//! emitting a progress event as each completes and committing results to
//! the store at stage boundaries. Validation and seed failures are fatal;
//! crawl, discovery, competitor, and performance failures degrade to
//! warnings and set the `incomplete` flag the synthesizer sees.
//! [`Orchestrator::regenerate`] re-runs only the performance and
//! synthesis stages under a per-audit mutex.
//!
//! Reading an audit record never triggers performance collection; the
//! oracle is called only from stage 7 and from an explicit regeneration.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use geoscope_crawler::{
    best_page, CrawlConfig, Crawler, COMPETITOR_CONCURRENCY, PRIMARY_CONCURRENCY,
};
use geoscope_fetch::{ssrf, FetchConfig, Fetcher};
use geoscope_intelligence::{IntelligenceAgents, SynthesisInput};
use geoscope_performance::{is_stale, PerformanceClient};
use geoscope_persistence::AuditStore;
use geoscope_search::{create_search_provider, SearchProvider};
use geoscope_types::{
    AppConfig, Audit, AuditError, AuditResults, AuditStatus, AuxiliaryContext, PageReport,
    ProgressSink, ProgressUpdate, Result, SearchResult, Stage,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use url::Url;

/// Hosts never proposed as competitors.
const SOCIAL_HOSTS: [&str; 10] = [
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "linkedin.com",
    "youtube.com",
    "tiktok.com",
    "pinterest.com",
    "reddit.com",
    "wikipedia.org",
];

/// Discovered competitors kept per audit.
const MAX_DISCOVERED_COMPETITORS: usize = 3;
/// Crawl cap for each competitor site.
const COMPETITOR_CRAWL_CAP: usize = 5;

/// Sequences the audit stages against the configured collaborators.
pub struct Orchestrator {
    config: AppConfig,
    crawler: Crawler,
    performance: Option<PerformanceClient>,
    search: Arc<dyn SearchProvider>,
    agents: IntelligenceAgents,
    store: Arc<dyn AuditStore>,
    regen_locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl Orchestrator {
    pub fn new(config: AppConfig, store: Arc<dyn AuditStore>) -> Result<Self> {
        let fetcher = Arc::new(Fetcher::new(FetchConfig {
            timeout: Duration::from_secs(config.fetch_timeout_secs),
            allow_loopback: config.ssrf_allow_loopback,
            ..FetchConfig::default()
        })?);
        let performance = match &config.perf_oracle_url {
            Some(url) => Some(PerformanceClient::new(
                url.clone(),
                config.perf_oracle_key.clone(),
            )?),
            None => None,
        };
        Ok(Self {
            crawler: Crawler::new(fetcher),
            performance,
            search: create_search_provider(&config)?,
            agents: IntelligenceAgents::from_config(&config)?,
            store,
            config,
            regen_locks: DashMap::new(),
        })
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Run one audit to completion. Returns the fatal error, if any; the
    /// caller owns the failed-status transition so that infrastructure
    /// failures can be retried first.
    #[instrument(skip(self, cancel, sink), fields(audit_id = audit_id))]
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        audit_id: i64,
        sink: &dyn ProgressSink,
    ) -> Result<()> {
        let audit = self.store.get(audit_id).await?;
        let mut warnings: Vec<String> = Vec::new();
        let mut stage_errors: Vec<String> = Vec::new();
        let mut results = AuditResults::default();

        self.store
            .update_status(audit_id, AuditStatus::Running, 0, None, None)
            .await?;
        sink.emit(
            ProgressUpdate::new(audit_id, "start", 0).with_status(AuditStatus::Running),
        );

        let outcome = self
            .run_stages(
                cancel,
                &audit,
                sink,
                &mut results,
                &mut warnings,
                &mut stage_errors,
            )
            .await;

        // Whatever happened, persist what was learned so far.
        self.store.set_results(audit_id, results).await?;
        self.store.add_warnings(audit_id, warnings).await?;

        match outcome {
            Ok(()) => {
                self.store
                    .update_status(
                        audit_id,
                        AuditStatus::Completed,
                        100,
                        Some(Stage::Finalize.label().to_string()),
                        None,
                    )
                    .await?;
                sink.emit(
                    ProgressUpdate::new(audit_id, Stage::Finalize.label(), 100)
                        .with_status(AuditStatus::Completed),
                );
                info!(audit_id = audit_id, "audit completed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn run_stages(
        &self,
        cancel: &CancellationToken,
        audit: &Audit,
        sink: &dyn ProgressSink,
        results: &mut AuditResults,
        warnings: &mut Vec<String>,
        stage_errors: &mut Vec<String>,
    ) -> Result<()> {
        let audit_id = audit.id;

        // Stage 1: validate. Fatal.
        let seed = self.validate_seed(&audit.config.seed_url).await?;
        self.commit_stage(audit_id, Stage::Validate, sink, None).await?;

        // Stage 2: seed fetch & analyze. Fatal.
        self.ensure_live(cancel)?;
        let crawl_config = CrawlConfig {
            cap: self.config.effective_crawl_cap(audit.config.crawl_cap),
            concurrency: PRIMARY_CONCURRENCY,
            allow_subdomains: false,
            language: audit.config.language,
            mobile: false,
            timeout: Duration::from_secs(audit.config.fetch_timeout_secs),
        };
        let seed_page = self.crawler.fetch_page(&seed, &crawl_config).await?;
        if let (Some(submitted), Some(landed)) = (seed.host_str(), seed_page.final_url.host_str()) {
            if submitted != landed {
                warnings.push(format!("seed redirected cross-origin to {}", landed));
            }
        }
        results.target_audit = Some(seed_page.report.clone());
        self.commit_stage(audit_id, Stage::SeedFetch, sink, None).await?;

        // Stage 3: crawl. Non-fatal errors.
        self.ensure_live(cancel)?;
        let cap = crawl_config.cap;
        let crawl = self
            .crawler
            .crawl(cancel, &seed_page, &crawl_config, |pages| {
                let scaled = Stage::SeedFetch.percent()
                    + ((pages * (Stage::Crawl.percent() - Stage::SeedFetch.percent()) as usize)
                        / cap.max(1)) as u8;
                sink.emit(
                    ProgressUpdate::new(
                        audit_id,
                        Stage::Crawl.label(),
                        scaled.min(Stage::Crawl.percent() - 1),
                    )
                    .with_message(format!("{} pages crawled", pages)),
                );
            })
            .await;
        if crawl.canceled {
            return Err(AuditError::Canceled);
        }
        for error in &crawl.errors {
            stage_errors.push(format!("crawl {}: {} ({})", error.url, error.message, error.kind));
        }
        let mut site_pages = vec![seed_page.report.clone()];
        site_pages.extend(crawl.pages);
        if let Some(best) = best_page(&site_pages) {
            if best.url != seed_page.report.url {
                info!(audit_id = audit_id, url = %best.url, "selected best page as audit target");
            }
            results.target_audit = Some(best.clone());
        }
        let target = results
            .target_audit
            .clone()
            .ok_or_else(|| AuditError::internal("no target page after crawl"))?;
        self.commit_results(audit_id, results).await?;
        self.commit_stage(
            audit_id,
            Stage::Crawl,
            sink,
            Some(format!("{} pages analyzed", site_pages.len())),
        )
        .await?;

        // Stage 4: classifier. Non-fatal.
        self.ensure_live(cancel)?;
        let classification = self.agents.classify(&target).await;
        warnings.extend(classification.warnings);
        let classifier_degraded = classification.used_fallback;
        let intelligence = classification.value;
        results.external_intelligence = Some(intelligence.clone());
        self.commit_results(audit_id, results).await?;
        self.commit_stage(audit_id, Stage::Classify, sink, None).await?;

        // Stage 5: competitor discovery. Non-fatal.
        self.ensure_live(cancel)?;
        let own_origin = origin_key(&seed_page.final_url);
        for query in intelligence.search_queries.iter().take(5) {
            match self
                .search
                .search(query, 10, audit.config.market)
                .await
            {
                Ok(hits) => {
                    results.search_results.extend(hits.into_iter().map(|hit| SearchResult {
                        query: query.clone(),
                        link: hit.link,
                        title: hit.title,
                        snippet: hit.snippet,
                    }));
                }
                Err(e) => {
                    stage_errors.push(format!("discovery \"{}\": {} ({})", query, e, e.kind()));
                }
            }
        }
        let mut competitor_urls = discovered_competitors(&results.search_results, &own_origin);
        for explicit in &audit.config.competitors {
            if let Ok(url) = Url::parse(explicit) {
                let key = origin_key(&url);
                if key != own_origin
                    && !competitor_urls.iter().any(|u: &Url| origin_key(u) == key)
                {
                    competitor_urls.push(url);
                }
            } else {
                warnings.push(format!("ignoring unparseable competitor url: {}", explicit));
            }
        }
        self.commit_results(audit_id, results).await?;
        self.commit_stage(
            audit_id,
            Stage::CompetitorDiscovery,
            sink,
            Some(format!("{} competitors selected", competitor_urls.len())),
        )
        .await?;

        // Stage 6: competitor audits. Non-fatal per competitor.
        for competitor in &competitor_urls {
            self.ensure_live(cancel)?;
            match self.audit_competitor(cancel, competitor, audit.config.language).await {
                Ok(report) => results.competitor_audits.push(report),
                Err(e) => {
                    stage_errors.push(format!(
                        "competitor {}: {} ({})",
                        competitor.host_str().unwrap_or("unknown"),
                        e,
                        e.kind()
                    ));
                }
            }
        }
        self.commit_results(audit_id, results).await?;
        self.commit_stage(
            audit_id,
            Stage::CompetitorAudits,
            sink,
            Some(format!("{} competitors audited", results.competitor_audits.len())),
        )
        .await?;

        // Stage 7: performance. Non-fatal.
        self.ensure_live(cancel)?;
        if let Some(client) = &self.performance {
            match client.fetch_performance(&target.url).await {
                Ok(pair) => results.pagespeed_data = Some(pair),
                Err(e) => stage_errors.push(format!("performance: {} ({})", e, e.kind())),
            }
        }
        self.commit_results(audit_id, results).await?;
        self.commit_stage(audit_id, Stage::Performance, sink, None).await?;

        // Stage 8: synthesize. The deterministic fallback makes an LLM
        // outage non-fatal; only an empty report would be.
        self.ensure_live(cancel)?;
        let incomplete = !stage_errors.is_empty() || classifier_degraded;
        warnings.extend(stage_errors.iter().cloned());
        let synthesis = self
            .agents
            .synthesize(&SynthesisInput {
                target: &target,
                site_pages: &site_pages,
                competitors: &results.competitor_audits,
                intelligence: &intelligence,
                performance: results.pagespeed_data.as_ref(),
                aux: &AuxiliaryContext::default(),
                incomplete,
            })
            .await;
        warnings.extend(synthesis.warnings);
        if synthesis.value.report_markdown.trim().is_empty() {
            return Err(AuditError::internal("synthesizer produced an empty report"));
        }
        results.report_markdown = Some(synthesis.value.report_markdown);
        results.fix_plan = synthesis.value.fix_plan;
        self.commit_results(audit_id, results).await?;
        self.commit_stage(audit_id, Stage::Synthesize, sink, None).await?;

        // Stage 9 (finalize) is committed by the caller: once it begins,
        // cancellation no longer applies.
        Ok(())
    }

    /// Re-run performance collection and synthesis for a completed audit.
    /// At most one regeneration runs per audit; a concurrent second call
    /// fails with `conflict` instead of queueing.
    pub async fn regenerate(&self, audit_id: i64, force_perf: bool) -> Result<Audit> {
        let lock = self
            .regen_locks
            .entry(audit_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let Ok(_guard) = lock.try_lock() else {
            return Err(AuditError::Conflict {
                message: format!("a regeneration is already running for audit {}", audit_id),
            });
        };

        let audit = self.store.get(audit_id).await?;
        if audit.status != AuditStatus::Completed {
            return Err(AuditError::Conflict {
                message: format!("audit {} is not completed", audit_id),
            });
        }
        let mut results = audit.results.clone();
        let target = results
            .target_audit
            .clone()
            .ok_or_else(|| AuditError::internal("completed audit has no target page"))?;

        let staleness = chrono::Duration::hours(self.config.perf_staleness_hours);
        let needs_performance = force_perf
            || match &results.pagespeed_data {
                Some(pair) => is_stale(&pair.mobile, staleness) || is_stale(&pair.desktop, staleness),
                None => true,
            };
        let mut warnings = Vec::new();
        if needs_performance {
            if let Some(client) = &self.performance {
                match client.fetch_performance(&target.url).await {
                    Ok(pair) => results.pagespeed_data = Some(pair),
                    Err(e) => warnings.push(format!("performance: {} ({})", e, e.kind())),
                }
            }
        }

        let intelligence = results
            .external_intelligence
            .clone()
            .unwrap_or_else(|| geoscope_types::ExternalIntelligence::offline_default("site"));
        let site_pages = std::slice::from_ref(&target);
        let synthesis = self
            .agents
            .synthesize(&SynthesisInput {
                target: &target,
                site_pages,
                competitors: &results.competitor_audits,
                intelligence: &intelligence,
                performance: results.pagespeed_data.as_ref(),
                aux: &AuxiliaryContext::default(),
                incomplete: false,
            })
            .await;
        warnings.extend(synthesis.warnings);

        // Snapshot the prior report, then overwrite atomically.
        results.previous_report_markdown = results.report_markdown.take();
        results.report_markdown = Some(synthesis.value.report_markdown);
        results.fix_plan = synthesis.value.fix_plan;
        self.store.set_results(audit_id, results).await?;
        self.store.add_warnings(audit_id, warnings).await?;

        info!(audit_id = audit_id, force_perf = force_perf, "report regenerated");
        self.store.get(audit_id).await
    }

    async fn validate_seed(&self, raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|_| AuditError::invalid_config(format!("seed url does not parse: {}", raw)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AuditError::invalid_config(format!(
                "seed url must be http(s): {}",
                raw
            )));
        }
        ssrf::ensure_public_host(&url, self.config.ssrf_allow_loopback).await?;
        Ok(url)
    }

    async fn audit_competitor(
        &self,
        cancel: &CancellationToken,
        url: &Url,
        language: geoscope_types::Language,
    ) -> Result<PageReport> {
        let config = CrawlConfig {
            cap: COMPETITOR_CRAWL_CAP,
            concurrency: COMPETITOR_CONCURRENCY,
            allow_subdomains: false,
            language,
            mobile: false,
            timeout: Duration::from_secs(self.config.fetch_timeout_secs),
        };
        let seed_page = self.crawler.fetch_page(url, &config).await?;
        let crawl = self.crawler.crawl(cancel, &seed_page, &config, |_| {}).await;
        if crawl.canceled {
            return Err(AuditError::Canceled);
        }
        let mut pages = vec![seed_page.report];
        pages.extend(crawl.pages);
        best_page(&pages)
            .cloned()
            .ok_or_else(|| AuditError::internal("competitor crawl produced no pages"))
    }

    fn ensure_live(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            Err(AuditError::Canceled)
        } else {
            Ok(())
        }
    }

    async fn commit_stage(
        &self,
        audit_id: i64,
        stage: Stage,
        sink: &dyn ProgressSink,
        message: Option<String>,
    ) -> Result<()> {
        self.store
            .update_status(
                audit_id,
                AuditStatus::Running,
                stage.percent(),
                Some(stage.label().to_string()),
                None,
            )
            .await?;
        let mut update = ProgressUpdate::new(audit_id, stage.label(), stage.percent());
        if let Some(message) = message {
            update = update.with_message(message);
        }
        sink.emit(update);
        Ok(())
    }

    async fn commit_results(&self, audit_id: i64, results: &AuditResults) -> Result<()> {
        self.store.set_results(audit_id, results.clone()).await
    }
}

/// Pick up to three competitor origins from discovery hits, skipping
/// social networks, the target's own origin, and institutional domains.
fn discovered_competitors(hits: &[SearchResult], own_origin: &str) -> Vec<Url> {
    let mut selected: Vec<Url> = Vec::new();
    for hit in hits {
        if selected.len() >= MAX_DISCOVERED_COMPETITORS {
            break;
        }
        let Ok(url) = Url::parse(&hit.link) else {
            continue;
        };
        let Some(host) = url.host_str().map(|h| h.to_lowercase()) else {
            continue;
        };
        let bare = strip_www(&host);
        let key = origin_key(&url);
        if key == own_origin
            || bare.ends_with(".edu")
            || bare.ends_with(".gov")
            || SOCIAL_HOSTS
                .iter()
                .any(|social| bare == *social || bare.ends_with(&format!(".{}", social)))
        {
            continue;
        }
        if selected.iter().any(|existing| origin_key(existing) == key) {
            continue;
        }
        // Audit the competitor from its site root.
        let mut root = url.clone();
        root.set_path("/");
        root.set_query(None);
        root.set_fragment(None);
        selected.push(root);
    }
    selected
}

/// Dedup identity for competitor selection: host (minus `www.`) plus
/// effective port.
fn origin_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_lowercase();
    format!(
        "{}:{}",
        strip_www(&host),
        url.port_or_known_default().unwrap_or(0)
    )
}

fn strip_www(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_string()
}
