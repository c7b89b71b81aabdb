//! Client for the external performance oracle.
//!
//! Collects mobile and desktop telemetry for one URL, projecting the
//! oracle's nested JSON into [`PerfReport`] while preserving every audit
//! id. Transient failures are retried twice with jittered backoff;
//! authentication and quota failures are not. A report older than the
//! staleness window, or carrying an error marker, is stale.

use std::time::Duration;

use chrono::Utc;
use geoscope_fetch::RetryPolicy;
use geoscope_types::perf::{
    AuditRecord, CoreWebVitals, Opportunity, PerfMetadata, PerfReport, PerformancePair,
};
use geoscope_types::{AuditError, Result};
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

/// Per-strategy call timeout.
const ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Client for the performance oracle endpoint.
pub struct PerformanceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl PerformanceClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(ORACLE_TIMEOUT)
            .build()
            .map_err(|e| AuditError::internal(format!("failed to build http client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            api_key,
            // Two retries on transient failure.
            retry: RetryPolicy::new(2, Duration::from_secs(2), Duration::from_secs(60)),
        })
    }

    /// Collect mobile and desktop reports concurrently. One failing
    /// strategy yields an errored report; both failing is an error.
    pub async fn fetch_performance(&self, url: &str) -> Result<PerformancePair> {
        let (mobile, desktop) = futures::join!(
            self.fetch_strategy(url, "mobile"),
            self.fetch_strategy(url, "desktop")
        );

        match (mobile, desktop) {
            (Ok(mobile), Ok(desktop)) => Ok(PerformancePair { mobile, desktop }),
            (Ok(mobile), Err(e)) => {
                warn!(url = %url, error = %e, "desktop performance collection failed");
                Ok(PerformancePair {
                    mobile,
                    desktop: PerfReport::errored(e.to_string()),
                })
            }
            (Err(e), Ok(desktop)) => {
                warn!(url = %url, error = %e, "mobile performance collection failed");
                Ok(PerformancePair {
                    mobile: PerfReport::errored(e.to_string()),
                    desktop,
                })
            }
            (Err(mobile_err), Err(_)) => Err(mobile_err),
        }
    }

    async fn fetch_strategy(&self, url: &str, strategy: &str) -> Result<PerfReport> {
        let mut last_error = None;
        for attempt in 0..=self.retry.max_attempts {
            match self.call_oracle(url, strategy).await {
                Ok(report) => {
                    if attempt > 0 {
                        debug!(url = %url, strategy = strategy, attempt = attempt, "oracle call succeeded after retry");
                    }
                    return Ok(report);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay(attempt);
                    debug!(url = %url, strategy = strategy, attempt = attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying oracle call");
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| AuditError::internal("oracle retry loop exhausted")))
    }

    async fn call_oracle(&self, url: &str, strategy: &str) -> Result<PerfReport> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("url", url), ("strategy", strategy)]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("key", key.as_str())]);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AuditError::timeout(format!("performance oracle for {}", url), 60)
            } else {
                AuditError::network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(AuditError::from_status(status));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AuditError::parse(format!("performance oracle response: {}", e)))?;
        Ok(project_report(&body))
    }
}

/// True when the report is older than `max_age` or marked errored.
pub fn is_stale(report: &PerfReport, max_age: chrono::Duration) -> bool {
    if report.metadata.error.is_some() {
        return true;
    }
    report.metadata.fetched_at < Utc::now() - max_age
}

/// Project the oracle's nested document into a `PerfReport`. Every audit
/// id under `lighthouseResult.audits` lands in either the opportunity map
/// or the diagnostics map; category maps reference them by audit ref.
fn project_report(body: &Value) -> PerfReport {
    let lighthouse = body.get("lighthouseResult").unwrap_or(body);
    let categories = lighthouse.get("categories");
    let audits = lighthouse.get("audits").and_then(Value::as_object);

    let category_score = |name: &str| -> Option<f64> {
        categories?
            .get(name)?
            .get("score")?
            .as_f64()
            .map(|s| (s * 100.0).round())
    };

    let mut opportunities = std::collections::BTreeMap::new();
    let mut diagnostics = std::collections::BTreeMap::new();

    if let Some(audits) = audits {
        for (id, audit) in audits {
            let details_type = audit
                .get("details")
                .and_then(|d| d.get("type"))
                .and_then(Value::as_str);
            if details_type == Some("opportunity") {
                opportunities.insert(
                    id.clone(),
                    Opportunity {
                        id: id.clone(),
                        title: audit
                            .get("title")
                            .and_then(Value::as_str)
                            .unwrap_or(id)
                            .to_string(),
                        display_value: audit
                            .get("displayValue")
                            .and_then(Value::as_str)
                            .map(String::from),
                        numeric_value: audit.get("numericValue").and_then(Value::as_f64),
                        severity: audit.get("score").and_then(Value::as_f64).map(|s| 1.0 - s),
                    },
                );
            } else {
                diagnostics.insert(id.clone(), audit_record(id, audit));
            }
        }
    }

    let category_audits = |name: &str| -> std::collections::BTreeMap<String, AuditRecord> {
        let mut map = std::collections::BTreeMap::new();
        let refs = categories
            .and_then(|c| c.get(name))
            .and_then(|c| c.get("auditRefs"))
            .and_then(Value::as_array);
        if let (Some(refs), Some(audits)) = (refs, audits) {
            for audit_ref in refs {
                let Some(id) = audit_ref.get("id").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(audit) = audits.get(id) {
                    map.insert(id.to_string(), audit_record(id, audit));
                }
            }
        }
        map
    };

    let vital = |id: &str| -> Option<f64> {
        audits?.get(id)?.get("numericValue")?.as_f64()
    };

    PerfReport {
        performance_score: category_score("performance"),
        accessibility_score: category_score("accessibility"),
        best_practices_score: category_score("best-practices"),
        seo_score: category_score("seo"),
        vitals: CoreWebVitals {
            lcp_ms: vital("largest-contentful-paint"),
            inp_ms: vital("interaction-to-next-paint"),
            cls: audits
                .and_then(|a| a.get("cumulative-layout-shift"))
                .and_then(|a| a.get("numericValue"))
                .and_then(Value::as_f64),
            fcp_ms: vital("first-contentful-paint"),
            ttfb_ms: vital("server-response-time"),
        },
        opportunities,
        diagnostics,
        accessibility_audits: category_audits("accessibility"),
        seo_audits: category_audits("seo"),
        best_practices_audits: category_audits("best-practices"),
        metadata: PerfMetadata {
            fetched_at: Utc::now(),
            oracle_version: lighthouse
                .get("lighthouseVersion")
                .and_then(Value::as_str)
                .map(String::from),
            user_agent: lighthouse
                .get("userAgent")
                .and_then(Value::as_str)
                .map(String::from),
            error: None,
        },
    }
}

fn audit_record(id: &str, audit: &Value) -> AuditRecord {
    AuditRecord {
        id: id.to_string(),
        title: audit
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or(id)
            .to_string(),
        score: audit.get("score").and_then(Value::as_f64),
        display_value: audit
            .get("displayValue")
            .and_then(Value::as_str)
            .map(String::from),
        description: audit
            .get("description")
            .and_then(Value::as_str)
            .map(String::from),
    }
}
