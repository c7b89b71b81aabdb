//! Audit records, configuration, and fix-plan items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::ExternalIntelligence;
use crate::page::{Dimension, PageReport};
use crate::perf::PerformancePair;

/// Report language for fetched pages and generated reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    /// `Accept-Language` header value for page fetches.
    pub fn accept_language(self) -> &'static str {
        match self {
            Self::En => "en-US,en;q=0.9",
            Self::Es => "es-ES,es;q=0.9,en;q=0.5",
        }
    }
}

/// Target market tag; drives competitor discovery locale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Market {
    #[default]
    None,
    Us,
    Latam,
    Emea,
    Ar,
}

/// Per-audit configuration supplied at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub seed_url: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub market: Market,
    /// Explicit competitor URLs; merged with discovered competitors.
    #[serde(default)]
    pub competitors: Vec<String>,
    pub crawl_cap: usize,
    pub fetch_timeout_secs: u64,
}

impl AuditConfig {
    pub fn new(seed_url: impl Into<String>) -> Self {
        Self {
            seed_url: seed_url.into(),
            language: Language::default(),
            market: Market::default(),
            competitors: Vec::new(),
            crawl_cap: 50,
            fetch_timeout_secs: 20,
        }
    }

    pub fn with_crawl_cap(mut self, cap: usize) -> Self {
        self.crawl_cap = cap;
        self
    }

    pub fn with_competitors(mut self, competitors: Vec<String>) -> Self {
        self.competitors = competitors;
        self
    }
}

/// Audit lifecycle states. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AuditStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Pipeline stages in execution order, with the progress percent reported
/// when each completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    SeedFetch,
    Crawl,
    Classify,
    CompetitorDiscovery,
    CompetitorAudits,
    Performance,
    Synthesize,
    Finalize,
}

impl Stage {
    pub fn percent(self) -> u8 {
        match self {
            Self::Validate => 5,
            Self::SeedFetch => 15,
            Self::Crawl => 35,
            Self::Classify => 45,
            Self::CompetitorDiscovery => 55,
            Self::CompetitorAudits => 75,
            Self::Performance => 85,
            Self::Synthesize => 95,
            Self::Finalize => 100,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::SeedFetch => "seed_fetch",
            Self::Crawl => "crawl",
            Self::Classify => "classify",
            Self::CompetitorDiscovery => "competitor_discovery",
            Self::CompetitorAudits => "competitor_audits",
            Self::Performance => "performance",
            Self::Synthesize => "synthesize",
            Self::Finalize => "finalize",
        }
    }
}

/// Priority of a single remediation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixPriority {
    Low,
    Medium,
    High,
    Critical,
}

/// One prioritized recommendation from the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixItem {
    pub issue: String,
    pub priority: FixPriority,
    /// Path the fix applies to, or "site" for site-wide items.
    pub page: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    pub recommended_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Dimension>,
}

/// One raw competitor-discovery hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    pub link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Result fields populated over the course of a run. Overwritten atomically
/// as a unit by `SetResults`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_audit: Option<PageReport>,
    #[serde(default)]
    pub competitor_audits: Vec<PageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_intelligence: Option<ExternalIntelligence>,
    #[serde(default)]
    pub search_results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagespeed_data: Option<PerformancePair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_markdown: Option<String>,
    #[serde(default)]
    pub fix_plan: Vec<FixItem>,
    /// Markdown snapshot from before the most recent regeneration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_report_markdown: Option<String>,
}

/// Top-level unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub id: i64,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_email: Option<String>,
    pub config: AuditConfig,
    pub status: AuditStatus,
    /// 0-100, monotonic non-decreasing while running.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Non-fatal stage errors, e.g. one unreachable competitor.
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub results: AuditResults,
}

impl Audit {
    pub fn new(id: i64, owner_id: impl Into<String>, config: AuditConfig) -> Self {
        Self {
            id,
            owner_id: owner_id.into(),
            owner_email: None,
            config,
            status: AuditStatus::Pending,
            progress: 0,
            current_stage: None,
            error: None,
            warnings: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            results: AuditResults::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_percents_are_increasing() {
        let stages = [
            Stage::Validate,
            Stage::SeedFetch,
            Stage::Crawl,
            Stage::Classify,
            Stage::CompetitorDiscovery,
            Stage::CompetitorAudits,
            Stage::Performance,
            Stage::Synthesize,
            Stage::Finalize,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].percent() < pair[1].percent());
        }
        assert_eq!(Stage::Finalize.percent(), 100);
    }

    #[test]
    fn terminal_statuses() {
        assert!(AuditStatus::Completed.is_terminal());
        assert!(AuditStatus::Failed.is_terminal());
        assert!(!AuditStatus::Running.is_terminal());
        assert!(!AuditStatus::Pending.is_terminal());
    }

    #[test]
    fn fix_priority_orders_critical_highest() {
        assert!(FixPriority::Critical > FixPriority::High);
        assert!(FixPriority::High > FixPriority::Medium);
        assert!(FixPriority::Medium > FixPriority::Low);
    }

    #[test]
    fn audit_round_trips_through_json() {
        let audit = Audit::new(7, "user-1", AuditConfig::new("https://example.com"));
        let json = serde_json::to_string(&audit).unwrap();
        let back: Audit = serde_json::from_str(&json).unwrap();
        assert_eq!(audit, back);
    }
}
