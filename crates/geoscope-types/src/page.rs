//! Per-page score reports.
//!
//! A [`PageReport`] bundles the six dimension sub-reports produced by the
//! page analyzer together with the weighted GEO score and letter grade.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Scoring dimensions, in tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Structure,
    Content,
    Eeat,
    Schema,
    Technical,
    CitationSignals,
}

impl Dimension {
    /// Weight of this dimension in the overall GEO score.
    pub fn weight(self) -> f64 {
        match self {
            Self::Structure => 0.20,
            Self::Content => 0.20,
            Self::Eeat => 0.25,
            Self::Schema => 0.15,
            Self::Technical => 0.10,
            Self::CitationSignals => 0.10,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Structure => "structure",
            Self::Content => "content",
            Self::Eeat => "eeat",
            Self::Schema => "schema",
            Self::Technical => "technical",
            Self::CitationSignals => "citation_signals",
        }
    }
}

/// Outcome of a single pass/warn/fail check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// A named check with its outcome and an optional human-readable detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckResult {
    pub fn pass() -> Self {
        Self {
            status: CheckStatus::Pass,
            detail: None,
        }
    }

    pub fn warn(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Warn,
            detail: Some(detail.into()),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Pass
    }
}

/// Heading/list/semantic-markup signals. Weight 0.20.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureReport {
    /// Exactly one H1 passes; zero fails; multiple warns.
    pub h1_check: CheckResult,
    pub h1_count: u32,
    /// Heading levels that were skipped (e.g. "h2 -> h4").
    pub heading_hierarchy: CheckResult,
    pub heading_skips: Vec<String>,
    pub list_usage: u32,
    pub table_usage: u32,
    /// Landmark elements found out of the seven tracked ones.
    pub semantic_elements: Vec<String>,
    /// Percentage of tracked landmark elements present.
    pub semantic_html_pct: f64,
    pub score: f64,
}

/// Answer-shape and tone signals. Weight 0.20.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentReport {
    /// 0-10: lead paragraph before the first sub-heading.
    pub fragment_clarity: u8,
    /// 0-10: first/second-person pronoun density.
    pub conversational_tone: u8,
    /// Passes with >= 3 question sentences or an FAQ block.
    pub question_targeting: CheckResult,
    pub question_count: u32,
    /// Direct answer within the first two sentences.
    pub inverted_pyramid: CheckResult,
    pub word_count: u32,
    /// Set when the document could not be parsed at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub score: f64,
}

/// Freshness extraction outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessCheck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_date: Option<NaiveDate>,
    /// True when the newest extracted date is older than 18 months.
    pub stale: bool,
}

/// About/Contact/Privacy links in the site chrome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransparencySignals {
    pub about: bool,
    pub contact: bool,
    pub privacy: bool,
}

/// Experience/expertise/authoritativeness/trust signals. Weight 0.25.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EeatReport {
    pub author_presence: CheckResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    pub external_links: u32,
    pub authoritative_links: u32,
    pub content_freshness: FreshnessCheck,
    pub transparency_signals: TransparencySignals,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaPresence {
    Present,
    Absent,
}

/// JSON-LD structured-data signals. Weight 0.15.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub schema_presence: SchemaPresence,
    /// Distinct `@type` values discovered across all JSON-LD blocks.
    pub schema_types: Vec<String>,
    /// JSON-LD blocks that failed to parse (tolerated, counted).
    pub invalid_blocks: u32,
    /// Missing types commonly expected for the inferred page kind.
    pub recommendations: Vec<String>,
    pub score: f64,
}

/// Meta/viewport/canonical signals plus fetch facts. Weight 0.10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalReport {
    pub meta_robots: String,
    pub viewport: bool,
    pub charset: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub score: f64,
}

/// Reserved slot for external visibility probes. Weight 0.10; contributes
/// zero when no probe data is attached.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CitationSignalsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_data: Option<serde_json::Value>,
    pub score: f64,
}

/// Complete score bundle for one fetched URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub url: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub truncated: bool,
    pub structure: StructureReport,
    pub content: ContentReport,
    pub eeat: EeatReport,
    pub schema: SchemaReport,
    pub technical: TechnicalReport,
    pub citation_signals: CitationSignalsReport,
    pub geo_score: f64,
    pub grade: String,
}

impl PageReport {
    /// Weighted sum over the six dimensions.
    pub fn weighted_score(&self) -> f64 {
        self.structure.score * Dimension::Structure.weight()
            + self.content.score * Dimension::Content.weight()
            + self.eeat.score * Dimension::Eeat.weight()
            + self.schema.score * Dimension::Schema.weight()
            + self.technical.score * Dimension::Technical.weight()
            + self.citation_signals.score * Dimension::CitationSignals.weight()
    }

    /// Dimension scores in tie-break order.
    pub fn dimension_scores(&self) -> [(Dimension, f64); 6] {
        [
            (Dimension::Structure, self.structure.score),
            (Dimension::Content, self.content.score),
            (Dimension::Eeat, self.eeat.score),
            (Dimension::Schema, self.schema.score),
            (Dimension::Technical, self.technical.score),
            (Dimension::CitationSignals, self.citation_signals.score),
        ]
    }
}

/// Letter grade for a 0-100 GEO score.
pub fn grade_for_score(score: f64) -> &'static str {
    if score >= 95.0 {
        "A+"
    } else if score >= 90.0 {
        "A"
    } else if score >= 85.0 {
        "A-"
    } else if score >= 80.0 {
        "B+"
    } else if score >= 75.0 {
        "B"
    } else if score >= 70.0 {
        "B-"
    } else if score >= 60.0 {
        "C"
    } else if score >= 50.0 {
        "D"
    } else {
        "F"
    }
}
