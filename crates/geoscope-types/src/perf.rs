//! Performance telemetry projected from the external performance oracle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Core Web Vitals plus the first-paint metrics the report cites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreWebVitals {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lcp_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inp_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cls: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcp_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttfb_ms: Option<f64>,
}

/// A savings opportunity reported by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_value: Option<f64>,
    /// 0-1 severity; null when the oracle reports the audit as informative.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<f64>,
}

/// One audit record under a category (accessibility, seo, best-practices)
/// or diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Report provenance, used by the staleness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfMetadata {
    pub fetched_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Set when collection failed; a report with an error marker is stale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One strategy's worth of oracle output, with every audit id preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerfReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_practices_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo_score: Option<f64>,
    pub vitals: CoreWebVitals,
    pub opportunities: BTreeMap<String, Opportunity>,
    pub diagnostics: BTreeMap<String, AuditRecord>,
    pub accessibility_audits: BTreeMap<String, AuditRecord>,
    pub seo_audits: BTreeMap<String, AuditRecord>,
    pub best_practices_audits: BTreeMap<String, AuditRecord>,
    pub metadata: PerfMetadata,
}

impl PerfReport {
    /// Placeholder report recording a failed collection attempt.
    pub fn errored(message: impl Into<String>) -> Self {
        Self {
            performance_score: None,
            accessibility_score: None,
            best_practices_score: None,
            seo_score: None,
            vitals: CoreWebVitals::default(),
            opportunities: BTreeMap::new(),
            diagnostics: BTreeMap::new(),
            accessibility_audits: BTreeMap::new(),
            seo_audits: BTreeMap::new(),
            best_practices_audits: BTreeMap::new(),
            metadata: PerfMetadata {
                fetched_at: Utc::now(),
                oracle_version: None,
                user_agent: None,
                error: Some(message.into()),
            },
        }
    }

    /// Total distinct audit ids preserved across all maps.
    pub fn audit_id_count(&self) -> usize {
        let mut ids: std::collections::BTreeSet<&str> = std::collections::BTreeSet::new();
        ids.extend(self.opportunities.keys().map(String::as_str));
        ids.extend(self.diagnostics.keys().map(String::as_str));
        ids.extend(self.accessibility_audits.keys().map(String::as_str));
        ids.extend(self.seo_audits.keys().map(String::as_str));
        ids.extend(self.best_practices_audits.keys().map(String::as_str));
        ids.len()
    }
}

/// Mobile and desktop reports collected together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformancePair {
    pub mobile: PerfReport,
    pub desktop: PerfReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errored_report_carries_marker() {
        let report = PerfReport::errored("quota exceeded");
        assert_eq!(report.metadata.error.as_deref(), Some("quota exceeded"));
        assert_eq!(report.audit_id_count(), 0);
    }

    #[test]
    fn audit_id_count_dedups_across_maps() {
        let mut report = PerfReport::errored("x");
        report.metadata.error = None;
        let rec = AuditRecord {
            id: "shared".into(),
            title: "t".into(),
            score: Some(1.0),
            display_value: None,
            description: None,
        };
        report.diagnostics.insert("shared".into(), rec.clone());
        report.seo_audits.insert("shared".into(), rec.clone());
        report.seo_audits.insert("only-seo".into(), rec);
        assert_eq!(report.audit_id_count(), 2);
    }
}
