//! Agent input/output types.
//!
//! LLM responses are schema-less at the wire level; parsed output is a
//! tagged union so downstream code routes on the tag and never coerces raw
//! text into structure.

use serde::{Deserialize, Serialize};

use crate::audit::FixItem;

/// Output of the external-intelligence classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalIntelligence {
    pub is_ymyl: bool,
    pub category: String,
    pub search_queries: Vec<String>,
    /// Set when the model answered but not with parseable JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl ExternalIntelligence {
    /// Deterministic classification used when no LLM backend is reachable.
    pub fn offline_default(host: &str) -> Self {
        Self {
            is_ymyl: false,
            category: "General".to_string(),
            search_queries: vec![host.to_string()],
            raw: None,
        }
    }
}

/// Output of the report synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub report_markdown: String,
    pub fix_plan: Vec<FixItem>,
}

/// An agent response after JSON extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedAgentOutput {
    /// The response parsed as a JSON object.
    Structured(serde_json::Value),
    /// Nothing in the response parsed; the raw text is kept as-is.
    Raw(String),
}

impl ParsedAgentOutput {
    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw(_))
    }
}

/// Optional auxiliary data attached to the synthesizer prompt. Absent
/// sub-fields are skipped by the prompt builder; an empty struct never
/// stands in for "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuxiliaryContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlinks: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_tracking: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_visibility: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_suggestions: Option<serde_json::Value>,
}

impl AuxiliaryContext {
    pub fn is_empty(&self) -> bool {
        self.keywords.is_none()
            && self.backlinks.is_none()
            && self.rank_tracking.is_none()
            && self.llm_visibility.is_none()
            && self.content_suggestions.is_none()
    }

    /// Present sub-fields as (name, value) pairs for prompt building.
    pub fn present_fields(&self) -> Vec<(&'static str, &serde_json::Value)> {
        let mut fields = Vec::new();
        if let Some(v) = &self.keywords {
            fields.push(("keywords", v));
        }
        if let Some(v) = &self.backlinks {
            fields.push(("backlinks", v));
        }
        if let Some(v) = &self.rank_tracking {
            fields.push(("rank_tracking", v));
        }
        if let Some(v) = &self.llm_visibility {
            fields.push(("llm_visibility", v));
        }
        if let Some(v) = &self.content_suggestions {
            fields.push(("content_suggestions", v));
        }
        fields
    }
}
