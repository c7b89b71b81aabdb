//! Six-dimension HTML page analysis.
//!
//! [`analyze`] parses one fetched document and produces a complete
//! [`PageReport`]: structure, content, E-E-A-T, schema, technical, and the
//! reserved citation-signals dimension, combined into the weighted GEO
//! score and letter grade. Malformed input never panics; a document with
//! nothing to parse yields zeroed dimensions and an error note.

mod content;
mod eeat;
mod schema_markup;
mod structure;
mod technical;
mod text;

use chrono::Utc;
use geoscope_types::page::{
    grade_for_score, CheckResult, CitationSignalsReport, ContentReport, EeatReport, FreshnessCheck,
    PageReport, SchemaPresence, SchemaReport, StructureReport, TechnicalReport,
    TransparencySignals,
};
use scraper::Html;
use tracing::debug;

/// Everything the analyzer needs about one fetched page.
#[derive(Debug, Clone)]
pub struct PageInput<'a> {
    pub url: &'a str,
    pub body: &'a [u8],
    pub content_type: Option<&'a str>,
    pub status: u16,
    pub truncated: bool,
}

/// Analyze one HTML document. Deterministic: the same input yields the
/// same scores.
pub fn analyze(input: &PageInput<'_>) -> PageReport {
    let html = String::from_utf8_lossy(input.body);
    if html.trim().is_empty() {
        return empty_report(input, "document body is empty or undecodable");
    }

    let document = Html::parse_document(&html);
    let body_text = text::visible_text(&document);
    let question_count = text::question_count(&body_text);
    let has_faq_block = text::has_faq_element(&document);

    let schema = schema_markup::analyze(&document, question_count, has_faq_block);
    let structure = structure::analyze(&document);
    let content = content::analyze(
        &document,
        &body_text,
        question_count,
        has_faq_block || schema.has_faq,
    );
    let eeat = eeat::analyze(&document, input.url, &schema);
    let technical = technical::analyze(&document, input.status, input.content_type);
    let citation_signals = CitationSignalsReport::default();

    let mut report = PageReport {
        url: input.url.to_string(),
        status: input.status,
        content_type: input.content_type.map(|s| s.to_string()),
        fetched_at: Utc::now(),
        truncated: input.truncated,
        structure,
        content,
        eeat,
        schema: schema.report,
        technical,
        citation_signals,
        geo_score: 0.0,
        grade: String::new(),
    };
    report.geo_score = (report.weighted_score() * 10.0).round() / 10.0;
    report.grade = grade_for_score(report.geo_score).to_string();
    debug!(url = %input.url, geo_score = report.geo_score, grade = %report.grade, "page analyzed");
    report
}

/// Zero-score report for a document that could not be analyzed at all.
fn empty_report(input: &PageInput<'_>, note: &str) -> PageReport {
    PageReport {
        url: input.url.to_string(),
        status: input.status,
        content_type: input.content_type.map(|s| s.to_string()),
        fetched_at: Utc::now(),
        truncated: input.truncated,
        structure: StructureReport {
            h1_check: CheckResult::fail("no document"),
            h1_count: 0,
            heading_hierarchy: CheckResult::fail("no document"),
            heading_skips: Vec::new(),
            list_usage: 0,
            table_usage: 0,
            semantic_elements: Vec::new(),
            semantic_html_pct: 0.0,
            score: 0.0,
        },
        content: ContentReport {
            fragment_clarity: 0,
            conversational_tone: 0,
            question_targeting: CheckResult::fail("no document"),
            question_count: 0,
            inverted_pyramid: CheckResult::fail("no document"),
            word_count: 0,
            error: Some(note.to_string()),
            score: 0.0,
        },
        eeat: EeatReport {
            author_presence: CheckResult::fail("no document"),
            author_name: None,
            external_links: 0,
            authoritative_links: 0,
            content_freshness: FreshnessCheck {
                newest_date: None,
                stale: false,
            },
            transparency_signals: TransparencySignals::default(),
            score: 0.0,
        },
        schema: SchemaReport {
            schema_presence: SchemaPresence::Absent,
            schema_types: Vec::new(),
            invalid_blocks: 0,
            recommendations: Vec::new(),
            score: 0.0,
        },
        technical: TechnicalReport {
            meta_robots: "index, follow".to_string(),
            viewport: false,
            charset: false,
            canonical: None,
            status: input.status,
            content_type: input.content_type.map(|s| s.to_string()),
            score: 0.0,
        },
        citation_signals: CitationSignalsReport::default(),
        geo_score: 0.0,
        grade: grade_for_score(0.0).to_string(),
    }
}
