//! The two LLM agents: external-intelligence classifier and report
//! synthesizer.
//!
//! Each agent issues one chat call, extracts JSON leniently, and degrades
//! deterministically: a dead LLM never fails an audit, it only adds a
//! warning.

use geoscope_types::page::PageReport;
use geoscope_types::perf::PerformancePair;
use geoscope_types::{
    AppConfig, AuxiliaryContext, ExternalIntelligence, FixItem, ParsedAgentOutput, Result,
    SynthesisOutput,
};
use serde_json::Value;
use tracing::{info, warn};
use url::Url;

use crate::chain::CompletionChain;
use crate::extract::extract_json;
use crate::fallback_report;
use crate::provider::ChatRequest;

const CLASSIFIER_SYSTEM: &str = "You are a website classification analyst. \
Given a page audit summary, decide whether the site covers Your Money or \
Your Life topics, name its category, and propose search queries a potential \
customer would type. Respond with strict JSON only: \
{\"is_ymyl\": bool, \"category\": string, \"search_queries\": [string]}";

const SYNTHESIZER_SYSTEM: &str = "You are a senior SEO and GEO consultant \
writing a remediation report. Respond with strict JSON only: \
{\"report_markdown\": string, \"fix_plan\": [{\"issue\": string, \
\"priority\": \"critical\"|\"high\"|\"medium\"|\"low\", \"page\": string, \
\"current_value\": string|null, \"recommended_value\": string, \
\"category\": string|null}]}. The report_markdown must contain exactly \
these nine H2 sections in order: Executive Summary, Methodology, Content \
Inventory, Technical & Semantic Diagnostic, Competitive Gaps, Action Plan, \
RACI, Roadmap, Metrics & KPIs.";

/// Result of one agent invocation: the (possibly fallback) value plus any
/// warnings the orchestrator should record on the audit.
#[derive(Debug, Clone)]
pub struct AgentOutcome<T> {
    pub value: T,
    pub used_fallback: bool,
    pub warnings: Vec<String>,
}

/// Everything the synthesizer sees.
#[derive(Debug, Clone)]
pub struct SynthesisInput<'a> {
    pub target: &'a PageReport,
    pub site_pages: &'a [PageReport],
    pub competitors: &'a [PageReport],
    pub intelligence: &'a ExternalIntelligence,
    pub performance: Option<&'a PerformancePair>,
    pub aux: &'a AuxiliaryContext,
    /// True when an earlier stage completed with errors.
    pub incomplete: bool,
}

/// Both agents over one completion chain. The per-audit budget is two
/// calls: the orchestrator invokes each agent exactly once.
pub struct IntelligenceAgents {
    chain: CompletionChain,
}

impl IntelligenceAgents {
    pub fn new(chain: CompletionChain) -> Self {
        Self { chain }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self::new(CompletionChain::from_config(config)?))
    }

    /// Agent 1: classify the site and propose competitor-discovery
    /// queries.
    pub async fn classify(&self, target: &PageReport) -> AgentOutcome<ExternalIntelligence> {
        let host = host_of(&target.url);
        let request = ChatRequest::new(CLASSIFIER_SYSTEM, classifier_prompt(target))
            .with_max_tokens(512);

        match self.chain.complete(&request).await {
            Ok(response) => match extract_json(&response) {
                ParsedAgentOutput::Structured(value) => AgentOutcome {
                    value: parse_intelligence(&value, &host),
                    used_fallback: false,
                    warnings: Vec::new(),
                },
                ParsedAgentOutput::Raw(raw) => {
                    warn!("classifier returned unstructured output");
                    let mut value = ExternalIntelligence::offline_default(&host);
                    value.raw = Some(raw);
                    AgentOutcome {
                        value,
                        used_fallback: false,
                        warnings: vec!["classifier output was not valid JSON".to_string()],
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "classifier call failed, using offline default");
                AgentOutcome {
                    value: ExternalIntelligence::offline_default(&host),
                    used_fallback: true,
                    warnings: vec![format!("classifier: {}", e)],
                }
            }
        }
    }

    /// Agent 2: synthesize the report and fix plan.
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> AgentOutcome<SynthesisOutput> {
        let request = ChatRequest::new(SYNTHESIZER_SYSTEM, synthesizer_prompt(input))
            .with_max_tokens(8192);

        match self.chain.complete(&request).await {
            Ok(response) => match extract_json(&response) {
                ParsedAgentOutput::Structured(value) => {
                    let markdown = value
                        .get("report_markdown")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    match markdown {
                        Some(report_markdown) if !report_markdown.trim().is_empty() => {
                            let mut warnings = Vec::new();
                            let fix_plan = parse_fix_plan(&value).unwrap_or_else(|| {
                                warnings.push(
                                    "synthesizer fix_plan was unusable; derived from scores"
                                        .to_string(),
                                );
                                fallback_report::fix_plan_for(input.target)
                            });
                            info!(fixes = fix_plan.len(), "synthesizer produced report");
                            AgentOutcome {
                                value: SynthesisOutput {
                                    report_markdown,
                                    fix_plan,
                                },
                                used_fallback: false,
                                warnings,
                            }
                        }
                        _ => {
                            warn!("synthesizer JSON lacked report_markdown, using deterministic report");
                            AgentOutcome {
                                value: fallback_report::build(input),
                                used_fallback: true,
                                warnings: vec![
                                    "synthesizer output lacked report_markdown".to_string()
                                ],
                            }
                        }
                    }
                }
                ParsedAgentOutput::Raw(_) => {
                    warn!("synthesizer returned unstructured output, using deterministic report");
                    AgentOutcome {
                        value: fallback_report::build(input),
                        used_fallback: true,
                        warnings: vec!["synthesizer output was not valid JSON".to_string()],
                    }
                }
            },
            Err(e) => {
                warn!(error = %e, "synthesizer call failed, using deterministic report");
                AgentOutcome {
                    value: fallback_report::build(input),
                    used_fallback: true,
                    warnings: vec![format!("synthesizer: {}", e)],
                }
            }
        }
    }
}

fn host_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "site".to_string())
}

fn parse_intelligence(value: &Value, host: &str) -> ExternalIntelligence {
    let search_queries: Vec<String> = value
        .get("search_queries")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .filter(|q| !q.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    ExternalIntelligence {
        is_ymyl: value.get("is_ymyl").and_then(Value::as_bool).unwrap_or(false),
        category: value
            .get("category")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .unwrap_or("General")
            .to_string(),
        search_queries: if search_queries.is_empty() {
            vec![host.to_string()]
        } else {
            search_queries
        },
        raw: None,
    }
}

fn parse_fix_plan(value: &Value) -> Option<Vec<FixItem>> {
    let items = value.get("fix_plan")?.as_array()?;
    let parsed: Vec<FixItem> = items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

fn classifier_prompt(target: &PageReport) -> String {
    format!(
        "Audit summary for {url}:\n\
         - GEO score: {score:.1} (grade {grade})\n\
         - Detected schema types: {types}\n\
         - Author byline: {author}\n\
         - Headline count: {h1} H1\n\
         - External citations: {links}\n\
         Classify this site.",
        url = target.url,
        score = target.geo_score,
        grade = target.grade,
        types = if target.schema.schema_types.is_empty() {
            "none".to_string()
        } else {
            target.schema.schema_types.join(", ")
        },
        author = target.eeat.author_name.as_deref().unwrap_or("none"),
        h1 = target.structure.h1_count,
        links = target.eeat.external_links,
    )
}

fn synthesizer_prompt(input: &SynthesisInput<'_>) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!(
        "Target site {} scored {:.1}/100 (grade {}), category \"{}\", ymyl={}.\n",
        input.target.url,
        input.target.geo_score,
        input.target.grade,
        input.intelligence.category,
        input.intelligence.is_ymyl,
    ));
    prompt.push_str("Dimension scores: ");
    for (dimension, score) in input.target.dimension_scores() {
        prompt.push_str(&format!("{}={:.0} ", dimension.label(), score));
    }
    prompt.push('\n');

    prompt.push_str(&format!("Crawled pages: {}\n", input.site_pages.len()));
    for competitor in input.competitors {
        prompt.push_str(&format!(
            "Competitor {} scored {:.1}\n",
            competitor.url, competitor.geo_score
        ));
    }

    if let Some(pair) = input.performance {
        if let Some(score) = pair.mobile.performance_score {
            prompt.push_str(&format!("Mobile performance score: {:.0}\n", score));
        }
        if let Some(lcp) = pair.mobile.vitals.lcp_ms {
            prompt.push_str(&format!("Mobile LCP: {:.0} ms\n", lcp));
        }
        if let Some(score) = pair.desktop.performance_score {
            prompt.push_str(&format!("Desktop performance score: {:.0}\n", score));
        }
    }

    // Only fields that are actually attached appear in the prompt.
    for (name, value) in input.aux.present_fields() {
        prompt.push_str(&format!("Auxiliary {}: {}\n", name, value));
    }

    if input.incomplete {
        prompt.push_str("Note: some audit stages completed with errors; data is partial.\n");
    }
    prompt.push_str("Write the report and fix plan.");
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback_report::REPORT_SECTIONS;
    use crate::provider::{ChatCompleter, ChatRequest};
    use async_trait::async_trait;
    use geoscope_types::AuditError;
    use std::sync::Arc;

    struct FixedProvider(std::result::Result<String, ()>);

    #[async_trait]
    impl ChatCompleter for FixedProvider {
        async fn complete(&self, _request: &ChatRequest) -> geoscope_types::Result<String> {
            match &self.0 {
                Ok(content) => Ok(content.clone()),
                Err(()) => Err(AuditError::Http5xx { status: 503 }),
            }
        }

        fn name(&self) -> String {
            "fixed".to_string()
        }
    }

    fn agents_with(response: std::result::Result<String, ()>) -> IntelligenceAgents {
        IntelligenceAgents::new(CompletionChain::new(vec![Arc::new(FixedProvider(response))]))
    }

    // A small hand-built report; the analyzer crate is not a dependency
    // here, so the fixture is constructed directly.
    fn sample_page() -> PageReport {
        use geoscope_types::page::*;
        PageReport {
            url: "https://example.com/guide".to_string(),
            status: 200,
            content_type: Some("text/html".to_string()),
            fetched_at: chrono::Utc::now(),
            truncated: false,
            structure: StructureReport {
                h1_check: CheckResult::pass(),
                h1_count: 1,
                heading_hierarchy: CheckResult::pass(),
                heading_skips: vec![],
                list_usage: 1,
                table_usage: 0,
                semantic_elements: vec!["main".to_string()],
                semantic_html_pct: 14.3,
                score: 85.0,
            },
            content: ContentReport {
                fragment_clarity: 9,
                conversational_tone: 4,
                question_targeting: CheckResult::fail("no questions"),
                question_count: 0,
                inverted_pyramid: CheckResult::pass(),
                word_count: 600,
                error: None,
                score: 70.0,
            },
            eeat: EeatReport {
                author_presence: CheckResult::fail("no byline found"),
                author_name: None,
                external_links: 0,
                authoritative_links: 0,
                content_freshness: FreshnessCheck {
                    newest_date: None,
                    stale: false,
                },
                transparency_signals: TransparencySignals::default(),
                score: 15.0,
            },
            schema: SchemaReport {
                schema_presence: SchemaPresence::Absent,
                schema_types: vec![],
                invalid_blocks: 0,
                recommendations: vec!["Organization".to_string()],
                score: 0.0,
            },
            technical: TechnicalReport {
                meta_robots: "index, follow".to_string(),
                viewport: true,
                charset: true,
                canonical: None,
                status: 200,
                content_type: Some("text/html".to_string()),
                score: 90.0,
            },
            citation_signals: CitationSignalsReport::default(),
            geo_score: 47.8,
            grade: "F".to_string(),
        }
    }

    fn synthesis_input<'a>(
        target: &'a PageReport,
        intelligence: &'a ExternalIntelligence,
        aux: &'a AuxiliaryContext,
    ) -> SynthesisInput<'a> {
        SynthesisInput {
            target,
            site_pages: std::slice::from_ref(target),
            competitors: &[],
            intelligence,
            performance: None,
            aux,
            incomplete: false,
        }
    }

    #[tokio::test]
    async fn classifier_parses_structured_output() {
        let agents = agents_with(Ok(
            r#"{"is_ymyl": true, "category": "Health", "search_queries": ["best clinic", "clinic near me"]}"#
                .to_string(),
        ));
        let outcome = agents.classify(&sample_page()).await;
        assert!(!outcome.used_fallback);
        assert!(outcome.value.is_ymyl);
        assert_eq!(outcome.value.category, "Health");
        assert_eq!(outcome.value.search_queries.len(), 2);
    }

    #[tokio::test]
    async fn classifier_outage_uses_offline_default() {
        let agents = agents_with(Err(()));
        let outcome = agents.classify(&sample_page()).await;
        assert!(outcome.used_fallback);
        assert_eq!(outcome.value.category, "General");
        assert_eq!(outcome.value.search_queries, vec!["example.com".to_string()]);
        assert!(outcome.warnings.iter().any(|w| w.contains("llm_unavailable")));
    }

    #[tokio::test]
    async fn classifier_prose_keeps_raw_and_defaults() {
        let agents = agents_with(Ok("I think this is a health site.".to_string()));
        let outcome = agents.classify(&sample_page()).await;
        assert!(!outcome.used_fallback);
        assert!(outcome.value.raw.is_some());
        assert_eq!(outcome.value.category, "General");
        assert!(!outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn synthesizer_outage_builds_nine_section_report() {
        let agents = agents_with(Err(()));
        let target = sample_page();
        let intelligence = ExternalIntelligence::offline_default("example.com");
        let aux = AuxiliaryContext::default();
        let outcome = agents
            .synthesize(&synthesis_input(&target, &intelligence, &aux))
            .await;

        assert!(outcome.used_fallback);
        for section in REPORT_SECTIONS {
            assert!(
                outcome.value.report_markdown.contains(section),
                "missing section {}",
                section
            );
        }
        assert!(!outcome.value.fix_plan.is_empty());
        let critical = outcome
            .value
            .fix_plan
            .iter()
            .find(|item| item.priority == geoscope_types::FixPriority::Critical)
            .expect("schema-less page warrants a critical fix");
        assert!(critical.issue.to_lowercase().contains("missing schema"));
    }

    #[tokio::test]
    async fn synthesizer_uses_model_report_when_structured() {
        let agents = agents_with(Ok(serde_json::json!({
            "report_markdown": "## Executive Summary\nmodel text",
            "fix_plan": [{
                "issue": "Missing schema markup",
                "priority": "critical",
                "page": "/guide",
                "recommended_value": "Add Organization schema"
            }]
        })
        .to_string()));
        let target = sample_page();
        let intelligence = ExternalIntelligence::offline_default("example.com");
        let aux = AuxiliaryContext::default();
        let outcome = agents
            .synthesize(&synthesis_input(&target, &intelligence, &aux))
            .await;

        assert!(!outcome.used_fallback);
        assert!(outcome.value.report_markdown.contains("model text"));
        assert_eq!(outcome.value.fix_plan.len(), 1);
    }

    #[tokio::test]
    async fn synthesizer_backfills_unusable_fix_plan() {
        let agents = agents_with(Ok(serde_json::json!({
            "report_markdown": "## Executive Summary\nok",
            "fix_plan": "not a list"
        })
        .to_string()));
        let target = sample_page();
        let intelligence = ExternalIntelligence::offline_default("example.com");
        let aux = AuxiliaryContext::default();
        let outcome = agents
            .synthesize(&synthesis_input(&target, &intelligence, &aux))
            .await;

        assert!(!outcome.used_fallback);
        assert!(!outcome.value.fix_plan.is_empty());
        assert!(!outcome.warnings.is_empty());
    }
}
