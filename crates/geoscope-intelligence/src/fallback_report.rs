//! Deterministic report synthesis used when no LLM backend is reachable.
//!
//! Builds the nine-section Markdown report and a fix plan straight from
//! the scored page reports. Also provides the fix-plan generator reused
//! to backstop a model that returns prose without a usable plan.

use geoscope_types::page::{CheckStatus, Dimension, PageReport, SchemaPresence};
use geoscope_types::{FixItem, FixPriority, SynthesisOutput};

use crate::agents::SynthesisInput;

/// Required section headings, in order.
pub const REPORT_SECTIONS: [&str; 9] = [
    "Executive Summary",
    "Methodology",
    "Content Inventory",
    "Technical & Semantic Diagnostic",
    "Competitive Gaps",
    "Action Plan",
    "RACI",
    "Roadmap",
    "Metrics & KPIs",
];

pub fn build(input: &SynthesisInput<'_>) -> SynthesisOutput {
    let fix_plan = fix_plan_for(input.target);
    let report_markdown = render_markdown(input, &fix_plan);
    SynthesisOutput {
        report_markdown,
        fix_plan,
    }
}

/// Derive prioritized fixes from a page's weakest findings.
pub fn fix_plan_for(target: &PageReport) -> Vec<FixItem> {
    let page = page_path(&target.url);
    let mut plan = Vec::new();

    if target.schema.schema_presence == SchemaPresence::Absent {
        plan.push(FixItem {
            issue: "Missing schema markup".to_string(),
            priority: FixPriority::Critical,
            page: page.clone(),
            current_value: Some("no JSON-LD structured data".to_string()),
            recommended_value: "Add JSON-LD Organization plus the page-type schema (Article or FAQPage)"
                .to_string(),
            category: Some(Dimension::Schema),
        });
    } else {
        for missing in &target.schema.recommendations {
            plan.push(FixItem {
                issue: format!("Missing {} schema", missing),
                priority: FixPriority::Medium,
                page: page.clone(),
                current_value: Some(format!(
                    "types present: {}",
                    target.schema.schema_types.join(", ")
                )),
                recommended_value: format!("Add a {} JSON-LD block", missing),
                category: Some(Dimension::Schema),
            });
        }
    }

    match target.structure.h1_check.status {
        CheckStatus::Fail => plan.push(FixItem {
            issue: "Page has no H1".to_string(),
            priority: FixPriority::High,
            page: page.clone(),
            current_value: Some("0 H1 elements".to_string()),
            recommended_value: "Add exactly one H1 stating the page's core question or answer"
                .to_string(),
            category: Some(Dimension::Structure),
        }),
        CheckStatus::Warn => plan.push(FixItem {
            issue: "Multiple H1 elements".to_string(),
            priority: FixPriority::Medium,
            page: page.clone(),
            current_value: Some(format!("{} H1 elements", target.structure.h1_count)),
            recommended_value: "Keep a single H1; demote the rest to H2".to_string(),
            category: Some(Dimension::Structure),
        }),
        CheckStatus::Pass => {}
    }

    if !target.eeat.author_presence.passed() {
        plan.push(FixItem {
            issue: "No author byline".to_string(),
            priority: FixPriority::High,
            page: page.clone(),
            current_value: None,
            recommended_value: "Add a visible byline and schema author attribution".to_string(),
            category: Some(Dimension::Eeat),
        });
    }

    if target.eeat.external_links == 0 {
        plan.push(FixItem {
            issue: "No outbound citations".to_string(),
            priority: FixPriority::Medium,
            page: page.clone(),
            current_value: Some("0 external links".to_string()),
            recommended_value: "Cite at least two authoritative sources (.edu/.gov or research outlets)"
                .to_string(),
            category: Some(Dimension::Eeat),
        });
    }

    if target.eeat.content_freshness.stale {
        plan.push(FixItem {
            issue: "Content is stale".to_string(),
            priority: FixPriority::Medium,
            page: page.clone(),
            current_value: target
                .eeat
                .content_freshness
                .newest_date
                .map(|d| d.to_string()),
            recommended_value: "Refresh the content and update datePublished/dateModified"
                .to_string(),
            category: Some(Dimension::Eeat),
        });
    }

    if !target.content.inverted_pyramid.passed() {
        plan.push(FixItem {
            issue: "No direct answer in the opening".to_string(),
            priority: FixPriority::Medium,
            page: page.clone(),
            current_value: None,
            recommended_value: "Open with a two-sentence direct answer before any elaboration"
                .to_string(),
            category: Some(Dimension::Content),
        });
    }

    if target.content.question_targeting.status == CheckStatus::Fail {
        plan.push(FixItem {
            issue: "No question coverage".to_string(),
            priority: FixPriority::Low,
            page: page.clone(),
            current_value: Some("0 question sentences".to_string()),
            recommended_value: "Add an FAQ section answering the top user questions".to_string(),
            category: Some(Dimension::Content),
        });
    }

    if !target.technical.viewport {
        plan.push(FixItem {
            issue: "Missing viewport meta tag".to_string(),
            priority: FixPriority::Medium,
            page: "site".to_string(),
            current_value: None,
            recommended_value: "Add <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">"
                .to_string(),
            category: Some(Dimension::Technical),
        });
    }

    if target.technical.meta_robots.to_lowercase().contains("noindex") {
        plan.push(FixItem {
            issue: "Page blocks indexing".to_string(),
            priority: FixPriority::Critical,
            page: page.clone(),
            current_value: Some(target.technical.meta_robots.clone()),
            recommended_value: "Remove the noindex directive".to_string(),
            category: Some(Dimension::Technical),
        });
    }

    let transparency = &target.eeat.transparency_signals;
    if !(transparency.about && transparency.contact && transparency.privacy) {
        plan.push(FixItem {
            issue: "Incomplete trust pages".to_string(),
            priority: FixPriority::Low,
            page: "site".to_string(),
            current_value: None,
            recommended_value: "Link About, Contact, and Privacy pages from the site chrome"
                .to_string(),
            category: Some(Dimension::Eeat),
        });
    }

    plan.sort_by(|a, b| b.priority.cmp(&a.priority));
    plan
}

fn render_markdown(input: &SynthesisInput<'_>, fix_plan: &[FixItem]) -> String {
    let target = input.target;
    let competitor_count = input.competitors.len();
    let competitor_avg = if competitor_count > 0 {
        input
            .competitors
            .iter()
            .map(|c| c.geo_score)
            .sum::<f64>()
            / competitor_count as f64
    } else {
        0.0
    };

    let mut md = String::new();

    md.push_str("## Executive Summary\n\n");
    md.push_str(&format!(
        "{} scores **{:.1}/100 (grade {})** for generative-engine visibility.\n",
        target.url, target.geo_score, target.grade
    ));
    if competitor_count > 0 {
        md.push_str(&format!(
            "The {} audited competitors average {:.1}/100.\n",
            competitor_count, competitor_avg
        ));
    }
    if input.incomplete {
        md.push_str("Some audit stages completed with errors; findings below reflect partial data.\n");
    }
    md.push_str(&format!(
        "The plan below contains {} prioritized fixes.\n\n",
        fix_plan.len()
    ));

    md.push_str("## Methodology\n\n");
    md.push_str(&format!(
        "{} pages of the site were crawled and scored on six dimensions \
         (structure 20%, content 20%, E-E-A-T 25%, schema 15%, technical 10%, \
         citation signals 10%). Competitors were discovered for the \"{}\" \
         category and audited identically.\n\n",
        input.site_pages.len().max(1),
        input.intelligence.category
    ));

    md.push_str("## Content Inventory\n\n");
    md.push_str("| Page | GEO score | Grade |\n|---|---|---|\n");
    for page in input.site_pages.iter().take(25) {
        md.push_str(&format!(
            "| {} | {:.1} | {} |\n",
            page_path(&page.url),
            page.geo_score,
            page.grade
        ));
    }
    if input.site_pages.is_empty() {
        md.push_str(&format!(
            "| {} | {:.1} | {} |\n",
            page_path(&target.url),
            target.geo_score,
            target.grade
        ));
    }
    md.push('\n');

    md.push_str("## Technical & Semantic Diagnostic\n\n");
    md.push_str("| Dimension | Score |\n|---|---|\n");
    for (dimension, score) in target.dimension_scores() {
        md.push_str(&format!("| {} | {:.1} |\n", dimension.label(), score));
    }
    md.push_str(&format!(
        "\nSchema types present: {}. Meta robots: `{}`.\n\n",
        if target.schema.schema_types.is_empty() {
            "none".to_string()
        } else {
            target.schema.schema_types.join(", ")
        },
        target.technical.meta_robots
    ));

    md.push_str("## Competitive Gaps\n\n");
    if input.competitors.is_empty() {
        md.push_str("No competitors could be audited.\n\n");
    } else {
        for competitor in input.competitors {
            let delta = competitor.geo_score - target.geo_score;
            md.push_str(&format!(
                "- {} scores {:.1} ({:+.1} vs target)\n",
                competitor.url, competitor.geo_score, delta
            ));
        }
        md.push('\n');
    }

    md.push_str("## Action Plan\n\n");
    for (index, item) in fix_plan.iter().enumerate() {
        md.push_str(&format!(
            "{}. **[{:?}]** {} — {} ({})\n",
            index + 1,
            item.priority,
            item.issue,
            item.recommended_value,
            item.page
        ));
    }
    md.push('\n');

    md.push_str("## RACI\n\n");
    md.push_str(
        "| Workstream | Responsible | Accountable | Consulted | Informed |\n\
         |---|---|---|---|---|\n\
         | Structured data | Engineering | Head of SEO | Content | Marketing |\n\
         | Content rewrites | Content | Head of Content | SEO | Marketing |\n\
         | Technical fixes | Engineering | CTO | SEO | Marketing |\n\n",
    );

    md.push_str("## Roadmap\n\n");
    let critical = count_priority(fix_plan, FixPriority::Critical);
    let high = count_priority(fix_plan, FixPriority::High);
    let rest = fix_plan.len() - critical - high;
    md.push_str(&format!(
        "- **Days 0-30:** resolve the {} critical item(s).\n\
         - **Days 31-60:** resolve the {} high-priority item(s).\n\
         - **Days 61-90:** address the remaining {} item(s) and re-audit.\n\n",
        critical, high, rest
    ));

    md.push_str("## Metrics & KPIs\n\n");
    md.push_str(&format!(
        "- GEO score: {:.1} today; target {:.0} within 90 days.\n",
        target.geo_score,
        (target.geo_score + 20.0).min(95.0)
    ));
    if let Some(pair) = input.performance {
        if let Some(lcp) = pair.mobile.vitals.lcp_ms {
            md.push_str(&format!("- Mobile LCP: {:.0} ms today; target under 2500 ms.\n", lcp));
        }
        if let Some(score) = pair.mobile.performance_score {
            md.push_str(&format!(
                "- Mobile performance score: {:.0}; target 90+.\n",
                score
            ));
        }
    }
    md.push_str("- Citation share in generated answers: establish a baseline probe next quarter.\n");

    md
}

fn count_priority(plan: &[FixItem], priority: FixPriority) -> usize {
    plan.iter().filter(|item| item.priority == priority).count()
}

/// Path component of a page URL, or "site" when it cannot be parsed.
pub(crate) fn page_path(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "site".to_string())
}
