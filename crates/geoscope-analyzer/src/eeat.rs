//! E-E-A-T dimension: authorship, citations, freshness, transparency.

use chrono::{Duration, NaiveDate, Utc};
use geoscope_types::page::{
    CheckResult, CheckStatus, EeatReport, FreshnessCheck, TransparencySignals,
};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::schema_markup::SchemaAnalysis;

static META_AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name=\"author\"]").expect("static selector"));
static REL_AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[rel=\"author\"]").expect("static selector"));
static ANCHORS: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));
static TIME_ELEMENTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time").expect("static selector"));
static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("static regex"));

/// Content older than this is flagged stale.
const FRESHNESS_WINDOW_DAYS: i64 = 547; // 18 months

/// Curated research/news hosts treated as authoritative alongside .edu/.gov.
const AUTHORITATIVE_HOSTS: [&str; 12] = [
    "nature.com",
    "sciencedirect.com",
    "who.int",
    "arxiv.org",
    "ieee.org",
    "acm.org",
    "wikipedia.org",
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "nytimes.com",
    "pubmed.ncbi.nlm.nih.gov",
];

pub(crate) fn analyze(document: &Html, page_url: &str, schema: &SchemaAnalysis) -> EeatReport {
    let author_name = schema
        .author_name
        .clone()
        .or_else(|| meta_author(document))
        .or_else(|| rel_author(document));
    let author_presence = match &author_name {
        Some(name) => CheckResult {
            status: CheckStatus::Pass,
            detail: Some(name.clone()),
        },
        None => CheckResult::fail("no byline found"),
    };

    let page_host = Url::parse(page_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()));
    let (external_links, authoritative_links) = count_links(document, page_host.as_deref());

    let content_freshness = freshness(document, &schema.dates);
    let transparency_signals = transparency(document);

    let mut score: f64 = 0.0;
    if author_presence.passed() {
        score += 30.0;
    }
    if external_links > 0 {
        score += 15.0;
    }
    if authoritative_links > 0 {
        score += 10.0;
    }
    score += match (&content_freshness.newest_date, content_freshness.stale) {
        (Some(_), false) => 25.0,
        (Some(_), true) => 5.0,
        (None, _) => 15.0,
    };
    if transparency_signals.about {
        score += 7.0;
    }
    if transparency_signals.contact {
        score += 7.0;
    }
    if transparency_signals.privacy {
        score += 6.0;
    }

    EeatReport {
        author_presence,
        author_name,
        external_links,
        authoritative_links,
        content_freshness,
        transparency_signals,
        score: score.min(100.0),
    }
}

fn meta_author(document: &Html) -> Option<String> {
    document
        .select(&META_AUTHOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn rel_author(document: &Html) -> Option<String> {
    document.select(&REL_AUTHOR).next().and_then(|el| {
        let text: String = el.text().collect::<String>().trim().to_string();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    })
}

fn count_links(document: &Html, page_host: Option<&str>) -> (u32, u32) {
    let mut external = 0u32;
    let mut authoritative = 0u32;
    for anchor in document.select(&ANCHORS) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(parsed) = Url::parse(href) else {
            continue; // relative links are internal by definition
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            continue;
        }
        let Some(host) = parsed.host_str().map(|h| h.to_lowercase()) else {
            continue;
        };
        if Some(host.as_str()) == page_host {
            continue;
        }
        external += 1;
        if is_authoritative(&host) {
            authoritative += 1;
        }
    }
    (external, authoritative)
}

fn is_authoritative(host: &str) -> bool {
    if host.ends_with(".edu") || host.ends_with(".gov") {
        return true;
    }
    AUTHORITATIVE_HOSTS
        .iter()
        .any(|known| host == *known || host.ends_with(&format!(".{}", known)))
}

/// Newest date from `<time>` elements and schema publication fields.
fn freshness(document: &Html, schema_dates: &[NaiveDate]) -> FreshnessCheck {
    let mut dates: Vec<NaiveDate> = schema_dates.to_vec();
    for time in document.select(&TIME_ELEMENTS) {
        let candidate = time
            .value()
            .attr("datetime")
            .map(|s| s.to_string())
            .unwrap_or_else(|| time.text().collect());
        if let Some(captures) = ISO_DATE.captures(&candidate) {
            if let Ok(date) = NaiveDate::parse_from_str(&captures[0], "%Y-%m-%d") {
                dates.push(date);
            }
        }
    }
    let newest_date = dates.into_iter().max();
    let stale = newest_date
        .map(|date| {
            let cutoff = Utc::now().date_naive() - Duration::days(FRESHNESS_WINDOW_DAYS);
            date < cutoff
        })
        .unwrap_or(false);
    FreshnessCheck { newest_date, stale }
}

fn transparency(document: &Html) -> TransparencySignals {
    let mut signals = TransparencySignals::default();
    for anchor in document.select(&ANCHORS) {
        let href = anchor.value().attr("href").unwrap_or("").to_lowercase();
        let text: String = anchor.text().collect::<String>().to_lowercase();
        if href.contains("about") || text.contains("about") {
            signals.about = true;
        }
        if href.contains("contact") || text.contains("contact") {
            signals.contact = true;
        }
        if href.contains("privacy") || text.contains("privacy") {
            signals.privacy = true;
        }
    }
    signals
}
