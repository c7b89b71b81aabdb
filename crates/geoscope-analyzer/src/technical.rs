//! Technical dimension: indexing directives, viewport, charset, canonical.

use geoscope_types::page::TechnicalReport;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static META_ROBOTS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name=\"robots\"]").expect("static selector"));
static VIEWPORT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[name=\"viewport\"]").expect("static selector"));
static CHARSET: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[charset]").expect("static selector"));
static HTTP_EQUIV_CHARSET: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[http-equiv=\"Content-Type\"]").expect("static selector")
});
static CANONICAL: Lazy<Selector> =
    Lazy::new(|| Selector::parse("link[rel=\"canonical\"]").expect("static selector"));

pub(crate) fn analyze(
    document: &Html,
    status: u16,
    content_type: Option<&str>,
) -> TechnicalReport {
    let meta_robots = document
        .select(&META_ROBOTS)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "index, follow".to_string());

    let viewport = document.select(&VIEWPORT).next().is_some();
    let charset = document.select(&CHARSET).next().is_some()
        || document.select(&HTTP_EQUIV_CHARSET).next().is_some();
    let canonical = document
        .select(&CANONICAL)
        .next()
        .and_then(|el| el.value().attr("href"))
        .map(|s| s.to_string());

    let indexable = !meta_robots.to_lowercase().contains("noindex");
    let is_html = content_type
        .map(|ct| ct.starts_with("text/html"))
        .unwrap_or(false);

    let mut score: f64 = 0.0;
    if (200..300).contains(&status) {
        score += 25.0;
    }
    if is_html {
        score += 10.0;
    }
    if viewport {
        score += 20.0;
    }
    if charset {
        score += 15.0;
    }
    if canonical.is_some() {
        score += 10.0;
    }
    if indexable {
        score += 20.0;
    }

    TechnicalReport {
        meta_robots,
        viewport,
        charset,
        canonical,
        status,
        content_type: content_type.map(|s| s.to_string()),
        score: score.min(100.0),
    }
}
