//! Structure dimension: headings, lists, tables, semantic markup.

use geoscope_types::page::{CheckResult, StructureReport};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

static H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").expect("static selector"));
static LISTS: Lazy<Selector> = Lazy::new(|| Selector::parse("ul, ol").expect("static selector"));
static TABLES: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("static selector"));

const SEMANTIC_ELEMENTS: [&str; 7] = [
    "article", "section", "nav", "main", "aside", "header", "footer",
];

pub(crate) fn analyze(document: &Html) -> StructureReport {
    let h1_count = document.select(&H1).count() as u32;
    let h1_check = match h1_count {
        1 => CheckResult::pass(),
        0 => CheckResult::fail("page has no H1"),
        n => CheckResult::warn(format!("page has {} H1 elements", n)),
    };

    let heading_skips = heading_skips(document);
    let heading_hierarchy = if heading_skips.is_empty() {
        CheckResult::pass()
    } else {
        CheckResult::warn(format!("skipped levels: {}", heading_skips.join(", ")))
    };

    let list_usage = document.select(&LISTS).count() as u32;
    let table_usage = document.select(&TABLES).count() as u32;

    let semantic_elements: Vec<String> = SEMANTIC_ELEMENTS
        .iter()
        .filter(|name| {
            Selector::parse(name)
                .ok()
                .map(|sel| document.select(&sel).next().is_some())
                .unwrap_or(false)
        })
        .map(|name| name.to_string())
        .collect();
    let semantic_html_pct =
        (semantic_elements.len() as f64 / SEMANTIC_ELEMENTS.len() as f64) * 100.0;

    let mut score = 0.0;
    score += match h1_count {
        1 => 50.0,
        0 => 0.0,
        _ => 25.0,
    };
    if heading_skips.is_empty() {
        score += 25.0;
    } else {
        score += 10.0;
    }
    if list_usage > 0 {
        score += 10.0;
    }
    if table_usage > 0 {
        score += 5.0;
    }
    score += semantic_html_pct * 0.10;

    StructureReport {
        h1_check,
        h1_count,
        heading_hierarchy,
        heading_skips,
        list_usage,
        table_usage,
        semantic_elements,
        semantic_html_pct,
        score: score.min(100.0),
    }
}

/// Walk headings in document order and record any downward jump of more
/// than one level (e.g. an H2 followed by an H4).
fn heading_skips(document: &Html) -> Vec<String> {
    let mut skips = Vec::new();
    let mut previous: Option<u8> = None;
    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let level = match element.value().name() {
            "h1" => 1,
            "h2" => 2,
            "h3" => 3,
            "h4" => 4,
            "h5" => 5,
            "h6" => 6,
            _ => continue,
        };
        if let Some(prev) = previous {
            if level > prev + 1 {
                skips.push(format!("h{} -> h{}", prev, level));
            }
        }
        previous = Some(level);
    }
    skips
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoscope_types::page::CheckStatus;

    fn report(html: &str) -> StructureReport {
        analyze(&Html::parse_document(html))
    }

    #[test]
    fn single_h1_passes() {
        let r = report("<body><h1>One</h1></body>");
        assert_eq!(r.h1_check.status, CheckStatus::Pass);
        assert_eq!(r.h1_count, 1);
    }

    #[test]
    fn missing_h1_fails() {
        let r = report("<body><h2>Only h2</h2></body>");
        assert_eq!(r.h1_check.status, CheckStatus::Fail);
    }

    #[test]
    fn multiple_h1_warns() {
        let r = report("<body><h1>a</h1><h1>b</h1></body>");
        assert_eq!(r.h1_check.status, CheckStatus::Warn);
        assert_eq!(r.h1_count, 2);
    }

    #[test]
    fn skipped_heading_level_is_flagged() {
        let r = report("<body><h1>a</h1><h2>b</h2><h4>c</h4></body>");
        assert_eq!(r.heading_hierarchy.status, CheckStatus::Warn);
        assert_eq!(r.heading_skips, vec!["h2 -> h4".to_string()]);
    }

    #[test]
    fn clean_hierarchy_passes() {
        let r = report("<body><h1>a</h1><h2>b</h2><h3>c</h3><h2>d</h2></body>");
        assert_eq!(r.heading_hierarchy.status, CheckStatus::Pass);
        assert!(r.heading_skips.is_empty());
    }

    #[test]
    fn semantic_coverage_counts_distinct_landmarks() {
        let r = report(
            "<body><header></header><main><article><p>x</p></article></main>\
             <footer></footer></body>",
        );
        assert_eq!(r.semantic_elements.len(), 4);
        assert!((r.semantic_html_pct - 4.0 / 7.0 * 100.0).abs() < 0.01);
    }

    #[test]
    fn lists_and_tables_counted() {
        let r = report("<body><h1>x</h1><ul><li>a</li></ul><ol></ol><table></table></body>");
        assert_eq!(r.list_usage, 2);
        assert_eq!(r.table_usage, 1);
    }
}
