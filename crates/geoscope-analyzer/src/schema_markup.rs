//! Schema dimension: JSON-LD structured data.

use chrono::NaiveDate;
use geoscope_types::page::{SchemaPresence, SchemaReport};
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

static LD_JSON: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script[type=\"application/ld+json\"]").expect("static selector")
});
static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("static selector"));

/// Schema findings plus the fields other dimensions borrow (author,
/// publication dates, FAQ detection).
#[derive(Debug, Clone)]
pub(crate) struct SchemaAnalysis {
    pub report: SchemaReport,
    pub author_name: Option<String>,
    pub dates: Vec<NaiveDate>,
    pub has_faq: bool,
}

pub(crate) fn analyze(document: &Html, question_count: u32, has_faq_block: bool) -> SchemaAnalysis {
    let mut types: Vec<String> = Vec::new();
    let mut invalid_blocks = 0u32;
    let mut author_name = None;
    let mut dates = Vec::new();

    for script in document.select(&LD_JSON) {
        let raw: String = script.text().collect();
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => {
                collect_block(&value, &mut types, &mut author_name, &mut dates);
            }
            Err(_) => invalid_blocks += 1,
        }
    }

    types.sort();
    types.dedup();

    let has_faq = types.iter().any(|t| t == "FAQPage");
    let schema_presence = if types.is_empty() && invalid_blocks == 0 {
        SchemaPresence::Absent
    } else if types.is_empty() {
        // Blocks existed but none parsed.
        SchemaPresence::Absent
    } else {
        SchemaPresence::Present
    };

    let recommendations = recommend(
        &types,
        document.select(&ARTICLE).next().is_some(),
        question_count >= 3 || has_faq_block,
    );

    let mut score = 0.0;
    if schema_presence == SchemaPresence::Present {
        score += 40.0;
        score += (types.len() as f64 * 15.0).min(30.0);
        if invalid_blocks == 0 {
            score += 10.0;
        }
        score += (20.0 - recommendations.len() as f64 * 10.0).max(0.0);
    }

    SchemaAnalysis {
        report: SchemaReport {
            schema_presence,
            schema_types: types,
            invalid_blocks,
            recommendations,
            score: score.min(100.0),
        },
        author_name,
        dates,
        has_faq,
    }
}

/// Walk one JSON-LD block, including `@graph` containers and arrays,
/// collecting types, authors, and publication dates.
fn collect_block(
    value: &Value,
    types: &mut Vec<String>,
    author: &mut Option<String>,
    dates: &mut Vec<NaiveDate>,
) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_block(item, types, author, dates);
            }
        }
        Value::Object(map) => {
            if let Some(type_value) = map.get("@type") {
                match type_value {
                    Value::String(s) => types.push(s.clone()),
                    Value::Array(list) => {
                        types.extend(list.iter().filter_map(|v| v.as_str().map(String::from)))
                    }
                    _ => {}
                }
            }
            if author.is_none() {
                if let Some(found) = extract_author(map.get("author")) {
                    *author = Some(found);
                }
            }
            for key in ["datePublished", "dateModified"] {
                if let Some(date) = map.get(key).and_then(Value::as_str).and_then(parse_date) {
                    dates.push(date);
                }
            }
            if let Some(graph) = map.get("@graph") {
                collect_block(graph, types, author, dates);
            }
        }
        _ => {}
    }
}

fn extract_author(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Object(map) => map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
        Value::Array(items) => items.iter().find_map(|v| extract_author(Some(v))),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let prefix: String = raw.chars().take(10).collect();
    NaiveDate::parse_from_str(&prefix, "%Y-%m-%d").ok()
}

/// Missing types commonly expected for the inferred page kind.
fn recommend(types: &[String], blog_like: bool, qa_detected: bool) -> Vec<String> {
    let mut recommendations = Vec::new();
    let has = |t: &str| types.iter().any(|existing| existing == t);
    if !has("Organization") {
        recommendations.push("Organization".to_string());
    }
    if blog_like && !has("Article") && !has("BlogPosting") && !has("NewsArticle") {
        recommendations.push("Article".to_string());
    }
    if qa_detected && !has("FAQPage") {
        recommendations.push("FAQPage".to_string());
    }
    recommendations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(html: &str) -> SchemaAnalysis {
        analyze(&Html::parse_document(html), 0, false)
    }

    #[test]
    fn absent_when_no_blocks() {
        let a = run("<body><p>no schema</p></body>");
        assert_eq!(a.report.schema_presence, SchemaPresence::Absent);
        assert_eq!(a.report.score, 0.0);
        assert!(a.report.recommendations.contains(&"Organization".to_string()));
    }

    #[test]
    fn invalid_json_tolerated_and_counted() {
        let a = run(
            "<body><script type=\"application/ld+json\">{not json</script></body>",
        );
        assert_eq!(a.report.invalid_blocks, 1);
        assert_eq!(a.report.schema_presence, SchemaPresence::Absent);
    }

    #[test]
    fn types_collected_across_blocks_and_graphs() {
        let a = run(
            r#"<body>
            <script type="application/ld+json">
              {"@context":"https://schema.org","@graph":[
                {"@type":"Organization","name":"Acme"},
                {"@type":"WebSite"}]}
            </script>
            <script type="application/ld+json">
              {"@type":"Article","author":{"@type":"Person","name":"Jane Doe"},
               "datePublished":"2026-01-15T08:00:00Z"}
            </script>
            </body>"#,
        );
        assert_eq!(a.report.schema_presence, SchemaPresence::Present);
        assert_eq!(
            a.report.schema_types,
            vec!["Article", "Organization", "WebSite"]
        );
        assert_eq!(a.author_name.as_deref(), Some("Jane Doe"));
        assert_eq!(a.dates, vec![NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()]);
    }

    #[test]
    fn faq_recommended_when_questions_detected() {
        let a = analyze(&Html::parse_document("<body><p>q</p></body>"), 4, false);
        assert!(a.report.recommendations.contains(&"FAQPage".to_string()));
    }

    #[test]
    fn article_recommended_for_article_pages() {
        let a = run("<body><article><p>post</p></article></body>");
        assert!(a.report.recommendations.contains(&"Article".to_string()));
    }

    #[test]
    fn faq_page_type_detected() {
        let a = run(
            "<body><script type=\"application/ld+json\">{\"@type\":\"FAQPage\"}</script></body>",
        );
        assert!(a.has_faq);
        assert!(!a.report.recommendations.contains(&"FAQPage".to_string()));
    }
}
