//! Text extraction helpers shared by the dimension analyzers.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};

static TEXT_BLOCKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("p, li, blockquote, h1, h2, h3, h4, h5, h6, td, th, dd, dt")
        .expect("static selector")
});

static FAQ_MARKERS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[class*=faq], [id*=faq], [class*=FAQ], [id*=FAQ]").expect("static selector")
});

/// Readable text from content-bearing elements, in document order.
/// Script and style bodies never appear because only text-level elements
/// are selected.
pub(crate) fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for element in document.select(&TEXT_BLOCKS) {
        let text: String = element.text().collect::<Vec<_>>().join(" ");
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !text.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&text);
        }
    }
    out
}

/// Split into sentences on terminal punctuation, keeping the terminator.
pub(crate) fn sentences(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                result.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        result.push(tail.to_string());
    }
    result
}

/// Number of sentences ending in a question mark.
pub(crate) fn question_count(text: &str) -> u32 {
    sentences(text)
        .iter()
        .filter(|s| s.ends_with('?'))
        .count() as u32
}

pub(crate) fn word_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// A container whose class or id names an FAQ section.
pub(crate) fn has_faq_element(document: &Html) -> bool {
    document.select(&FAQ_MARKERS).next().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentences_split_on_terminators() {
        let s = sentences("First one. Second? Third!");
        assert_eq!(s.len(), 3);
        assert_eq!(s[1], "Second?");
    }

    #[test]
    fn question_count_only_counts_questions() {
        assert_eq!(question_count("What is this? It is a test. Why? Because."), 2);
        assert_eq!(question_count("No questions here."), 0);
    }

    #[test]
    fn visible_text_skips_scripts() {
        let html = Html::parse_document(
            "<body><p>keep me</p><script>var discard = 1;</script></body>",
        );
        let text = visible_text(&html);
        assert!(text.contains("keep me"));
        assert!(!text.contains("discard"));
    }

    #[test]
    fn faq_marker_detection() {
        let with = Html::parse_document("<div class=\"faq-section\"><p>Q</p></div>");
        let without = Html::parse_document("<div class=\"content\"><p>Q</p></div>");
        assert!(has_faq_element(&with));
        assert!(!has_faq_element(&without));
    }
}
