//! Content dimension: answer shape, tone, and question targeting.

use geoscope_types::page::{CheckResult, ContentReport};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html};

use crate::text;

/// First/second-person tokens counted for conversational tone.
static PRONOUNS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "i", "me", "my", "mine", "we", "us", "our", "ours", "you", "your", "yours",
    ]
});

/// Characters of preamble tolerated before the lead paragraph.
const LEAD_WINDOW: usize = 300;

pub(crate) fn analyze(
    document: &Html,
    body_text: &str,
    question_count: u32,
    has_faq_block: bool,
) -> ContentReport {
    let word_count = text::word_count(body_text);
    let lead = lead_paragraph(document);

    let fragment_clarity = match &lead {
        Some(lead_text) => {
            let mut clarity: u8 = if lead_text.len() >= 80 {
                10
            } else if lead_text.len() >= 40 {
                8
            } else {
                4
            };
            if !lead_within_window(body_text, lead_text) {
                clarity /= 2;
            }
            clarity
        }
        None => 0,
    };

    let conversational_tone = tone_score(body_text, word_count);

    let question_targeting = if question_count >= 3 || has_faq_block {
        CheckResult::pass()
    } else if question_count > 0 {
        CheckResult::warn(format!("only {} question sentence(s)", question_count))
    } else {
        CheckResult::fail("no question sentences or FAQ block")
    };

    let inverted_pyramid = match &lead {
        Some(lead_text) => {
            let lead_sentences = text::sentences(lead_text);
            let direct_answer = lead_sentences
                .first()
                .map(|s| !s.ends_with('?'))
                .unwrap_or(false);
            let substantial = lead_sentences
                .iter()
                .take(2)
                .map(|s| s.len())
                .sum::<usize>()
                >= 40;
            if direct_answer && substantial {
                CheckResult::pass()
            } else {
                CheckResult::fail("opening sentences do not answer directly")
            }
        }
        None => CheckResult::fail("no lead paragraph"),
    };

    let mut score = 0.0;
    score += fragment_clarity as f64 * 4.0;
    score += conversational_tone as f64;
    score += match question_targeting.status {
        geoscope_types::page::CheckStatus::Pass => 20.0,
        geoscope_types::page::CheckStatus::Warn => 10.0,
        geoscope_types::page::CheckStatus::Fail => 0.0,
    };
    if inverted_pyramid.passed() {
        score += 30.0;
    }

    ContentReport {
        fragment_clarity,
        conversational_tone,
        question_targeting,
        question_count,
        inverted_pyramid,
        word_count,
        error: None,
        score: score.min(100.0),
    }
}

/// Text of the first paragraph that appears before any sub-heading, in
/// document order.
fn lead_paragraph(document: &Html) -> Option<String> {
    for node in document.root_element().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        match element.value().name() {
            "p" => {
                let raw: String = element.text().collect::<Vec<_>>().join(" ");
                let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
                if !collapsed.is_empty() {
                    return Some(collapsed);
                }
            }
            "h2" | "h3" | "h4" | "h5" | "h6" => return None,
            _ => {}
        }
    }
    None
}

/// The lead must start within the first [`LEAD_WINDOW`] characters of the
/// page's visible text.
fn lead_within_window(body_text: &str, lead: &str) -> bool {
    let probe_end = lead
        .char_indices()
        .take(40)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    let probe = &lead[..probe_end];
    if probe.is_empty() {
        return true;
    }
    match body_text.find(probe) {
        Some(offset) => offset <= LEAD_WINDOW,
        None => true,
    }
}

/// 0-10 from first/second-person pronoun density.
fn tone_score(body_text: &str, word_count: u32) -> u8 {
    if word_count == 0 {
        return 0;
    }
    let pronouns = body_text
        .split_whitespace()
        .filter(|word| {
            let normalized: String = word
                .chars()
                .filter(|c| c.is_alphabetic())
                .collect::<String>()
                .to_lowercase();
            PRONOUNS.contains(&normalized.as_str())
        })
        .count() as f64;
    let density = pronouns / word_count as f64 * 100.0;
    ((density * 2.0).round() as u8).min(10)
}
