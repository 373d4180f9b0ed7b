//! Text cleanup shared by the reader, the rewrite cache and the glossary.
//!
//! Everything here is pure: HTML in, HTML or text out.

use std::sync::LazyLock;

use regex::Regex;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

// Inline markup allowed inside an attribution paragraph.
const INLINE: &str = r"(?:[^<]|</?(?:strong|b|em|i|a|span)\b[^>]*>)*";

const ATTRIBUTION_LABELS: &str = r"translator'?s? notes?|tl'?s? notes?|author'?s? notes?|translators?|translation|tl|editors?|ed|proofreaders?|proofread|pr|qc|quality check|notes?|tn|t/n|a/n|n/a|raw|source";

const ATTRIBUTION_PHRASES: &str = r"translated|edited|proofread|checked";

/// Ordered `(pattern, replacement)` table. Order matters: headings go first so the
/// chapter paragraph becomes the leading element, and empty-paragraph runs are
/// collapsed last, after the other rules have emptied them out.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    let table: Vec<(String, &'static str)> = vec![
        // <h1>..</h6> headings
        (r"(?is)<h[1-6][^>]*>.*?</h[1-6]>\s*".to_string(), ""),
        // leading "Chapter N" / "Chapter N: Title" paragraph
        (
            r"(?i)^\s*<p>\s*(?:<(?:strong|b)>\s*)?chapter\s+\d+(?:[:.\s\-–—][^<]*)?(?:</(?:strong|b)>\s*)?</p>\s*".to_string(),
            "",
        ),
        // "Translator: X", "<strong>Editor:</strong> Y", "TL Note - ..."
        (
            format!(
                r"(?i)<p>\s*(?:<(?:strong|b)>\s*)?(?:{})\s*(?:</(?:strong|b)>\s*)?[:：\-–—]{}</p>\s*",
                ATTRIBUTION_LABELS, INLINE
            ),
            "",
        ),
        // "Translated by X", "Edited by Y"
        (
            format!(
                r"(?i)<p>\s*(?:<(?:strong|b)>\s*)?(?:{})\s+by\b{}</p>\s*",
                ATTRIBUTION_PHRASES, INLINE
            ),
            "",
        ),
        // *** and --- dividers
        (r"<p>\s*(?:(?:\*\s*)+|(?:[-–—]\s*)+)</p>\s*".to_string(), ""),
        // runs of empty paragraphs
        (r"(?i)(?:<p>\s*</p>\s*){2,}".to_string(), "<p></p>"),
    ];

    table
        .into_iter()
        .map(|(pattern, replacement)| Rule {
            pattern: Regex::new(&pattern).expect("boilerplate rule must compile"),
            replacement,
        })
        .collect()
});

static CLOSING_P: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</p\s*>").expect("static regex"));
static LINE_BREAK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("static regex"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("static regex"));
static BLANK_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n").expect("static regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));

/// Removes headings, the leading chapter line, attribution lines and dividers.
pub fn strip_boilerplate(html: &str) -> String {
    RULES.iter().fold(html.to_string(), |body, rule| {
        rule.pattern.replace_all(&body, rule.replacement).into_owned()
    })
}

/// Paragraph ends become blank lines, `<br>` becomes a newline, every other tag is dropped.
pub fn html_to_plain_text(html: &str) -> String {
    let text = CLOSING_P.replace_all(html, "\n\n");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = ANY_TAG.replace_all(&text, "");
    html_escape::decode_html_entities(&text).trim().to_string()
}

/// Splits on blank lines and collapses inner whitespace.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    BLANK_LINE
        .split(text)
        .map(|p| WHITESPACE.replace_all(p, " ").trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

pub fn paragraphs_to_html(paragraphs: &[String]) -> String {
    paragraphs
        .iter()
        .map(|p| format!("<p>{}</p>", html_escape::encode_text(p.trim())))
        .collect::<Vec<_>>()
        .join("\n")
}
