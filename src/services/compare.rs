//! Side-by-side view of a rewritten chapter and its original.
//!
//! Pairing is purely positional. Once the rewrite adds or drops a paragraph,
//! everything after that point is misaligned; no attempt is made to realign.

pub const NO_ORIGINAL: &str = "<p>(No original content)</p>";
pub const NO_AI: &str = "<p>(No AI content)</p>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParagraphPair {
    pub ai: String,
    pub original: String,
}

/// Splits on `</p>` and keeps only the pieces that open with `<p>`.
pub fn split_html_paragraphs(html: &str) -> Vec<String> {
    html.split("</p>")
        .map(str::trim)
        .filter(|p| p.starts_with("<p>"))
        .map(|p| format!("{}</p>", p))
        .collect()
}

/// `max(m, n)` pairs; the shorter side is padded with a placeholder.
pub fn pair_paragraphs(original_html: &str, ai_html: &str) -> Vec<ParagraphPair> {
    let original = split_html_paragraphs(original_html);
    let ai = split_html_paragraphs(ai_html);
    let len = original.len().max(ai.len());

    (0..len)
        .map(|i| ParagraphPair {
            ai: ai.get(i).cloned().unwrap_or_else(|| NO_AI.to_string()),
            original: original
                .get(i)
                .cloned()
                .unwrap_or_else(|| NO_ORIGINAL.to_string()),
        })
        .collect()
}

pub fn merge(original_html: &str, ai_html: &str) -> String {
    let pairs: String = pair_paragraphs(original_html, ai_html)
        .iter()
        .map(|pair| {
            format!(
                r#"<div class="paragraph-pair"><div class="ai-text">{}</div><aside class="original-text">{}</aside></div>"#,
                pair.ai, pair.original
            )
        })
        .collect();

    format!(r#"<div class="compare-container">{}</div>"#, pairs)
}
