use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::error::{NovelError, Result};
use crate::models::{ChapterKey, Glossary, GlossaryTerm};
use crate::services::cleaner::{html_to_plain_text, split_paragraphs, strip_boilerplate};
use crate::services::index::list_chapters;
use crate::services::library::{CHAPTER_DIR, Library};
use crate::services::llm::{AskRequest, Rewriter};
use crate::services::reader::load_chapter;
use crate::utils::{read_json, write_json_atomic};

pub const GLOSSARY_FILE: &str = "glossary.json";

const TERM_TYPES: &[&str] = &["person", "location", "organization", "item", "technique", "other"];

const EXTRACTION_INSTRUCTIONS: &str = "You build glossaries for novels. Respond only with a JSON array of objects with the keys \"term\", \"description\" and \"type\". \"type\" is one of person, location, organization, item, technique, other. Keep each description under 200 characters.";

const EXTRACTION_CONTEXT: &str =
    "List the important characters, places, organizations, items and techniques named in the following novel text.";

pub struct GlossaryService {
    library: Arc<Library>,
    rewriter: Arc<dyn Rewriter>,
    chunk_chars: usize,
}

impl GlossaryService {
    pub fn new(library: Arc<Library>, rewriter: Arc<dyn Rewriter>, chunk_chars: usize) -> Self {
        Self {
            library,
            rewriter,
            chunk_chars: chunk_chars.max(1),
        }
    }

    pub async fn get(&self, novel_id: &str) -> Result<Option<Glossary>> {
        let path = self.library.resolve(novel_id).await?.join(GLOSSARY_FILE);
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }
        read_json(&path).await.map(Some)
    }

    /// Extracts terms chunk by chunk over the whole novel. Chunks the AI cannot
    /// answer are skipped; the job only fails when every chunk fails.
    #[instrument(skip(self))]
    pub async fn generate(&self, novel_id: &str) -> Result<Glossary> {
        let novel_path = self.library.resolve(novel_id).await?;
        let list = list_chapters(&self.library, novel_id).await?;

        let mut texts = Vec::with_capacity(list.chapters.len());
        for chapter in &list.chapters {
            let key = ChapterKey::new(novel_id, &chapter.volume, &chapter.chapter);
            let path = novel_path.join(CHAPTER_DIR).join(&chapter.path);
            match load_chapter(&path, &key).await {
                Ok(stored) => texts.push(html_to_plain_text(&strip_boilerplate(&stored.body))),
                Err(e) => warn!("Skipping {} in glossary: {}", key, e),
            }
        }

        let chunks = chunk_paragraphs(&texts.join("\n\n"), self.chunk_chars);
        info!("Extracting glossary from {} chunks", chunks.len());

        let mut terms = Vec::new();
        let mut last_error = None;
        let mut answered = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            let request = AskRequest {
                question: chunk.clone(),
                context: Some(EXTRACTION_CONTEXT.to_string()),
                instructions: EXTRACTION_INSTRUCTIONS.to_string(),
            };
            match self.rewriter.ask(&request).await {
                Ok(answer) => match parse_terms(&answer) {
                    Some(found) => {
                        answered += 1;
                        terms.extend(found);
                    }
                    None => {
                        warn!("Glossary chunk {} returned no JSON array", i + 1);
                        last_error = Some(format!("chunk {} returned no JSON array", i + 1));
                    }
                },
                Err(e) => {
                    warn!("Glossary chunk {} failed: {:#}", i + 1, e);
                    last_error = Some(format!("{:#}", e));
                }
            }
        }

        if answered == 0 {
            if let Some(error) = last_error {
                return Err(NovelError::AiProvider(error));
            }
        }

        let glossary = Glossary {
            terms: merge_terms(terms),
            last_updated: Some(Utc::now()),
        };
        write_json_atomic(&novel_path.join(GLOSSARY_FILE), &glossary).await?;
        info!(terms = glossary.terms.len(), "Glossary saved");
        Ok(glossary)
    }
}

/// Packs whole paragraphs into chunks of at most `max_chars` characters.
/// A single paragraph longer than that becomes a chunk of its own.
pub fn chunk_paragraphs(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for paragraph in split_paragraphs(text) {
        let len = paragraph.chars().count();
        if current_len > 0 && current_len + 2 + len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push_str("\n\n");
            current_len += 2;
        }
        current.push_str(&paragraph);
        current_len += len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Pulls the outermost `[...]` out of an answer that may wrap it in prose or fences.
pub fn parse_terms(answer: &str) -> Option<Vec<GlossaryTerm>> {
    let start = answer.find('[')?;
    let end = answer.rfind(']')?;
    if end < start {
        return None;
    }

    let raw: Vec<GlossaryTerm> = serde_json::from_str(&answer[start..=end]).ok()?;
    Some(
        raw.into_iter()
            .map(|t| GlossaryTerm {
                term: t.term.trim().to_string(),
                description: t.description.trim().to_string(),
                kind: normalize_type(&t.kind),
            })
            .filter(|t| !t.term.is_empty())
            .collect(),
    )
}

fn normalize_type(kind: &str) -> String {
    let kind = kind.trim().to_lowercase();
    if TERM_TYPES.contains(&kind.as_str()) {
        kind
    } else {
        "other".to_string()
    }
}

/// Case-insensitive dedup in first-seen order; the longer description wins.
pub fn merge_terms(terms: Vec<GlossaryTerm>) -> Vec<GlossaryTerm> {
    let mut merged: Vec<GlossaryTerm> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for term in terms {
        let key = term.term.to_lowercase();
        match seen.get(&key) {
            Some(&i) => {
                if term.description.chars().count() > merged[i].description.chars().count() {
                    merged[i].description = term.description;
                    merged[i].kind = term.kind;
                }
            }
            None => {
                seen.insert(key, merged.len());
                merged.push(term);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::testing::ScriptedRewriter;
    use crate::services::testing::LibraryFixture;

    fn term(name: &str, description: &str, kind: &str) -> GlossaryTerm {
        GlossaryTerm {
            term: name.to_string(),
            description: description.to_string(),
            kind: kind.to_string(),
        }
    }

    #[test]
    fn chunks_respect_paragraph_boundaries() {
        let text = "aaaa\n\nbbbb\n\ncccccccccccc\n\ndd";
        let chunks = chunk_paragraphs(text, 10);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccccccccccc", "dd"]);
        assert!(chunk_paragraphs("", 10).is_empty());
    }

    #[test]
    fn parses_array_wrapped_in_prose() {
        let answer = "Here you go:\n```json\n[{\"term\": \" Lin Feng \", \"description\": \"The protagonist.\", \"type\": \"Person\"}, {\"term\": \"Azure Sect\", \"description\": \"A sect.\", \"type\": \"faction\"}, {\"term\": \"\", \"description\": \"x\", \"type\": \"item\"}]\n```";
        let terms = parse_terms(answer).unwrap();

        assert_eq!(
            terms,
            vec![
                term("Lin Feng", "The protagonist.", "person"),
                term("Azure Sect", "A sect.", "other"),
            ]
        );
        assert!(parse_terms("I could not find any terms.").is_none());
    }

    #[test]
    fn merge_keeps_longer_description() {
        let merged = merge_terms(vec![
            term("Lin Feng", "Hero.", "person"),
            term("Azure Sect", "A sect.", "organization"),
            term("lin feng", "The stubborn hero of the story.", "person"),
            term("LIN FENG", "Short.", "other"),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].term, "Lin Feng");
        assert_eq!(merged[0].description, "The stubborn hero of the story.");
        assert_eq!(merged[0].kind, "person");
    }

    #[tokio::test]
    async fn generate_tolerates_failed_chunks_and_persists() {
        let fixture = LibraryFixture::new();
        fixture.novel("site", "foo", "Foo");
        fixture.chapter("site", "foo", "Volume 1", "1", "<p>Lin Feng entered the Azure Sect.</p>");
        fixture.chapter("site", "foo", "Volume 1", "2", "<p>Lin Feng drew the Heaven Splitter.</p>");

        let rewriter = Arc::new(ScriptedRewriter::new(vec![
            Ok(r#"[{"term": "Lin Feng", "description": "Disciple.", "type": "person"}, {"term": "Azure Sect", "description": "A sect.", "type": "organization"}]"#),
            Err("rate limited"),
        ]));
        let service = GlossaryService::new(Arc::new(fixture.library()), rewriter.clone(), 40);

        assert!(service.get("foo").await.unwrap().is_none());

        let glossary = service.generate("foo").await.unwrap();
        assert_eq!(rewriter.calls(), 2);
        assert_eq!(glossary.terms.len(), 2);
        assert!(glossary.last_updated.is_some());

        let stored = service.get("foo").await.unwrap().unwrap();
        assert_eq!(stored.terms, glossary.terms);
    }

    #[tokio::test]
    async fn generate_fails_when_every_chunk_fails() {
        let fixture = LibraryFixture::new();
        fixture.novel("site", "foo", "Foo");
        fixture.chapter("site", "foo", "Volume 1", "1", "<p>Lin Feng entered the Azure Sect.</p>");

        let rewriter = Arc::new(ScriptedRewriter::new(vec![Err("provider offline")]));
        let service = GlossaryService::new(Arc::new(fixture.library()), rewriter, 1000);

        let result = service.generate("foo").await;
        assert!(matches!(result, Err(NovelError::AiProvider(_))));
        assert!(service.get("foo").await.unwrap().is_none());
    }
}
