//! Memoized AI rewrites, one `<n>-ai.json` per chapter.
//!
//! Per chapter the cache moves through:
//!
//! ```text
//! Uncached --generate--> Generated      (valid file written)
//!                    \--> Failed         (refusal text, nothing written)
//! Invalid  --delete----> Uncached
//! Generated --regenerate (delete)--> Uncached
//! ```
//!
//! The existence check and the write are not locked. Two requests racing on the
//! same uncached chapter both call the AI and the last rename wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::error::{NovelError, Result};
use crate::models::{AiSettings, ChapterKey, StoredChapter};
use crate::services::cleaner::{html_to_plain_text, paragraphs_to_html, split_paragraphs, strip_boilerplate};
use crate::services::index::{ai_cache_file, chapter_file};
use crate::services::library::Library;
use crate::services::llm::{AskRequest, Rewriter};
use crate::services::reader::load_chapter;
use crate::utils::write_json_atomic;

pub const REWRITE_CONTEXT: &str = "Please rewrite the following novel chapter text to enhance its quality while maintaining the original story and meaning.";

/// Lowercase phrases that mark an answer as a non-answer.
const REFUSAL_PHRASES: &[&str] = &[
    "i don't have enough information to answer",
    "could you clarify your question?",
    "i'm not sure i fully understood it",
];

const SKIPPED_PREFIXES: &[&str] = &["Translator:", "Editor:", "Chapter"];

const MIN_PARAGRAPH_CHARS: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub enum CacheState {
    Uncached,
    Generated(StoredChapter),
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// Served from an existing cache file, no AI call made.
    Cached(StoredChapter),
    /// Freshly generated and written to the cache.
    Generated(StoredChapter),
    /// The AI answered with a refusal or nothing usable; no file was written.
    Failed(String),
}

impl RewriteOutcome {
    pub fn into_chapter(self) -> Option<StoredChapter> {
        match self {
            RewriteOutcome::Cached(chapter) | RewriteOutcome::Generated(chapter) => Some(chapter),
            RewriteOutcome::Failed(_) => None,
        }
    }
}

pub struct RewriteCache {
    library: Arc<Library>,
    rewriter: Arc<dyn Rewriter>,
}

impl RewriteCache {
    pub fn new(library: Arc<Library>, rewriter: Arc<dyn Rewriter>) -> Self {
        Self { library, rewriter }
    }

    async fn chapter_path(&self, key: &ChapterKey) -> Result<PathBuf> {
        let novel_path = self.library.resolve(&key.novel_id).await?;
        chapter_file(&novel_path, &key.volume, &key.chapter)
    }

    pub async fn lookup(&self, key: &ChapterKey) -> Result<CacheState> {
        let chapter_path = self.chapter_path(key).await?;
        Ok(lookup_file(&ai_cache_file(&chapter_path)).await)
    }

    /// Returns the cached rewrite, or produces one.
    #[instrument(skip(self, settings), fields(chapter = %key))]
    pub async fn resolve_or_generate(&self, key: &ChapterKey, settings: &AiSettings) -> Result<RewriteOutcome> {
        let chapter_path = self.chapter_path(key).await?;
        let cache_path = ai_cache_file(&chapter_path);

        match lookup_file(&cache_path).await {
            CacheState::Generated(chapter) => {
                debug!("AI content already exists: {}", cache_path.display());
                return Ok(RewriteOutcome::Cached(chapter));
            }
            CacheState::Invalid(reason) => {
                warn!("Discarding invalid AI cache {}: {}", cache_path.display(), reason);
                remove_if_exists(&cache_path).await?;
            }
            CacheState::Uncached => {}
        }

        let original = load_chapter(&chapter_path, key).await?;
        self.generate(original, &cache_path, settings).await
    }

    /// Drops any cached rewrite and generates a new one.
    #[instrument(skip(self, settings), fields(chapter = %key))]
    pub async fn regenerate(&self, key: &ChapterKey, settings: &AiSettings) -> Result<RewriteOutcome> {
        let chapter_path = self.chapter_path(key).await?;
        let cache_path = ai_cache_file(&chapter_path);

        if remove_if_exists(&cache_path).await? {
            info!("Deleted existing AI file {}", cache_path.display());
        }

        let original = load_chapter(&chapter_path, key).await?;
        self.generate(original, &cache_path, settings).await
    }

    async fn generate(
        &self,
        original: StoredChapter,
        cache_path: &Path,
        settings: &AiSettings,
    ) -> Result<RewriteOutcome> {
        let plain_text = html_to_plain_text(&strip_boilerplate(&original.body));
        if plain_text.is_empty() {
            return Ok(RewriteOutcome::Failed("chapter has no text to rewrite".to_string()));
        }

        let request = AskRequest {
            question: plain_text,
            context: Some(REWRITE_CONTEXT.to_string()),
            instructions: settings.effective_prompt().to_string(),
        };

        info!("Calling AI service for content generation");
        let answer = self
            .rewriter
            .ask(&request)
            .await
            .map_err(|e| NovelError::AiProvider(format!("{:#}", e)))?;

        let paragraphs = ai_paragraphs(&answer);
        if let Some(phrase) = find_refusal(&paragraphs) {
            warn!("AI generation produced invalid content: {:?}", phrase);
            return Ok(RewriteOutcome::Failed(format!("AI response contains {:?}", phrase)));
        }
        if paragraphs.is_empty() {
            warn!("AI generation produced no usable paragraphs");
            return Ok(RewriteOutcome::Failed("AI response has no usable paragraphs".to_string()));
        }

        let rewritten = StoredChapter {
            body: paragraphs_to_html(&paragraphs),
            is_ai_generated: Some(true),
            generated_at: Some(Utc::now()),
            ..original
        };
        write_json_atomic(cache_path, &rewritten).await?;
        info!(paragraphs = paragraphs.len(), "Saved AI content to {}", cache_path.display());

        Ok(RewriteOutcome::Generated(rewritten))
    }
}

async fn lookup_file(cache_path: &Path) -> CacheState {
    let content = match fs::read_to_string(cache_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return CacheState::Uncached,
        Err(e) => return CacheState::Invalid(e.to_string()),
    };

    match serde_json::from_str::<StoredChapter>(&content) {
        Ok(chapter) if chapter.is_valid_rewrite() => CacheState::Generated(chapter),
        Ok(_) => CacheState::Invalid("missing body or isAIGenerated flag".to_string()),
        Err(e) => CacheState::Invalid(e.to_string()),
    }
}

/// `Ok(true)` when a file was removed.
async fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Blank-line paragraphs of an AI answer, minus credits, chapter lines and fragments.
pub fn ai_paragraphs(answer: &str) -> Vec<String> {
    split_paragraphs(answer)
        .into_iter()
        .filter(|p| !SKIPPED_PREFIXES.iter().any(|prefix| p.starts_with(prefix)))
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .collect()
}

fn find_refusal(paragraphs: &[String]) -> Option<&'static str> {
    paragraphs.iter().find_map(|p| {
        let normalized = p.to_lowercase().replace('\u{2019}', "'");
        REFUSAL_PHRASES
            .iter()
            .copied()
            .find(|phrase| normalized.contains(phrase))
    })
}
