use std::path::Path;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::{NovelError, Result};
use crate::models::{AiSettings, ChapterContent, ChapterEntry, ChapterKey, StoredChapter};
use crate::services::cleaner::strip_boilerplate;
use crate::services::compare;
use crate::services::index::{chapter_file, list_chapters};
use crate::services::library::{CHAPTER_DIR, Library};
use crate::services::preload::{PreloadJob, PreloadQueue};
use crate::services::rewrite::{CacheState, RewriteCache};
use crate::services::settings::SettingsStore;
use crate::utils::read_json;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    pub use_ai: bool,
    pub compare: bool,
}

/// Loads a stored chapter file. Missing, unreadable or body-less files all
/// count as a missing chapter.
pub(crate) async fn load_chapter(path: &Path, key: &ChapterKey) -> Result<StoredChapter> {
    let chapter: StoredChapter = read_json(path).await.map_err(|e| {
        warn!("Error reading chapter file {}: {}", path.display(), e);
        NovelError::chapter_not_found(&key.volume, &key.chapter)
    })?;

    if chapter.body.trim().is_empty() {
        warn!("Invalid chapter data format in {}", path.display());
        return Err(NovelError::chapter_not_found(&key.volume, &key.chapter));
    }
    Ok(chapter)
}

/// Every readable original chapter of a novel, in reading order, as stored.
/// Unreadable files are logged and left out.
#[instrument(skip(library))]
pub async fn load_all_chapters(library: &Library, novel_id: &str) -> Result<Vec<ChapterEntry>> {
    let novel_path = library.resolve(novel_id).await?;
    let list = list_chapters(library, novel_id).await?;

    let mut entries = Vec::with_capacity(list.chapters.len());
    for chapter in list.chapters {
        let key = ChapterKey::new(novel_id, &chapter.volume, &chapter.chapter);
        let path = novel_path.join(CHAPTER_DIR).join(&chapter.path);
        match load_chapter(&path, &key).await {
            Ok(data) => entries.push(ChapterEntry {
                volume: chapter.volume,
                chapter: chapter.chapter,
                data,
            }),
            Err(e) => warn!("Skipping {} in chapter dump: {}", key, e),
        }
    }
    Ok(entries)
}

pub struct ChapterReader {
    library: Arc<Library>,
    settings: Arc<SettingsStore>,
    cache: Arc<RewriteCache>,
    preload: PreloadQueue,
    inline_generation: bool,
    prefetch_next: bool,
}

impl ChapterReader {
    pub fn new(
        library: Arc<Library>,
        settings: Arc<SettingsStore>,
        cache: Arc<RewriteCache>,
        preload: PreloadQueue,
    ) -> Self {
        Self {
            library,
            settings,
            cache,
            preload,
            inline_generation: false,
            prefetch_next: true,
        }
    }

    pub fn inline_generation(mut self, inline: bool) -> Self {
        self.inline_generation = inline;
        self
    }

    pub fn prefetch_next(mut self, prefetch: bool) -> Self {
        self.prefetch_next = prefetch;
        self
    }

    /// Original text unless the request asks for AI *and* AI is enabled globally.
    /// AI problems never fail the read; they surface as `no_ai_content`.
    #[instrument(skip(self), fields(chapter = %key))]
    pub async fn read(&self, key: &ChapterKey, options: ReadOptions) -> Result<ChapterContent> {
        let novel_path = self.library.resolve(&key.novel_id).await?;
        let novel_title = self.library.metadata(&novel_path).await?.novel.title;
        let chapter_path = chapter_file(&novel_path, &key.volume, &key.chapter)?;
        let original = load_chapter(&chapter_path, key).await?;

        let mut content = ChapterContent {
            title: original.title,
            body: strip_boilerplate(&original.body),
            novel_title,
            volume: key.volume.clone(),
            chapter: key.chapter.clone(),
            is_ai_generated: None,
            generated_at: None,
            no_ai_content: false,
        };

        if !options.use_ai {
            return Ok(content);
        }
        let settings = self.settings.load().await;
        if !settings.enabled {
            debug!("AI rewriting is disabled, serving original text");
            return Ok(content);
        }

        let rewrite = if self.inline_generation {
            self.generate_inline(key, &settings).await
        } else {
            self.cached_or_enqueue(key).await?
        };

        match rewrite {
            Some(ai) => {
                let ai_body = strip_boilerplate(&ai.body);
                content.body = if options.compare {
                    compare::merge(&content.body, &ai_body)
                } else {
                    ai_body
                };
                content.is_ai_generated = Some(true);
                content.generated_at = ai.generated_at;
            }
            None => {
                content.no_ai_content = true;
                if !self.inline_generation {
                    content.body.clear();
                }
            }
        }

        if self.prefetch_next {
            self.preload.enqueue(PreloadJob::NextAfter(key.clone()));
        }
        Ok(content)
    }

    async fn cached_or_enqueue(&self, key: &ChapterKey) -> Result<Option<StoredChapter>> {
        match self.cache.lookup(key).await? {
            CacheState::Generated(chapter) => Ok(Some(chapter)),
            CacheState::Invalid(reason) => {
                warn!("Invalid AI data for {}: {}", key, reason);
                self.preload.enqueue(PreloadJob::Chapter(key.clone()));
                Ok(None)
            }
            CacheState::Uncached => {
                debug!("No AI content for {}, queueing generation", key);
                self.preload.enqueue(PreloadJob::Chapter(key.clone()));
                Ok(None)
            }
        }
    }

    async fn generate_inline(&self, key: &ChapterKey, settings: &AiSettings) -> Option<StoredChapter> {
        match self.cache.resolve_or_generate(key, settings).await {
            Ok(outcome) => outcome.into_chapter(),
            Err(e) => {
                warn!("AI generation for {} failed, falling back to original: {}", key, e);
                None
            }
        }
    }
}
