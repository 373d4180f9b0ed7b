use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tracing::instrument;

use crate::error::{NovelError, Result};
use crate::models::{ChapterList, ChapterRef, Navigation};
use crate::services::library::{CHAPTER_DIR, Library, list_dirs};
use crate::utils::is_safe_segment;

pub const CHAPTER_SUFFIX: &str = ".json";
pub const AI_CACHE_SUFFIX: &str = "-ai.json";

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));

/// `<novel>/json/<volume>/<chapter>.json`
pub fn chapter_file(novel_path: &Path, volume: &str, chapter: &str) -> Result<PathBuf> {
    if !is_safe_segment(volume) || !is_safe_segment(chapter) {
        return Err(NovelError::chapter_not_found(volume, chapter));
    }
    Ok(novel_path
        .join(CHAPTER_DIR)
        .join(volume)
        .join(format!("{}{}", chapter, CHAPTER_SUFFIX)))
}

/// The rewrite cache sits next to the chapter: `<n>.json` -> `<n>-ai.json`.
pub fn ai_cache_file(chapter_file: &Path) -> PathBuf {
    let stem = chapter_file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    chapter_file.with_file_name(format!("{}{}", stem, AI_CACHE_SUFFIX))
}

fn is_chapter_file(name: &str) -> bool {
    name.ends_with(CHAPTER_SUFFIX) && !name.ends_with(AI_CACHE_SUFFIX)
}

#[instrument(skip(library))]
pub async fn list_chapters(library: &Library, novel_id: &str) -> Result<ChapterList> {
    let novel_path = library.resolve(novel_id).await?;
    let meta = library.metadata(&novel_path).await?;
    let json_dir = novel_path.join(CHAPTER_DIR);

    let mut chapters = Vec::new();
    for volume in list_dirs(&json_dir).await? {
        let mut entries = fs::read_dir(json_dir.join(&volume)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_chapter_file(&name) || !entry.file_type().await?.is_file() {
                continue;
            }
            let chapter = name.strip_suffix(CHAPTER_SUFFIX).unwrap_or(&name).to_string();
            chapters.push(ChapterRef {
                path: format!("{}/{}", volume, name),
                volume: volume.clone(),
                chapter,
            });
        }
    }

    sort_chapters(&mut chapters);
    Ok(ChapterList {
        title: meta.novel.title,
        chapters,
    })
}

pub fn volume_number(label: &str) -> Option<u64> {
    FIRST_NUMBER
        .find(label)
        .and_then(|m| m.as_str().parse().ok())
}

pub fn chapter_number(chapter: &str) -> Option<f64> {
    chapter.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Numbered keys first in ascending order, unnumbered after; raw strings break ties.
pub fn sort_chapters(chapters: &mut [ChapterRef]) {
    chapters.sort_by(compare_refs);
}

fn compare_refs(a: &ChapterRef, b: &ChapterRef) -> Ordering {
    compare_numbered(volume_number(&a.volume), volume_number(&b.volume), |x, y| x.cmp(y))
        .then_with(|| a.volume.cmp(&b.volume))
        .then_with(|| {
            compare_numbered(chapter_number(&a.chapter), chapter_number(&b.chapter), |x, y| {
                x.total_cmp(y)
            })
        })
        .then_with(|| a.chapter.cmp(&b.chapter))
}

fn compare_numbered<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl ChapterList {
    pub fn position(&self, volume: &str, chapter: &str) -> Option<usize> {
        self.chapters
            .iter()
            .position(|ch| ch.volume == volume && ch.chapter == chapter)
    }

    pub fn neighbors(&self, volume: &str, chapter: &str) -> Navigation {
        let Some(index) = self.position(volume, chapter) else {
            return Navigation::default();
        };
        Navigation {
            prev: index
                .checked_sub(1)
                .and_then(|i| self.chapters.get(i))
                .cloned(),
            current: self.chapters.get(index).cloned(),
            next: self.chapters.get(index + 1).cloned(),
        }
    }
}
