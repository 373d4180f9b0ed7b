use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::{NovelError, Result};
use crate::models::{Novel, NovelMeta};
use crate::utils::{is_hidden, is_safe_segment, read_json};

pub const META_FILE: &str = "meta.json";
pub const CHAPTER_DIR: &str = "json";

/// The on-disk novel tree: `<root>/<site>/<novel>/`.
///
/// Nothing is cached; every lookup rescans the two directory levels.
#[derive(Debug, Clone)]
pub struct Library {
    root: PathBuf,
    case_insensitive: bool,
}

impl Library {
    pub fn new(root: impl Into<PathBuf>, case_insensitive: bool) -> Self {
        Self {
            root: root.into(),
            case_insensitive,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Finds the directory of `novel_id`. An exact name match in any site wins over
    /// a case-insensitive match; the first site (in directory order) wins among equals.
    #[instrument(skip(self))]
    pub async fn resolve(&self, novel_id: &str) -> Result<PathBuf> {
        if !is_safe_segment(novel_id) {
            return Err(NovelError::NovelNotFound(novel_id.to_string()));
        }

        let mut folded_match = None;
        for site in self.sites().await? {
            for novel in list_dirs(&site).await? {
                if novel == novel_id {
                    return Ok(site.join(novel));
                }
                if self.case_insensitive
                    && folded_match.is_none()
                    && novel.to_lowercase() == novel_id.to_lowercase()
                {
                    folded_match = Some(site.join(novel));
                }
            }
        }

        match folded_match {
            Some(path) => {
                debug!("Resolved {} case-insensitively to {}", novel_id, path.display());
                Ok(path)
            }
            None => Err(NovelError::NovelNotFound(novel_id.to_string())),
        }
    }

    pub async fn metadata(&self, novel_path: &Path) -> Result<NovelMeta> {
        read_json(&novel_path.join(META_FILE)).await
    }

    /// Every novel with readable metadata. Broken novels are logged and skipped.
    pub async fn list_novels(&self) -> Result<Vec<Novel>> {
        let mut novels = Vec::new();

        for site in self.sites().await? {
            let website = file_name(&site);
            for novel_id in list_dirs(&site).await? {
                let novel_path = site.join(&novel_id);
                match self.metadata(&novel_path).await {
                    Ok(meta) => novels.push(Novel {
                        cover_url: format!("/covers/{}/{}/cover.jpg", website, novel_id),
                        id: novel_id,
                        website: website.clone(),
                        title: meta.novel.title,
                        author: meta.novel.author,
                        extra: meta.novel.extra,
                    }),
                    Err(e) => warn!("Error reading metadata for {}: {}", novel_id, e),
                }
            }
        }

        Ok(novels)
    }

    async fn sites(&self) -> Result<Vec<PathBuf>> {
        let sites = list_dirs(&self.root).await?;
        Ok(sites.into_iter().map(|site| self.root.join(site)).collect())
    }
}

/// Names of the visible subdirectories of `dir`, sorted for a deterministic scan order.
pub(crate) async fn list_dirs(dir: &Path) -> Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_hidden(&name) {
            continue;
        }
        if entry.file_type().await?.is_dir() {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
