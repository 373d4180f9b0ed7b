use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// `meta.json` at the root of a novel directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovelMeta {
    pub novel: NovelInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NovelInfo {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Novel {
    pub id: String,
    pub website: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub cover_url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub volume: String,
    pub chapter: String,
    /// `<volume>/<chapter>.json`, relative to the novel's `json` directory.
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChapterList {
    pub title: String,
    pub chapters: Vec<ChapterRef>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Navigation {
    pub prev: Option<ChapterRef>,
    pub current: Option<ChapterRef>,
    pub next: Option<ChapterRef>,
}

/// One chapter file as stored on disk, either the original `<n>.json`
/// or the rewritten `<n>-ai.json`. Unknown fields are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredChapter {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    #[serde(
        default,
        rename = "isAIGenerated",
        skip_serializing_if = "Option::is_none"
    )]
    pub is_ai_generated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Scraped files sometimes carry `null` where a string is expected.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl StoredChapter {
    /// A rewrite is only usable with a body and an explicit generated flag.
    pub fn is_valid_rewrite(&self) -> bool {
        self.is_ai_generated == Some(true) && !self.body.trim().is_empty()
    }
}

/// One element of the whole-novel dump: the stored chapter plus its location.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterEntry {
    pub volume: String,
    pub chapter: String,
    #[serde(flatten)]
    pub data: StoredChapter,
}

/// What the reader hands back to the route layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterContent {
    pub title: String,
    pub body: String,
    pub novel_title: String,
    pub volume: String,
    pub chapter: String,
    #[serde(rename = "isAIGenerated", skip_serializing_if = "Option::is_none")]
    pub is_ai_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(rename = "noAIContent")]
    pub no_ai_content: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Glossary {
    pub terms: Vec<GlossaryTerm>,
    pub last_updated: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub total: usize,
    pub generated: usize,
    pub cached: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed { report: BulkReport },
    Failed { error: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
}

/// Addresses one chapter of one novel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChapterKey {
    pub novel_id: String,
    pub volume: String,
    pub chapter: String,
}

impl ChapterKey {
    pub fn new(novel_id: &str, volume: &str, chapter: &str) -> Self {
        Self {
            novel_id: novel_id.to_string(),
            volume: volume.to_string(),
            chapter: chapter.to_string(),
        }
    }
}

impl std::fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.novel_id, self.volume, self.chapter)
    }
}
