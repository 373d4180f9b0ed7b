//! Background AI generation.
//!
//! Reads, regenerations and bulk requests push jobs onto one bounded queue.
//! A single worker drains it, so chapters are generated strictly one after
//! another and the AI provider never sees more than one request from here.
//! When the queue is full, prefetch jobs are dropped and bulk submissions
//! are refused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::{NovelError, Result};
use crate::models::{BulkReport, ChapterKey, ChapterRef, JobStatus};
use crate::services::index::list_chapters;
use crate::services::library::Library;
use crate::services::rewrite::{RewriteCache, RewriteOutcome};
use crate::services::settings::SettingsStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadJob {
    Chapter(ChapterKey),
    NextAfter(ChapterKey),
    Bulk {
        id: Uuid,
        novel_id: String,
        start: Option<String>,
        end: Option<String>,
    },
}

#[derive(Clone)]
pub struct PreloadQueue {
    sender: Sender<PreloadJob>,
    jobs: Arc<Mutex<HashMap<Uuid, JobStatus>>>,
}

impl PreloadQueue {
    pub fn channel(capacity: usize) -> (Self, Receiver<PreloadJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            jobs: Arc::new(Mutex::new(HashMap::new())),
        };
        (queue, receiver)
    }

    /// Never waits. Returns `false` when the job was dropped.
    pub fn enqueue(&self, job: PreloadJob) -> bool {
        match self.sender.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!("Preload queue is full, dropping {:?}", job);
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!("Preload worker is gone, dropping {:?}", job);
                false
            }
        }
    }

    pub fn submit_bulk(&self, novel_id: &str, start: Option<String>, end: Option<String>) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.set_status(id, JobStatus::Queued);

        let job = PreloadJob::Bulk {
            id,
            novel_id: novel_id.to_string(),
            start,
            end,
        };
        if !self.enqueue(job) {
            self.lock_jobs().remove(&id);
            return Err(NovelError::QueueFull);
        }
        Ok(id)
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.lock_jobs().get(id).cloned()
    }

    fn set_status(&self, id: Uuid, status: JobStatus) {
        self.lock_jobs().insert(id, status);
    }

    fn lock_jobs(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JobStatus>> {
        // A panic while holding the lock leaves only a status map behind; keep using it.
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// `start`/`end` are matched against chapter ids in sorted order. An unknown
/// start means "from the beginning", an unknown end means "to the last chapter".
pub fn chapter_range<'a>(chapters: &'a [ChapterRef], start: Option<&str>, end: Option<&str>) -> &'a [ChapterRef] {
    let position = |id: &str| chapters.iter().position(|ch| ch.chapter == id);

    let start_index = start.and_then(position).unwrap_or(0);
    let end_index = end
        .and_then(position)
        .map(|i| i + 1)
        .unwrap_or(chapters.len());

    if start_index >= end_index {
        &[]
    } else {
        &chapters[start_index..end_index]
    }
}

pub struct BulkGenerator {
    library: Arc<Library>,
    settings: Arc<SettingsStore>,
    cache: Arc<RewriteCache>,
}

impl BulkGenerator {
    pub fn new(library: Arc<Library>, settings: Arc<SettingsStore>, cache: Arc<RewriteCache>) -> Self {
        Self {
            library,
            settings,
            cache,
        }
    }

    /// Walks the range in order. A failing chapter is counted and skipped.
    #[instrument(skip(self))]
    pub async fn generate_range(&self, novel_id: &str, start: Option<&str>, end: Option<&str>) -> Result<BulkReport> {
        let list = list_chapters(&self.library, novel_id).await?;
        let selected = chapter_range(&list.chapters, start, end);
        let settings = self.settings.load().await;

        info!("Bulk generating AI content for {} chapters of {}", selected.len(), novel_id);
        let mut report = BulkReport {
            total: selected.len(),
            ..Default::default()
        };

        for chapter in selected {
            let key = ChapterKey::new(novel_id, &chapter.volume, &chapter.chapter);
            match self.cache.resolve_or_generate(&key, &settings).await {
                Ok(RewriteOutcome::Cached(_)) => report.cached += 1,
                Ok(RewriteOutcome::Generated(_)) => {
                    info!("Generated AI content for {}", key);
                    report.generated += 1;
                }
                Ok(RewriteOutcome::Failed(reason)) => {
                    warn!("AI generation for {} rejected: {}", key, reason);
                    report.failed += 1;
                }
                Err(e) => {
                    warn!("Error generating AI content for {}: {}", key, e);
                    report.failed += 1;
                }
            }
        }

        info!(?report, "Bulk generation completed");
        Ok(report)
    }

    pub async fn preload_chapter(&self, key: &ChapterKey) -> Result<RewriteOutcome> {
        let settings = self.settings.load().await;
        self.cache.resolve_or_generate(key, &settings).await
    }

    /// Generates the chapter after `key`, if there is one.
    pub async fn preload_next(&self, key: &ChapterKey) -> Result<Option<RewriteOutcome>> {
        let list = list_chapters(&self.library, &key.novel_id).await?;
        let Some(next) = list.neighbors(&key.volume, &key.chapter).next else {
            return Ok(None);
        };

        let next_key = ChapterKey::new(&key.novel_id, &next.volume, &next.chapter);
        self.preload_chapter(&next_key).await.map(Some)
    }
}

pub struct PreloadWorker {
    generator: BulkGenerator,
    queue: PreloadQueue,
}

impl PreloadWorker {
    pub fn new(generator: BulkGenerator, queue: PreloadQueue) -> Self {
        Self { generator, queue }
    }

    pub fn spawn(self, jobs: Receiver<PreloadJob>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(jobs))
    }

    pub async fn run(self, mut jobs: Receiver<PreloadJob>) {
        while let Some(job) = jobs.recv().await {
            self.handle(job).await;
        }
        info!("Preload worker stopped");
    }

    async fn handle(&self, job: PreloadJob) {
        match job {
            PreloadJob::Chapter(key) => {
                if let Err(e) = self.generator.preload_chapter(&key).await {
                    warn!("Error preloading {}: {}", key, e);
                }
            }
            PreloadJob::NextAfter(key) => {
                if let Err(e) = self.generator.preload_next(&key).await {
                    warn!("Error preloading chapter after {}: {}", key, e);
                }
            }
            PreloadJob::Bulk {
                id,
                novel_id,
                start,
                end,
            } => {
                self.queue.set_status(id, JobStatus::Running);
                let status = match self
                    .generator
                    .generate_range(&novel_id, start.as_deref(), end.as_deref())
                    .await
                {
                    Ok(report) => JobStatus::Completed { report },
                    Err(e) => JobStatus::Failed {
                        error: e.to_string(),
                    },
                };
                self.queue.set_status(id, status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm::testing::ScriptedRewriter;
    use crate::services::testing::LibraryFixture;
    use std::time::Duration;

    fn refs(ids: &[&str]) -> Vec<ChapterRef> {
        ids.iter()
            .map(|id| ChapterRef {
                volume: "Volume 1".to_string(),
                chapter: id.to_string(),
                path: format!("Volume 1/{}.json", id),
            })
            .collect()
    }

    fn ids(chapters: &[ChapterRef]) -> Vec<&str> {
        chapters.iter().map(|c| c.chapter.as_str()).collect()
    }

    #[test]
    fn range_bounds_are_inclusive_chapter_ids() {
        let chapters = refs(&["1", "2", "3", "4"]);

        assert_eq!(ids(chapter_range(&chapters, Some("2"), Some("3"))), vec!["2", "3"]);
        assert_eq!(ids(chapter_range(&chapters, None, None)), vec!["1", "2", "3", "4"]);
        assert_eq!(ids(chapter_range(&chapters, Some("3"), None)), vec!["3", "4"]);
        assert!(chapter_range(&chapters, Some("4"), Some("2")).is_empty());
    }

    #[test]
    fn unknown_start_falls_back_to_first_chapter() {
        let chapters = refs(&["1", "2", "3"]);
        assert_eq!(ids(chapter_range(&chapters, Some("99"), Some("2"))), vec!["1", "2"]);
        assert_eq!(ids(chapter_range(&chapters, Some("2"), Some("99"))), vec!["2", "3"]);
    }

    struct Setup {
        fixture: LibraryFixture,
        rewriter: Arc<ScriptedRewriter>,
        generator: BulkGenerator,
    }

    fn setup(rewriter: ScriptedRewriter) -> Setup {
        let fixture = LibraryFixture::new();
        fixture.novel("site", "foo", "Foo");
        for chapter in ["1", "2", "3", "4"] {
            fixture.chapter("site", "foo", "Volume 1", chapter, &format!("<p>Text of chapter {}.</p>", chapter));
        }

        let rewriter = Arc::new(rewriter);
        let library = Arc::new(fixture.library());
        let settings = Arc::new(fixture.settings(true));
        let cache = Arc::new(RewriteCache::new(library.clone(), rewriter.clone()));
        let generator = BulkGenerator::new(library, settings, cache);

        Setup {
            fixture,
            rewriter,
            generator,
        }
    }

    #[tokio::test]
    async fn bulk_continues_past_failures() {
        let s = setup(ScriptedRewriter::new(vec![
            Err("provider timeout"),
            Ok("I don't have enough information to answer."),
            Ok("The third chapter, rewritten well."),
        ]));
        s.fixture.write_ai_file(
            "site",
            "foo",
            "Volume 1",
            "4",
            &serde_json::json!({ "body": "<p>done</p>", "isAIGenerated": true }),
        );

        let report = s.generator.generate_range("foo", None, None).await.unwrap();

        assert_eq!(
            report,
            BulkReport {
                total: 4,
                generated: 1,
                cached: 1,
                failed: 2,
            }
        );
        assert_eq!(s.rewriter.calls(), 3);
        assert!(!s.fixture.ai_file("site", "foo", "Volume 1", "1").exists());
        assert!(!s.fixture.ai_file("site", "foo", "Volume 1", "2").exists());
        assert!(s.fixture.ai_file("site", "foo", "Volume 1", "3").exists());
    }

    #[tokio::test]
    async fn bulk_for_unknown_novel_fails_whole_job() {
        let s = setup(ScriptedRewriter::default());
        let result = s.generator.generate_range("missing", None, None).await;
        assert!(matches!(result, Err(NovelError::NovelNotFound(_))));
    }

    #[tokio::test]
    async fn preload_next_targets_following_chapter() {
        let s = setup(ScriptedRewriter::answering("The next chapter, rewritten."));

        let outcome = s
            .generator
            .preload_next(&ChapterKey::new("foo", "Volume 1", "2"))
            .await
            .unwrap();

        assert!(matches!(outcome, Some(RewriteOutcome::Generated(_))));
        assert!(s.fixture.ai_file("site", "foo", "Volume 1", "3").exists());

        let last = s
            .generator
            .preload_next(&ChapterKey::new("foo", "Volume 1", "4"))
            .await
            .unwrap();
        assert!(last.is_none());
        assert_eq!(s.rewriter.calls(), 1);
    }

    #[test]
    fn full_queue_refuses_bulk_jobs() {
        let (queue, _jobs) = PreloadQueue::channel(1);

        assert!(queue.enqueue(PreloadJob::Chapter(ChapterKey::new("foo", "Volume 1", "1"))));
        assert!(!queue.enqueue(PreloadJob::Chapter(ChapterKey::new("foo", "Volume 1", "2"))));
        assert!(matches!(
            queue.submit_bulk("foo", None, None),
            Err(NovelError::QueueFull)
        ));
    }

    #[tokio::test]
    async fn worker_reports_bulk_status() {
        let s = setup(ScriptedRewriter::new(vec![
            Ok("First text, rewritten."),
            Ok("Second text, rewritten."),
        ]));
        let (queue, jobs) = PreloadQueue::channel(4);
        let worker = PreloadWorker::new(s.generator, queue.clone()).spawn(jobs);

        let id = queue
            .submit_bulk("foo", Some("1".to_string()), Some("2".to_string()))
            .unwrap();

        let mut status = queue.status(&id);
        for _ in 0..200 {
            if matches!(status, Some(JobStatus::Completed { .. })) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = queue.status(&id);
        }

        assert_eq!(
            status,
            Some(JobStatus::Completed {
                report: BulkReport {
                    total: 2,
                    generated: 2,
                    cached: 0,
                    failed: 0,
                }
            })
        );
        worker.abort();
    }
}
