//! Directory indexing jobs.
//!
//! A job is started through a [`JobRegistry`], which hands out at most one
//! [`JobHandle`] per collection. The handle carries the cancellation token
//! and releases the collection when dropped.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::error::JobError;
use crate::models::{
    CompletedPayload, Document, IndexingConfig, IndexingEvent, JobCounters, JobRequest,
    PacingConfig, ProgressPayload, SkipReason,
};
use crate::parsers::ParserRegistry;
use crate::services::embedding::Embedder;
use crate::services::notifier::Notifier;
use crate::services::pipeline::index_file;
use crate::services::vector_store::{SchemaAction, VectorStore};
use crate::utils::{normalized_extension, resident_memory_mb};

/// Everything a job needs besides its request.
#[derive(Clone)]
pub struct JobContext {
    pub embedder: Arc<dyn Embedder>,
    pub store: Arc<dyn VectorStore>,
    pub notifier: Arc<dyn Notifier>,
    pub parsers: Arc<ParserRegistry>,
    pub indexing: IndexingConfig,
    pub pacing: PacingConfig,
}

/// Cooperative cancellation flag, checked before each file.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks which collections have a job in flight.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `collection` for a new job.
    pub fn acquire(&self, collection: &str) -> Result<JobHandle, JobError> {
        let mut active = lock_active(&self.active);
        if !active.insert(collection.to_string()) {
            return Err(JobError::AlreadyRunning(collection.to_string()));
        }
        Ok(JobHandle {
            collection: collection.to_string(),
            cancel: CancelToken::default(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_running(&self, collection: &str) -> bool {
        lock_active(&self.active).contains(collection)
    }
}

/// Lock the active set, recovering it from a poisoned lock.
fn lock_active(active: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive claim on a collection for the duration of one job.
#[derive(Debug)]
pub struct JobHandle {
    collection: String,
    cancel: CancelToken,
    active: Arc<Mutex<HashSet<String>>>,
}

impl JobHandle {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        lock_active(&self.active).remove(&self.collection);
    }
}

/// Index every supported file under `request.root`.
///
/// Never fails: job-level errors are reported as one `indexing_error`, and
/// `indexing_completed` is emitted exactly once in every case, including
/// cancellation.
pub async fn run_directory_job(
    handle: &JobHandle,
    request: JobRequest,
    ctx: &JobContext,
) -> JobCounters {
    let mut counters = JobCounters::default();

    if let Err(e) = run(handle, &request, ctx, &mut counters).await {
        error!(collection = handle.collection(), "indexing job failed: {e}");
        ctx.notifier.notify(IndexingEvent::job_error(e.to_string())).await;
    }

    info!(
        total_files = counters.total_files,
        indexed_files = counters.indexed_files,
        chunks = counters.indexed_chunks,
        skipped = counters.skipped_files,
        errors = counters.error_files,
        "indexing finished"
    );
    ctx.notifier
        .notify(IndexingEvent::IndexingCompleted(CompletedPayload {
            total_files: counters.total_files,
            total_chunks: counters.indexed_chunks,
            skipped_files: counters.skipped_files,
            error_files: counters.error_files,
        }))
        .await;

    counters
}

async fn run(
    handle: &JobHandle,
    request: &JobRequest,
    ctx: &JobContext,
    counters: &mut JobCounters,
) -> Result<(), JobError> {
    let dimension = ctx.embedder.dimension() as u64;
    let action = ctx
        .store
        .ensure_schema(dimension, request.recreate_collection)
        .await
        .map_err(JobError::SchemaSetup)?;
    if let SchemaAction::Recreated { previous_dim } = action {
        let previous = previous_dim.map_or_else(|| "unknown".to_string(), |d| d.to_string());
        ctx.notifier
            .notify(IndexingEvent::status(
                "collection_recreated",
                format!(
                    "collection '{}' recreated (dimension {previous} -> {dimension})",
                    ctx.store.collection()
                ),
            ))
            .await;
    }

    let files = collect_files(request, ctx)?;

    let limit = ctx.indexing.max_file_size;
    let mut admitted = Vec::with_capacity(files.len());
    for (path, size) in files {
        if size > limit {
            counters.skipped_files += 1;
            ctx.notifier
                .notify(IndexingEvent::warning(
                    path.to_string_lossy(),
                    SkipReason::TooLarge { size, limit }.to_string(),
                ))
                .await;
        } else {
            admitted.push(Document::new(path, size));
        }
    }

    counters.total_files = admitted.len();
    info!(
        root = %request.root.display(),
        total_files = counters.total_files,
        skipped_files = counters.skipped_files,
        "indexing started"
    );
    ctx.notifier
        .notify(IndexingEvent::started(
            counters.total_files,
            counters.skipped_files,
        ))
        .await;

    let total = admitted.len();
    let batch_size = ctx.indexing.file_batch_size.max(1);
    let mut current = 0;
    let mut remaining = admitted.into_iter().peekable();

    while remaining.peek().is_some() {
        if current > 0 {
            pause(ctx.pacing.batch_pause()).await;
        }
        ctx.embedder.release_resources();

        for document in remaining.by_ref().take(batch_size) {
            if handle.is_cancelled() {
                warn!(processed = current, total, "indexing cancelled");
                ctx.notifier
                    .notify(IndexingEvent::status(
                        "cancelled",
                        format!("indexing cancelled after {current} of {total} files"),
                    ))
                    .await;
                return Ok(());
            }

            current += 1;
            let path = document.source_path();
            let outcome = index_file(ctx, request, document).await;
            counters.record(&outcome);

            ctx.notifier
                .notify(IndexingEvent::IndexingProgress(
                    ProgressPayload::new(current, total, path, outcome.chunks())
                        .with_memory_usage(resident_memory_mb()),
                ))
                .await;

            ctx.embedder.release_resources();
            pause(ctx.pacing.file_pause()).await;
        }
    }

    Ok(())
}

/// Supported files under the root with their sizes, smallest first.
fn collect_files(request: &JobRequest, ctx: &JobContext) -> Result<Vec<(PathBuf, u64)>, JobError> {
    if !request.root.is_dir() {
        return Err(JobError::InvalidRoot(request.root.clone()));
    }

    let excludes = ctx
        .indexing
        .exclude_patterns
        .iter()
        .map(|pattern| {
            glob::Pattern::new(pattern).map_err(|e| JobError::InvalidPattern {
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut walker = WalkDir::new(&request.root).follow_links(false);
    if !request.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let supported = normalized_extension(path).is_some_and(|ext| ctx.parsers.supports(&ext));
        if !supported {
            continue;
        }

        let path_str = path.to_string_lossy();
        if excludes.iter().any(|p| p.matches(&path_str)) {
            debug!(file = %path_str, "excluded");
            continue;
        }

        match entry.metadata() {
            Ok(metadata) => files.push((path.to_path_buf(), metadata.len())),
            Err(e) => warn!(file = %path_str, "skipping file without metadata: {e}"),
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    Ok(files)
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IndexingConfig, PassageChunk, StorageRecord};
    use crate::services::testing::{FakeEmbedder, TestHarness, create_test_dir_with_files};
    use crate::services::vector_store::{MemoryStore, StoreOp};

    fn request(root: &std::path::Path) -> JobRequest {
        JobRequest {
            chunk_size: 128,
            chunk_overlap: 32,
            ..JobRequest::new(root)
        }
    }

    #[test]
    fn test_registry_rejects_second_job() {
        let registry = JobRegistry::new();
        let handle = registry.acquire("docs").unwrap();
        assert!(registry.is_running("docs"));
        assert!(matches!(
            registry.acquire("docs"),
            Err(JobError::AlreadyRunning(_))
        ));
        assert!(registry.acquire("other").is_ok());

        drop(handle);
        assert!(!registry.is_running("docs"));
        assert!(registry.acquire("docs").is_ok());
    }

    #[test]
    fn test_registry_survives_poisoned_lock() {
        let registry = JobRegistry::new();
        let handle = registry.acquire("docs").unwrap();

        let active = Arc::clone(&registry.active);
        let poisoner = std::thread::spawn(move || {
            let _guard = active.lock().unwrap();
            panic!("poison the registry lock");
        });
        assert!(poisoner.join().is_err());
        assert!(registry.active.is_poisoned());

        assert!(registry.is_running("docs"));
        assert!(matches!(
            registry.acquire("docs"),
            Err(JobError::AlreadyRunning(_))
        ));
        assert!(registry.acquire("other").is_ok());

        drop(handle);
        assert!(!registry.is_running("docs"));
        assert!(registry.acquire("docs").is_ok());
    }

    #[tokio::test]
    async fn test_single_file_job() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(70);
        let dir = create_test_dir_with_files(&[("notes.txt", text.as_str())]);

        let handle = harness.registry.acquire("docs").unwrap();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        let events = harness.notifier.events();
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec![
                "indexing_started",
                "indexing_status",
                "indexing_progress",
                "indexing_completed"
            ]
        );

        let IndexingEvent::IndexingStarted(started) = &events[0] else {
            panic!("expected started event");
        };
        assert_eq!((started.total_files, started.skipped_files), (1, 0));

        let IndexingEvent::IndexingProgress(progress) = &events[2] else {
            panic!("expected progress event");
        };
        assert!(progress.chunks_indexed > 0);
        assert_eq!(progress.percentage, 100.0);

        let IndexingEvent::IndexingCompleted(done) = &events[3] else {
            panic!("expected completed event");
        };
        assert_eq!(done.total_files, 1);
        assert_eq!(done.total_chunks, progress.chunks_indexed);
        assert_eq!(done.skipped_files, 0);
        assert_eq!(done.error_files, 0);
        assert_eq!(counters.indexed_files, 1);
        assert_eq!(counters.indexed_chunks, harness.store.records().len());
    }

    #[tokio::test]
    async fn test_oversize_file_is_filtered_before_start() {
        let indexing = IndexingConfig {
            max_file_size: 16,
            ..IndexingConfig::default()
        };
        let harness = TestHarness::with_indexing(FakeEmbedder::new(4), indexing).await;
        let dir = create_test_dir_with_files(&[("huge.md", "a".repeat(64).as_str())]);
        let huge = dir.path().join("huge.md").to_string_lossy().to_string();

        let handle = harness.registry.acquire("docs").unwrap();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        let events = harness.notifier.events();
        let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["indexing_warning", "indexing_started", "indexing_completed"]
        );
        assert!(matches!(
            &events[0],
            IndexingEvent::IndexingWarning(w) if w.file_path == huge
        ));
        assert!(matches!(
            &events[1],
            IndexingEvent::IndexingStarted(s) if s.total_files == 0 && s.skipped_files == 1
        ));
        assert!(matches!(
            &events[2],
            IndexingEvent::IndexingCompleted(c)
                if c.total_files == 0 && c.total_chunks == 0 && c.skipped_files == 1 && c.error_files == 0
        ));
        assert_eq!(counters.skipped_files, 1);
    }

    #[tokio::test]
    async fn test_parse_failure_does_not_stop_job() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = create_test_dir_with_files(&[
            ("a.bad", "this parser always fails"),
            ("b.txt", "this one is fine and a little longer"),
        ]);
        let bad = dir.path().join("a.bad").to_string_lossy().to_string();

        let handle = harness.registry.acquire("docs").unwrap();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        let errors = harness.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0.as_deref(), Some(bad.as_str()));
        assert_eq!(counters.error_files, 1);
        assert_eq!(counters.indexed_files, 1);

        let Some(IndexingEvent::IndexingCompleted(done)) = harness.notifier.events().pop() else {
            panic!("expected completed event last");
        };
        assert_eq!(done.error_files, 1);
        assert_eq!(done.total_files, 2);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_recreates_before_upsert() {
        let old = StorageRecord::from_chunk(
            PassageChunk {
                source_path: "/old.md".to_string(),
                sequence_index: 0,
                text: "old".to_string(),
            },
            vec![0.5; 8],
            "md",
            1,
            "2026-01-01T00:00:00+00:00",
        );
        let store = Arc::new(MemoryStore::with_existing("docs", 8, vec![old]));
        let harness = TestHarness::from_store(
            FakeEmbedder::new(4),
            Arc::clone(&store),
            IndexingConfig::default(),
        );
        let dir = create_test_dir_with_files(&[("a.txt", "fresh content")]);

        let handle = harness.registry.acquire("docs").unwrap();
        let mut req = request(dir.path());
        req.recreate_collection = false;
        run_directory_job(&handle, req, &harness.ctx).await;

        let ops = store.operations();
        assert_eq!(
            ops.first(),
            Some(&StoreOp::Schema(SchemaAction::Recreated {
                previous_dim: Some(8)
            }))
        );
        assert!(matches!(ops.get(1), Some(StoreOp::Upsert { failed: 0, .. })));
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].vector.len(), 4);
        assert!(harness.notifier.names().contains(&"indexing_status"));
    }

    #[tokio::test]
    async fn test_schema_failure_is_job_level() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        harness.store.set_unavailable(true);
        let dir = create_test_dir_with_files(&[("a.txt", "content")]);

        let handle = harness.registry.acquire("docs").unwrap();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        assert_eq!(
            harness.notifier.names(),
            vec!["indexing_error", "indexing_completed"]
        );
        let errors = harness.notifier.errors();
        assert!(errors[0].0.is_none());
        assert!(errors[0].1.contains("schema setup failed"));
        assert_eq!(counters, JobCounters::default());
    }

    #[tokio::test]
    async fn test_missing_root_is_job_level() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let handle = harness.registry.acquire("docs").unwrap();
        run_directory_job(
            &handle,
            request(std::path::Path::new("/definitely/not/here")),
            &harness.ctx,
        )
        .await;

        assert_eq!(
            harness.notifier.names(),
            vec!["indexing_error", "indexing_completed"]
        );
    }

    #[tokio::test]
    async fn test_files_processed_smallest_first_with_excludes() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = create_test_dir_with_files(&[
            ("large.txt", "large file ".repeat(20).as_str()),
            ("small.md", "tiny"),
            ("nested/medium.txt", "a medium sized file"),
            ("node_modules/dep.md", "excluded"),
            ("script.py", "print('unsupported')"),
        ]);

        let handle = harness.registry.acquire("docs").unwrap();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        let order: Vec<String> = harness
            .notifier
            .events()
            .into_iter()
            .filter_map(|e| match e {
                IndexingEvent::IndexingProgress(p) => Some(p.file_path),
                _ => None,
            })
            .collect();
        assert_eq!(order.len(), 3);
        assert!(order[0].ends_with("small.md"));
        assert!(order[1].ends_with("medium.txt"));
        assert!(order[2].ends_with("large.txt"));
        assert_eq!(counters.total_files, 3);
    }

    #[tokio::test]
    async fn test_non_recursive_job() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = create_test_dir_with_files(&[("top.txt", "top level"), ("sub/deep.txt", "deep")]);

        let handle = harness.registry.acquire("docs").unwrap();
        let mut req = request(dir.path());
        req.recursive = false;
        let counters = run_directory_job(&handle, req, &harness.ctx).await;
        assert_eq!(counters.total_files, 1);
    }

    #[tokio::test]
    async fn test_reindex_overwrites_records() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = create_test_dir_with_files(&[("a.txt", "repeatable content here. ".repeat(20).as_str())]);

        let handle = harness.registry.acquire("docs").unwrap();
        run_directory_job(&handle, request(dir.path()), &harness.ctx).await;
        let mut first: Vec<String> = harness.store.records().into_iter().map(|r| r.id).collect();
        run_directory_job(&handle, request(dir.path()), &harness.ctx).await;
        let mut second: Vec<String> = harness.store.records().into_iter().map(|r| r.id).collect();

        first.sort();
        second.sort();
        assert!(first.len() > 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_cancelled_job_still_completes() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = create_test_dir_with_files(&[("a.txt", "one"), ("b.txt", "two")]);

        let handle = harness.registry.acquire("docs").unwrap();
        handle.cancel_token().cancel();
        let counters = run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        assert_eq!(
            harness.notifier.names(),
            vec!["indexing_started", "indexing_status", "indexing_completed"]
        );
        assert_eq!(counters.indexed_files, 0);
        assert_eq!(counters.total_files, 2);
    }

    #[tokio::test]
    async fn test_release_checkpoints_per_batch_and_file() {
        let indexing = IndexingConfig {
            file_batch_size: 2,
            ..IndexingConfig::default()
        };
        let harness = TestHarness::with_indexing(FakeEmbedder::new(4), indexing).await;
        let dir = create_test_dir_with_files(&[
            ("a.txt", "one"),
            ("b.txt", "two"),
            ("c.txt", "three"),
        ]);

        let handle = harness.registry.acquire("docs").unwrap();
        run_directory_job(&handle, request(dir.path()), &harness.ctx).await;

        // 2 batch checkpoints, 3 per-file checkpoints, 3 per batcher call
        // (before, after and at the end of a single embedding batch)
        assert_eq!(harness.embedder.releases(), 2 + 3 + 3 * 3);
    }
}
