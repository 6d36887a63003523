//! Per-file indexing: read, parse, chunk, embed, store.
//!
//! [`index_file`] always returns a [`FileOutcome`] and reports it to the
//! job's notifier first; nothing that goes wrong with a single file escapes
//! as an error.

use tracing::debug;

use crate::error::IndexError;
use crate::models::{
    Document, FileOutcome, IndexingEvent, JobRequest, PassageChunk, SkipReason, StorageRecord,
};
use crate::services::batcher::{BatchOptions, EmbeddingBatcher};
use crate::services::chunker::TextChunker;
use crate::services::job::JobContext;
use crate::utils::{decode_text, has_visible_content, truncate_chars};

/// Run one file through the pipeline and report its terminal state.
pub async fn index_file(ctx: &JobContext, request: &JobRequest, document: Document) -> FileOutcome {
    let path = document.source_path();
    let outcome = match process(ctx, request, document, &path).await {
        Ok(outcome) => outcome,
        Err(e) => FileOutcome::Failed(e),
    };

    match &outcome {
        FileOutcome::Done { chunks, rejected } => {
            debug!(file = %path, chunks, rejected, "file indexed");
            ctx.notifier
                .notify(IndexingEvent::status(
                    "file_indexed",
                    format!("indexed {path} ({chunks} chunks)"),
                ))
                .await;
        }
        FileOutcome::Skipped(reason) => {
            debug!(file = %path, "skipped: {reason}");
            ctx.notifier
                .notify(IndexingEvent::warning(&path, reason.to_string()))
                .await;
        }
        FileOutcome::Failed(e) => {
            debug!(file = %path, "failed: {e}");
            ctx.notifier
                .notify(IndexingEvent::file_error(&path, e.to_string()))
                .await;
        }
    }

    outcome
}

async fn process(
    ctx: &JobContext,
    request: &JobRequest,
    mut document: Document,
    path: &str,
) -> Result<FileOutcome, IndexError> {
    let Some(parser) = ctx.parsers.get(&document.extension).cloned() else {
        return Ok(FileOutcome::Skipped(SkipReason::NoParser));
    };

    let limit = ctx.indexing.max_file_size;
    if document.raw_size > limit {
        return Ok(FileOutcome::Skipped(SkipReason::TooLarge {
            size: document.raw_size,
            limit,
        }));
    }

    document.load(limit)?;
    let raw = document.take_content().unwrap_or_default();
    let decoded = decode_text(raw).map_err(|reason| IndexError::DecodeError {
        path: document.path.clone(),
        reason,
    })?;
    if decoded.latin1_fallback {
        ctx.notifier
            .notify(IndexingEvent::warning(
                path,
                "file is not valid UTF-8, decoded as Latin-1",
            ))
            .await;
    }
    if !has_visible_content(&decoded.text) {
        return Ok(FileOutcome::Skipped(SkipReason::Empty));
    }

    let (content, truncated) = truncate_chars(decoded.text, ctx.indexing.max_content_length);
    if truncated {
        ctx.notifier
            .notify(IndexingEvent::warning(
                path,
                format!(
                    "content truncated to {} characters",
                    ctx.indexing.max_content_length
                ),
            ))
            .await;
    }

    let text = parser.parse(&content)?;
    drop(content);
    debug!(file = %path, parser = parser.name(), chars = text.chars().count(), "parsed");

    let chunk_size = request.chunk_size.min(ctx.indexing.effective_chunk_size);
    let overlap = request.chunk_overlap.min(ctx.indexing.effective_overlap);
    let report = TextChunker::from_config(&ctx.indexing).chunk_with_report(
        &text,
        chunk_size,
        overlap,
        ctx.indexing.max_chunks_per_file,
    );
    drop(text);

    for warning in &report.warnings {
        if warning.is_truncation() {
            ctx.notifier
                .notify(IndexingEvent::warning(path, warning.to_string()))
                .await;
        } else {
            debug!(file = %path, "chunker: {warning}");
        }
    }
    if report.chunks.is_empty() {
        return Ok(FileOutcome::Skipped(SkipReason::NoChunks));
    }

    let batcher = EmbeddingBatcher::new(
        ctx.embedder.as_ref(),
        BatchOptions::from_config(&ctx.indexing, &ctx.pacing),
    );
    let embedding = batcher
        .embed_all(&report.chunks, request.embedding_batch_size)
        .await?;
    for failure in &embedding.failures {
        ctx.notifier
            .notify(IndexingEvent::file_error(
                path,
                format!(
                    "embedding failed for chunks {}..{}, stored zero vectors: {}",
                    failure.start,
                    failure.start + failure.len,
                    failure.error
                ),
            ))
            .await;
    }

    let total_chunks = report.chunks.len();
    let indexed_at = chrono::Utc::now().to_rfc3339();
    let records: Vec<StorageRecord> = PassageChunk::sequence(path, report.chunks)
        .into_iter()
        .zip(embedding.vectors)
        .map(|(chunk, vector)| {
            StorageRecord::from_chunk(chunk, vector, &document.extension, total_chunks, &indexed_at)
        })
        .collect();

    let summary = ctx.store.upsert_batch(records).await?;
    if summary.succeeded == 0 {
        return Err(IndexError::AllRecordsRejected(summary.failed));
    }
    if summary.failed > 0 {
        ctx.notifier
            .notify(IndexingEvent::file_error(
                path,
                format!(
                    "{} of {} records rejected by the vector store: {}",
                    summary.failed,
                    total_chunks,
                    summary.first_error.as_deref().unwrap_or("unknown error")
                ),
            ))
            .await;
    }

    Ok(FileOutcome::Done {
        chunks: summary.succeeded,
        rejected: summary.failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexingConfig;
    use crate::services::testing::{FakeEmbedder, TestHarness, write_file};
    use crate::services::vector_store::{StoreOp, VectorStore};

    fn request() -> JobRequest {
        JobRequest::new("/unused")
    }

    fn document(path: &std::path::Path) -> Document {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Document::new(path, size)
    }

    #[tokio::test]
    async fn test_markdown_file_is_indexed() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "guide.md", "# Title\n\nSome **bold** text.");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Done { chunks: 1, rejected: 0 }));

        let records = harness.store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "Title Some bold text.");
        assert_eq!(records[0].file_type, "md");
        assert_eq!(records[0].file_name, "guide.md");
        assert_eq!(records[0].metadata.total_chunks, 1);

        let events = harness.notifier.names();
        assert_eq!(events, vec!["indexing_status"]);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_skipped() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "image.png", "not really");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::NoParser)));
        assert!(harness.store.records().is_empty());
    }

    #[tokio::test]
    async fn test_oversize_file_is_skipped_without_reading() {
        let indexing = IndexingConfig {
            max_file_size: 4,
            ..IndexingConfig::default()
        };
        let harness = TestHarness::with_indexing(FakeEmbedder::new(4), indexing).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "big.txt", "0123456789");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(
            outcome,
            FileOutcome::Skipped(SkipReason::TooLarge { size: 10, limit: 4 })
        ));
        let warnings = harness.notifier.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("10 bytes"));
    }

    #[tokio::test]
    async fn test_empty_file_is_skipped() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "blank.txt", "  \n\t\n");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::Empty)));
        assert_eq!(harness.notifier.names(), vec!["indexing_warning"]);
    }

    #[tokio::test]
    async fn test_markup_only_file_has_no_chunks() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "rule.md", "---\n\n<!-- nothing -->\n");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Skipped(SkipReason::NoChunks)));
    }

    #[tokio::test]
    async fn test_binary_file_fails_and_reports() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"abc\0def").unwrap();

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(
            outcome,
            FileOutcome::Failed(IndexError::DecodeError { .. })
        ));
        let errors = harness.notifier.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0.as_deref(), Some(path.to_string_lossy().as_ref()));
    }

    #[tokio::test]
    async fn test_latin1_file_is_indexed_with_warning() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("legacy.txt");
        std::fs::write(&path, b"caf\xe9 au lait").unwrap();

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Done { chunks: 1, .. }));
        assert_eq!(harness.store.records()[0].content, "café au lait");
        assert!(harness.notifier.warnings()[0].contains("Latin-1"));
    }

    #[tokio::test]
    async fn test_chunks_use_effective_limits() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let text = "word ".repeat(100);
        let path = write_file(dir.path(), "long.txt", &text);

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        let FileOutcome::Done { chunks, .. } = outcome else {
            panic!("expected Done, got {outcome:?}");
        };
        assert!(chunks > 1);

        let mut records = harness.store.records();
        records.sort_by_key(|r| r.sequence_index);
        let indices: Vec<usize> = records.iter().map(|r| r.sequence_index).collect();
        assert_eq!(indices, (0..chunks).collect::<Vec<_>>());
        assert!(records.iter().all(|r| r.content.chars().count() <= 128));
        assert!(records.iter().all(|r| r.metadata.total_chunks == chunks));
    }

    #[tokio::test]
    async fn test_content_truncation_warns() {
        let indexing = IndexingConfig {
            max_content_length: 20,
            ..IndexingConfig::default()
        };
        let harness = TestHarness::with_indexing(FakeEmbedder::new(4), indexing).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "notes.txt", &"x".repeat(50));

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Done { chunks: 1, .. }));
        assert_eq!(harness.store.records()[0].content.len(), 20);
        assert!(harness.notifier.warnings()[0].contains("truncated"));
    }

    #[tokio::test]
    async fn test_content_truncated_before_parsing() {
        let indexing = IndexingConfig {
            max_content_length: 20,
            ..IndexingConfig::default()
        };
        let harness = TestHarness::with_indexing(FakeEmbedder::new(4), indexing).await;
        let dir = tempfile::TempDir::new().unwrap();
        // The first 20 chars include the markup, so less text survives parsing
        let path = write_file(
            dir.path(),
            "notes.md",
            "**bold** words here and more trailing text",
        );

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Done { chunks: 1, .. }));
        assert_eq!(harness.store.records()[0].content, "bold words here");
        assert!(harness.notifier.warnings()[0].contains("truncated"));
    }

    #[tokio::test]
    async fn test_failed_batch_is_reported_but_file_is_done() {
        let harness = TestHarness::new(FakeEmbedder::new(4).failing_batch(0)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.txt", "hello world");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(outcome, FileOutcome::Done { chunks: 1, .. }));
        assert_eq!(harness.store.records()[0].vector, vec![0.0; 4]);
        assert_eq!(harness.notifier.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_dimension_embedder_fails_file() {
        let harness = TestHarness::new(FakeEmbedder::new(0)).await;
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.txt", "hello world");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(
            outcome,
            FileOutcome::Failed(IndexError::EmbeddingError(_))
        ));
    }

    #[tokio::test]
    async fn test_all_records_rejected_fails_file() {
        // Collection expects 3 dimensions, embedder produces 4
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        harness.store.ensure_schema(3, true).await.unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.txt", "hello world");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(
            outcome,
            FileOutcome::Failed(IndexError::AllRecordsRejected(1))
        ));
        assert!(matches!(
            harness.store.operations().last(),
            Some(StoreOp::Upsert { records: 1, failed: 1 })
        ));
    }

    #[tokio::test]
    async fn test_store_outage_fails_file() {
        let harness = TestHarness::new(FakeEmbedder::new(4)).await;
        harness.store.set_unavailable(true);
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_file(dir.path(), "a.txt", "hello world");

        let outcome = index_file(&harness.ctx, &request(), document(&path)).await;
        assert!(matches!(
            outcome,
            FileOutcome::Failed(IndexError::VectorStoreError(_))
        ));
        assert_eq!(harness.notifier.errors().len(), 1);
    }
}
