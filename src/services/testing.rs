//! Test doubles shared by the service tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::{EmbeddingError, ParseError};
use crate::models::{IndexingConfig, IndexingEvent, PacingConfig};
use crate::parsers::{Parser, ParserRegistry};
use crate::services::embedding::Embedder;
use crate::services::job::{JobContext, JobRegistry};
use crate::services::notifier::Notifier;
use crate::services::vector_store::{MemoryStore, VectorStore};

/// Deterministic embedder that records how it was called.
#[derive(Debug, Default)]
pub struct FakeEmbedder {
    dimension: usize,
    output_dimension: Option<usize>,
    failing_batch: Option<usize>,
    batches: Mutex<Vec<usize>>,
    releases: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Fail the `index`-th call to `embed` (0-based).
    pub fn failing_batch(mut self, index: usize) -> Self {
        self.failing_batch = Some(index);
        self
    }

    /// Produce vectors of a different length than `dimension()` reports.
    pub fn with_output_dimension(mut self, dimension: usize) -> Self {
        self.output_dimension = Some(dimension);
        self
    }

    /// The vector produced for `text`; never all zeros.
    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let seed: usize = text.bytes().map(usize::from).sum();
        (0..dimension)
            .map(|i| ((seed + i) % 7) as f32 + 1.0)
            .collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let call = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(texts.len());
            batches.len() - 1
        };
        if self.failing_batch == Some(call) {
            return Err(EmbeddingError::ServerError("injected failure".to_string()));
        }
        let dimension = self.output_dimension.unwrap_or(self.dimension);
        Ok(texts
            .iter()
            .map(|t| Self::vector_for(t, dimension))
            .collect())
    }

    fn release_resources(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        format!("fake ({} dims)", self.dimension)
    }
}

/// Parser for `.bad` files that always fails.
pub struct FailingParser;

impl Parser for FailingParser {
    fn name(&self) -> &str {
        "failing"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["bad"]
    }

    fn parse(&self, _content: &str) -> Result<String, ParseError> {
        Err(ParseError::Malformed {
            format: "bad",
            message: "unexpected token".to_string(),
        })
    }
}

/// Keeps every event it receives.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<IndexingEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<IndexingEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                IndexingEvent::IndexingWarning(w) => Some(w.warning),
                _ => None,
            })
            .collect()
    }

    /// `(file_path, error)` of every error event.
    pub fn errors(&self) -> Vec<(Option<String>, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                IndexingEvent::IndexingError(p) => Some((p.file_path, p.error)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: IndexingEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A job context over the in-memory store with pacing disabled.
pub struct TestHarness {
    pub ctx: JobContext,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub embedder: Arc<FakeEmbedder>,
    pub registry: JobRegistry,
}

impl TestHarness {
    pub async fn new(embedder: FakeEmbedder) -> Self {
        Self::with_indexing(embedder, IndexingConfig::default()).await
    }

    /// Harness whose collection already exists with the embedder's dimension.
    pub async fn with_indexing(embedder: FakeEmbedder, indexing: IndexingConfig) -> Self {
        let store = Arc::new(MemoryStore::new("docs"));
        store
            .ensure_schema(embedder.dimension() as u64, false)
            .await
            .unwrap();
        Self::from_store(embedder, store, indexing)
    }

    pub fn from_store(
        embedder: FakeEmbedder,
        store: Arc<MemoryStore>,
        indexing: IndexingConfig,
    ) -> Self {
        let embedder = Arc::new(embedder);
        let notifier = Arc::new(RecordingNotifier::default());

        let mut parsers = ParserRegistry::with_defaults();
        parsers.register(Arc::new(FailingParser));

        let ctx = JobContext {
            embedder: embedder.clone(),
            store: store.clone(),
            notifier: notifier.clone(),
            parsers: Arc::new(parsers),
            indexing,
            pacing: PacingConfig::none(),
        };

        Self {
            ctx,
            store,
            notifier,
            embedder,
            registry: JobRegistry::new(),
        }
    }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

/// Temporary directory populated with `(relative path, content)` pairs.
pub fn create_test_dir_with_files(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (name, content) in files {
        write_file(dir.path(), name, content);
    }
    dir
}
