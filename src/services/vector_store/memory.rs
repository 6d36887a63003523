//! Process-local vector store.
//!
//! Used for dry runs (`driver = "memory"`) and as the store behind the
//! pipeline and job tests; it records every schema and write operation.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{
    CollectionInfo, SchemaAction, SchemaPlan, UpsertSummary, VectorStore, plan_schema,
};
use crate::error::VectorStoreError;
use crate::models::{SearchFilter, SearchHit, StorageRecord};

/// One call observed by the store, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Schema(SchemaAction),
    Upsert { records: usize, failed: usize },
    Delete(String),
}

#[derive(Debug, Default)]
struct State {
    /// `None` until the collection is created.
    dimension: Option<u64>,
    records: BTreeMap<String, StorageRecord>,
    ops: Vec<StoreOp>,
}

#[derive(Debug)]
pub struct MemoryStore {
    collection: String,
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            state: Mutex::new(State::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Start from an existing collection holding `records`.
    pub fn with_existing(collection: &str, dimension: u64, records: Vec<StorageRecord>) -> Self {
        let store = Self::new(collection);
        if let Ok(mut state) = store.state.lock() {
            state.dimension = Some(dimension);
            state.records = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        }
        store
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.state.lock().map(|s| s.ops.clone()).unwrap_or_default()
    }

    pub fn records(&self) -> Vec<StorageRecord> {
        self.state
            .lock()
            .map(|s| s.records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, VectorStoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(VectorStoreError::ConnectionError(
                "memory store marked unavailable".to_string(),
            ));
        }
        self.state
            .lock()
            .map_err(|_| VectorStoreError::CollectionError("state lock poisoned".to_string()))
    }

    fn info(state: &State) -> Option<CollectionInfo> {
        state.dimension.map(|dim| CollectionInfo {
            points_count: state.records.len() as u64,
            embedding_dim: Some(dim),
        })
    }
}

fn to_hit(record: &StorageRecord, score: f32) -> SearchHit {
    SearchHit {
        id: record.id.clone(),
        score,
        content: record.content.clone(),
        file_path: record.source_path.clone(),
        file_name: record.file_name.clone(),
        file_type: record.file_type.clone(),
        chunk_id: record.sequence_index,
        indexed_at: Some(record.metadata.indexed_at.clone()),
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.lock().map(|_| true)
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        Ok(Self::info(&*self.lock()?))
    }

    async fn ensure_schema(
        &self,
        embedding_dim: u64,
        recreate: bool,
    ) -> Result<SchemaAction, VectorStoreError> {
        let mut state = self.lock()?;
        let action = match plan_schema(Self::info(&state), embedding_dim, recreate) {
            SchemaPlan::Create => SchemaAction::Created,
            SchemaPlan::Keep => SchemaAction::Unchanged,
            SchemaPlan::Recreate { previous_dim } => {
                state.records.clear();
                SchemaAction::Recreated { previous_dim }
            }
        };
        state.dimension = Some(embedding_dim);
        state.ops.push(StoreOp::Schema(action));
        Ok(action)
    }

    async fn upsert_batch(
        &self,
        records: Vec<StorageRecord>,
    ) -> Result<UpsertSummary, VectorStoreError> {
        let mut state = self.lock()?;
        let dimension = state.dimension.ok_or_else(|| {
            VectorStoreError::CollectionError(format!(
                "collection '{}' does not exist",
                self.collection
            ))
        })?;

        let total = records.len();
        let mut summary = UpsertSummary::default();
        for record in records {
            if record.vector.len() as u64 != dimension {
                summary.reject(
                    VectorStoreError::DimensionMismatch {
                        expected: dimension,
                        actual: record.vector.len() as u64,
                    }
                    .to_string(),
                );
                continue;
            }
            state.records.insert(record.id.clone(), record);
            summary.succeeded += 1;
        }

        state.ops.push(StoreOp::Upsert {
            records: total,
            failed: summary.failed,
        });
        Ok(summary)
    }

    async fn search_text(
        &self,
        query: &str,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let state = self.lock()?;
        let needle = query.to_lowercase();
        Ok(state
            .records
            .values()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.source_path, &r.file_type)))
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .take(limit as usize)
            .map(|r| to_hit(r, 1.0))
            .collect())
    }

    async fn search_vector(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let state = self.lock()?;
        let mut hits: Vec<SearchHit> = state
            .records
            .values()
            .filter(|r| filter.is_none_or(|f| f.matches(&r.source_path, &r.file_type)))
            .map(|r| to_hit(r, cosine(&vector, &r.vector)))
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit as usize);
        Ok(hits)
    }

    async fn delete_by_path(&self, source_path: &str) -> Result<(), VectorStoreError> {
        let mut state = self.lock()?;
        state.records.retain(|_, r| r.source_path != source_path);
        state.ops.push(StoreOp::Delete(source_path.to_string()));
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PassageChunk;

    fn record(path: &str, idx: usize, text: &str, vector: Vec<f32>) -> StorageRecord {
        StorageRecord::from_chunk(
            PassageChunk {
                source_path: path.to_string(),
                sequence_index: idx,
                text: text.to_string(),
            },
            vector,
            "md",
            1,
            "2026-01-01T00:00:00+00:00",
        )
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let store = MemoryStore::new("docs");
        store.ensure_schema(2, false).await.unwrap();

        let summary = store
            .upsert_batch(vec![
                record("/a.md", 0, "ok", vec![1.0, 0.0]),
                record("/a.md", 1, "bad", vec![1.0, 0.0, 0.0]),
            ])
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(summary.first_error.unwrap().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = MemoryStore::new("docs");
        store.ensure_schema(2, false).await.unwrap();
        store
            .upsert_batch(vec![record("/a.md", 0, "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert_batch(vec![record("/a.md", 0, "new", vec![1.0, 0.0])])
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "new");
    }

    #[tokio::test]
    async fn test_dimension_change_recreates() {
        let store =
            MemoryStore::with_existing("docs", 3, vec![record("/a.md", 0, "x", vec![0.0; 3])]);
        let action = store.ensure_schema(2, false).await.unwrap();
        assert_eq!(
            action,
            SchemaAction::Recreated {
                previous_dim: Some(3)
            }
        );
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let store = MemoryStore::new("docs");
        store.ensure_schema(2, false).await.unwrap();
        store
            .upsert_batch(vec![
                record("/a.md", 0, "Rust ownership rules", vec![1.0, 0.0]),
                record("/b.md", 0, "Borrow checker", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = store.search_text("ownership", 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].file_path, "/a.md");

        let hits = store.search_vector(vec![0.1, 0.9], 1, None).await.unwrap();
        assert_eq!(hits[0].file_path, "/b.md");

        store.delete_by_path("/a.md").await.unwrap();
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_errors() {
        let store = MemoryStore::new("docs");
        store.set_unavailable(true);
        assert!(matches!(
            store.ensure_schema(2, false).await,
            Err(VectorStoreError::ConnectionError(_))
        ));
    }
}
