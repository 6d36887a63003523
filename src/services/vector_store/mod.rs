//! Vector store abstraction layer.
//!
//! The indexing core talks to [`VectorStore`] only; Qdrant, PostgreSQL/pgvector
//! and an in-process store are selected from configuration.

mod memory;
mod pgvector;
mod qdrant;

pub use memory::{MemoryStore, StoreOp};
pub use pgvector::PgVectorBackend;
pub use qdrant::QdrantBackend;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::VectorStoreError;
use crate::models::{SearchFilter, SearchHit, StorageRecord, VectorDriver, VectorStoreConfig};

/// Collection/table information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionInfo {
    pub points_count: u64,
    /// Vector size the collection was created with, when the backend exposes it.
    pub embedding_dim: Option<u64>,
}

/// What `ensure_schema` did to make the collection match the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    Created,
    Unchanged,
    Recreated { previous_dim: Option<u64> },
}

/// Per-record result of a batch upsert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// First rejection reason, if any record was rejected.
    pub first_error: Option<String>,
}

impl UpsertSummary {
    pub fn all_succeeded(count: usize) -> Self {
        Self {
            succeeded: count,
            ..Default::default()
        }
    }

    pub(crate) fn reject(&mut self, reason: impl Into<String>) {
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(reason.into());
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn health_check(&self) -> Result<bool, VectorStoreError>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError>;

    /// Make sure the collection exists with vectors of `embedding_dim`.
    ///
    /// An existing collection with a different dimension is dropped and
    /// recreated, whatever `recreate` says; `recreate` forces the same even
    /// when the dimension matches.
    async fn ensure_schema(
        &self,
        embedding_dim: u64,
        recreate: bool,
    ) -> Result<SchemaAction, VectorStoreError>;

    /// Insert or overwrite records by id.
    async fn upsert_batch(
        &self,
        records: Vec<StorageRecord>,
    ) -> Result<UpsertSummary, VectorStoreError>;

    /// Passages whose content contains `query`.
    async fn search_text(
        &self,
        query: &str,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Nearest passages by cosine similarity.
    async fn search_vector(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError>;

    /// Remove every record of one source file.
    async fn delete_by_path(&self, source_path: &str) -> Result<(), VectorStoreError>;

    fn collection(&self) -> &str;
}

/// Schema decision shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SchemaPlan {
    Create,
    Keep,
    Recreate { previous_dim: Option<u64> },
}

pub(crate) fn plan_schema(
    existing: Option<CollectionInfo>,
    embedding_dim: u64,
    recreate: bool,
) -> SchemaPlan {
    match existing {
        None => SchemaPlan::Create,
        Some(info) => {
            let mismatch = info.embedding_dim.is_some_and(|dim| dim != embedding_dim);
            if mismatch || recreate {
                SchemaPlan::Recreate {
                    previous_dim: info.embedding_dim,
                }
            } else {
                SchemaPlan::Keep
            }
        }
    }
}

/// Create a vector store backend based on configuration.
pub async fn create_backend(
    config: &VectorStoreConfig,
) -> Result<Arc<dyn VectorStore>, VectorStoreError> {
    match config.driver {
        VectorDriver::Qdrant => Ok(Arc::new(QdrantBackend::new(config)?)),
        VectorDriver::PostgreSQL => Ok(Arc::new(PgVectorBackend::new(config).await?)),
        VectorDriver::Memory => Ok(Arc::new(MemoryStore::new(&config.collection))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(dim: Option<u64>) -> Option<CollectionInfo> {
        Some(CollectionInfo {
            points_count: 10,
            embedding_dim: dim,
        })
    }

    #[test]
    fn test_plan_schema() {
        assert_eq!(plan_schema(None, 384, false), SchemaPlan::Create);
        assert_eq!(plan_schema(None, 384, true), SchemaPlan::Create);
        assert_eq!(plan_schema(info(Some(384)), 384, false), SchemaPlan::Keep);
        assert_eq!(
            plan_schema(info(Some(768)), 384, false),
            SchemaPlan::Recreate {
                previous_dim: Some(768)
            }
        );
        assert_eq!(
            plan_schema(info(Some(384)), 384, true),
            SchemaPlan::Recreate {
                previous_dim: Some(384)
            }
        );
        assert_eq!(plan_schema(info(None), 384, false), SchemaPlan::Keep);
    }

    #[test]
    fn test_upsert_summary_keeps_first_error() {
        let mut summary = UpsertSummary::all_succeeded(2);
        summary.reject("first");
        summary.reject("second");
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.first_error.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_create_memory_backend() {
        let config = VectorStoreConfig {
            driver: VectorDriver::Memory,
            ..Default::default()
        };
        let store = create_backend(&config).await.unwrap();
        assert_eq!(store.collection(), config.collection);
        assert!(store.collection_info().await.unwrap().is_none());
    }
}
