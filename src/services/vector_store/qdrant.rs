//! Qdrant vector store backend implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use qdrant_client::Qdrant;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfig;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointId, PointStruct, ScrollPointsBuilder,
    SearchPointsBuilder, Struct, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use tracing::{debug, info};

use super::{
    CollectionInfo, SchemaAction, SchemaPlan, UpsertSummary, VectorStore, plan_schema,
};
use crate::error::VectorStoreError;
use crate::models::{SearchFilter, SearchHit, StorageRecord, VectorStoreConfig};
use crate::utils::{RetryPolicy, with_retry};

/// Qdrant vector store backend.
pub struct QdrantBackend {
    client: Qdrant,
    collection: String,
    embedding_dim: AtomicU64,
    retry: RetryPolicy,
}

impl QdrantBackend {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let mut builder = Qdrant::from_url(&config.url);

        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }

        let client = builder
            .build()
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            collection: config.collection.clone(),
            embedding_dim: AtomicU64::new(0),
            retry: RetryPolicy::default(),
        })
    }

    fn build_filter(filter: Option<&SearchFilter>) -> Option<Filter> {
        let filter = filter?;
        let mut must: Vec<Condition> = Vec::new();
        if let Some(path) = &filter.file_path {
            must.push(Condition::matches("file_path", path.clone()));
        }
        if let Some(file_type) = &filter.file_type {
            must.push(Condition::matches("file_type", file_type.clone()));
        }
        (!must.is_empty()).then(|| Filter::must(must))
    }

    async fn create_collection(&self, embedding_dim: u64) -> Result<(), VectorStoreError> {
        let create_collection = CreateCollectionBuilder::new(&self.collection)
            .vectors_config(VectorParamsBuilder::new(embedding_dim, Distance::Cosine));

        self.client
            .create_collection(create_collection)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let indexes = [
            ("content", FieldType::Text),
            ("file_path", FieldType::Keyword),
            ("file_type", FieldType::Keyword),
        ];
        for (field, field_type) in indexes {
            self.client
                .create_field_index(CreateFieldIndexCollectionBuilder::new(
                    &self.collection,
                    field,
                    field_type,
                ))
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        Ok(())
    }

    fn record_payload(record: StorageRecord) -> (String, Vec<f32>, HashMap<String, Value>) {
        let mut metadata: HashMap<String, Value> = HashMap::new();
        metadata.insert("indexed_at".to_string(), record.metadata.indexed_at.into());
        metadata.insert(
            "content_hash".to_string(),
            record.metadata.content_hash.into(),
        );
        metadata.insert(
            "total_chunks".to_string(),
            (record.metadata.total_chunks as i64).into(),
        );

        let mut payload: HashMap<String, Value> = HashMap::new();
        payload.insert("content".to_string(), record.content.into());
        payload.insert("file_path".to_string(), record.source_path.into());
        payload.insert("file_name".to_string(), record.file_name.into());
        payload.insert("file_type".to_string(), record.file_type.into());
        payload.insert(
            "chunk_id".to_string(),
            (record.sequence_index as i64).into(),
        );
        payload.insert(
            "metadata".to_string(),
            Value {
                kind: Some(Kind::StructValue(Struct { fields: metadata })),
            },
        );

        (record.id, record.vector, payload)
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key).and_then(|v| v.kind.as_ref()) {
        Some(Kind::IntegerValue(n)) => Some(*n),
        _ => None,
    }
}

fn point_id_string(id: Option<&PointId>) -> String {
    match id.and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Uuid(uuid)) => uuid.clone(),
        Some(PointIdOptions::Num(num)) => num.to_string(),
        None => String::new(),
    }
}

fn hit_from_payload(id: String, score: f32, payload: &HashMap<String, Value>) -> SearchHit {
    let indexed_at = match payload.get("metadata").and_then(|v| v.kind.as_ref()) {
        Some(Kind::StructValue(s)) => payload_str(&s.fields, "indexed_at"),
        _ => None,
    };

    SearchHit {
        id,
        score,
        content: payload_str(payload, "content").unwrap_or_default(),
        file_path: payload_str(payload, "file_path").unwrap_or_default(),
        file_name: payload_str(payload, "file_name").unwrap_or_default(),
        file_type: payload_str(payload, "file_type").unwrap_or_default(),
        chunk_id: payload_int(payload, "chunk_id").unwrap_or(0).max(0) as usize,
        indexed_at,
    }
}

#[async_trait]
impl VectorStore for QdrantBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        self.client
            .health_check()
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        match self.client.collection_info(&self.collection).await {
            Ok(info) => {
                let result = info.result;
                let points_count = result.as_ref().and_then(|r| r.points_count).unwrap_or(0);
                let embedding_dim = result
                    .and_then(|r| r.config)
                    .and_then(|c| c.params)
                    .and_then(|p| p.vectors_config)
                    .and_then(|v| v.config)
                    .and_then(|config| match config {
                        VectorsConfig::Params(params) => Some(params.size),
                        VectorsConfig::ParamsMap(_) => None,
                    });
                Ok(Some(CollectionInfo {
                    points_count,
                    embedding_dim,
                }))
            }
            Err(e) => {
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("doesn't exist") {
                    Ok(None)
                } else {
                    Err(VectorStoreError::CollectionError(msg))
                }
            }
        }
    }

    async fn ensure_schema(
        &self,
        embedding_dim: u64,
        recreate: bool,
    ) -> Result<SchemaAction, VectorStoreError> {
        let existing = self.collection_info().await?;
        let action = match plan_schema(existing, embedding_dim, recreate) {
            SchemaPlan::Create => {
                self.create_collection(embedding_dim).await?;
                SchemaAction::Created
            }
            SchemaPlan::Keep => SchemaAction::Unchanged,
            SchemaPlan::Recreate { previous_dim } => {
                info!(
                    collection = %self.collection,
                    previous_dim = ?previous_dim,
                    embedding_dim,
                    "recreating collection"
                );
                self.client
                    .delete_collection(&self.collection)
                    .await
                    .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
                self.create_collection(embedding_dim).await?;
                SchemaAction::Recreated { previous_dim }
            }
        };
        self.embedding_dim.store(embedding_dim, Ordering::SeqCst);
        Ok(action)
    }

    async fn upsert_batch(
        &self,
        records: Vec<StorageRecord>,
    ) -> Result<UpsertSummary, VectorStoreError> {
        let mut summary = UpsertSummary::default();
        let expected_dim = self.embedding_dim.load(Ordering::SeqCst);

        let points: Vec<PointStruct> = records
            .into_iter()
            .filter_map(|record| {
                if expected_dim != 0 && record.vector.len() as u64 != expected_dim {
                    summary.reject(
                        VectorStoreError::DimensionMismatch {
                            expected: expected_dim,
                            actual: record.vector.len() as u64,
                        }
                        .to_string(),
                    );
                    return None;
                }
                let (id, vector, payload) = Self::record_payload(record);
                Some(PointStruct::new(id, vector, payload))
            })
            .collect();

        if points.is_empty() {
            return Ok(summary);
        }

        let count = points.len();
        with_retry(&self.retry, "upsert", || {
            let upsert = UpsertPointsBuilder::new(&self.collection, points.clone()).wait(true);
            async move {
                self.client
                    .upsert_points(upsert)
                    .await
                    .map(|_| ())
                    .map_err(|e| VectorStoreError::UpsertError(e.to_string()))
            }
        })
        .await?;

        summary.succeeded += count;
        debug!(collection = %self.collection, points = count, "upserted points");
        Ok(summary)
    }

    async fn search_text(
        &self,
        query: &str,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let mut must = vec![Condition::matches_text("content", query)];
        if let Some(extra) = Self::build_filter(filter) {
            must.push(extra.into());
        }

        let scroll = ScrollPointsBuilder::new(&self.collection)
            .filter(Filter::must(must))
            .limit(u32::try_from(limit).unwrap_or(u32::MAX))
            .with_payload(true)
            .with_vectors(false);

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(response
            .result
            .iter()
            .map(|point| hit_from_payload(point_id_string(point.id.as_ref()), 1.0, &point.payload))
            .collect())
    }

    async fn search_vector(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, vector, limit).with_payload(true);

        if let Some(f) = Self::build_filter(filter) {
            search_builder = search_builder.filter(f);
        }

        let results = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(results
            .result
            .iter()
            .map(|point| {
                hit_from_payload(point_id_string(point.id.as_ref()), point.score, &point.payload)
            })
            .collect())
    }

    async fn delete_by_path(&self, source_path: &str) -> Result<(), VectorStoreError> {
        let filter = Filter::must([Condition::matches("file_path", source_path.to_string())]);
        let delete = DeletePointsBuilder::new(&self.collection)
            .points(filter)
            .wait(true);

        self.client
            .delete_points(delete)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;

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

    #[test]
    fn test_record_payload_fields() {
        let record = StorageRecord::from_chunk(
            PassageChunk {
                source_path: "/docs/a.md".to_string(),
                sequence_index: 3,
                text: "body".to_string(),
            },
            vec![0.5; 4],
            "md",
            7,
            "2026-01-01T00:00:00+00:00",
        );
        let expected_id = record.id.clone();

        let (id, vector, payload) = QdrantBackend::record_payload(record);
        assert_eq!(id, expected_id);
        assert_eq!(vector.len(), 4);

        let hit = hit_from_payload(id, 0.9, &payload);
        assert_eq!(hit.file_path, "/docs/a.md");
        assert_eq!(hit.file_name, "a.md");
        assert_eq!(hit.chunk_id, 3);
        assert_eq!(hit.indexed_at.as_deref(), Some("2026-01-01T00:00:00+00:00"));
    }

    #[test]
    fn test_build_filter() {
        assert!(QdrantBackend::build_filter(None).is_none());
        assert!(QdrantBackend::build_filter(Some(&SearchFilter::default())).is_none());
        let filter = SearchFilter {
            file_type: Some("md".to_string()),
            ..Default::default()
        };
        assert_eq!(
            QdrantBackend::build_filter(Some(&filter)).map(|f| f.must.len()),
            Some(1)
        );
    }
}
