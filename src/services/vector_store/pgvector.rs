use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use tracing::{debug, info};

use super::{
    CollectionInfo, SchemaAction, SchemaPlan, UpsertSummary, VectorStore, plan_schema,
};
use crate::error::VectorStoreError;
use crate::models::{SearchFilter, SearchHit, StorageRecord, VectorStoreConfig};

pub struct PgVectorBackend {
    pool: PgPool,
    table_name: String,
    schema: String,
    collection: String,
    /// Dimension the table was last ensured with; 0 until `ensure_schema` runs.
    embedding_dim: AtomicU64,
}

impl PgVectorBackend {
    pub async fn new(config: &VectorStoreConfig) -> Result<Self, VectorStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_max)
            .acquire_timeout(Duration::from_secs(config.pool_acquire_timeout.into()))
            .connect(&config.url)
            .await
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))?;

        let backend = Self {
            pool,
            table_name: config.qualified_table_name(),
            schema: config.schema.clone().unwrap_or_else(|| "public".to_string()),
            collection: config.collection.clone(),
            embedding_dim: AtomicU64::new(0),
        };

        backend.check_pgvector_extension().await?;

        if config.schema.is_some() {
            backend.create_pg_schema().await?;
        }

        Ok(backend)
    }

    async fn check_pgvector_extension(&self) -> Result<(), VectorStoreError> {
        let result: Option<(String,)> =
            sqlx::query_as("SELECT extname FROM pg_extension WHERE extname = 'vector'")
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if result.is_none() {
            return Err(VectorStoreError::PgVectorExtensionError(
                "pgvector extension is not installed. Run: CREATE EXTENSION vector;".to_string(),
            ));
        }

        Ok(())
    }

    async fn create_pg_schema(&self) -> Result<(), VectorStoreError> {
        let query = format!("CREATE SCHEMA IF NOT EXISTS {}", self.schema);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;
        Ok(())
    }

    async fn create_table(&self, embedding_dim: u64) -> Result<(), VectorStoreError> {
        let create_table = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                id UUID PRIMARY KEY,
                content TEXT NOT NULL,
                embedding vector({}) NOT NULL,
                file_path TEXT NOT NULL,
                file_name TEXT NOT NULL,
                file_type TEXT NOT NULL,
                chunk_id INTEGER NOT NULL,
                metadata JSONB NOT NULL DEFAULT '{{}}'
            )
            "#,
            self.table_name, embedding_dim
        );

        sqlx::query(&create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;

        let indices = [
            format!(
                "CREATE INDEX IF NOT EXISTS {}_embedding_idx ON {} USING hnsw (embedding vector_cosine_ops)",
                self.collection, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_file_path_idx ON {} (file_path)",
                self.collection, self.table_name
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_file_type_idx ON {} (file_type)",
                self.collection, self.table_name
            ),
        ];

        for index_sql in &indices {
            sqlx::query(index_sql)
                .execute(&self.pool)
                .await
                .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        }

        Ok(())
    }

    async fn drop_table(&self) -> Result<(), VectorStoreError> {
        let query = format!("DROP TABLE IF EXISTS {}", self.table_name);
        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::CollectionError(e.to_string()))?;
        Ok(())
    }

    fn row_to_hit(row: &PgRow, score: f32) -> SearchHit {
        let chunk_id: i32 = row.get("chunk_id");
        SearchHit {
            id: row.get("id"),
            score,
            content: row.get("content"),
            file_path: row.get("file_path"),
            file_name: row.get("file_name"),
            file_type: row.get("file_type"),
            chunk_id: chunk_id.max(0) as usize,
            indexed_at: row.get("indexed_at"),
        }
    }
}

/// `AND`-joined filter conditions starting at placeholder `$first`, with
/// the values to bind in order.
fn filter_clause(filter: Option<&SearchFilter>, first: usize) -> (Vec<String>, Vec<String>) {
    let mut parts = Vec::new();
    let mut binds = Vec::new();
    if let Some(filter) = filter {
        if let Some(path) = &filter.file_path {
            parts.push(format!("file_path = ${}", first + binds.len()));
            binds.push(path.clone());
        }
        if let Some(file_type) = &filter.file_type {
            parts.push(format!("file_type = ${}", first + binds.len()));
            binds.push(file_type.clone());
        }
    }
    (parts, binds)
}

/// Escape LIKE wildcards so the query matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

const HIT_COLUMNS: &str =
    "id::text AS id, content, file_path, file_name, file_type, chunk_id, metadata->>'indexed_at' AS indexed_at";

#[async_trait]
impl VectorStore for PgVectorBackend {
    async fn health_check(&self) -> Result<bool, VectorStoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| true)
            .map_err(|e| VectorStoreError::ConnectionError(e.to_string()))
    }

    async fn collection_info(&self) -> Result<Option<CollectionInfo>, VectorStoreError> {
        let table_exists: Option<(String,)> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(&self.schema)
        .bind(&self.collection)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        if table_exists.is_none() {
            return Ok(None);
        }

        let query = format!("SELECT COUNT(*) as count FROM {}", self.table_name);
        let (count,): (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        // pgvector stores the declared dimension as the column's typmod
        let typmod: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute WHERE attrelid = $1::regclass AND attname = 'embedding'",
        )
        .bind(&self.table_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| VectorStoreError::PostgresError(e.to_string()))?;

        Ok(Some(CollectionInfo {
            points_count: count.max(0) as u64,
            embedding_dim: typmod.and_then(|(m,)| u64::try_from(m).ok()).filter(|&d| d > 0),
        }))
    }

    async fn ensure_schema(
        &self,
        embedding_dim: u64,
        recreate: bool,
    ) -> Result<SchemaAction, VectorStoreError> {
        let existing = self.collection_info().await?;
        let action = match plan_schema(existing, embedding_dim, recreate) {
            SchemaPlan::Create => {
                self.create_table(embedding_dim).await?;
                SchemaAction::Created
            }
            SchemaPlan::Keep => SchemaAction::Unchanged,
            SchemaPlan::Recreate { previous_dim } => {
                info!(
                    table = %self.table_name,
                    previous_dim = ?previous_dim,
                    embedding_dim,
                    "recreating table"
                );
                self.drop_table().await?;
                self.create_table(embedding_dim).await?;
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
        if records.is_empty() {
            return Ok(summary);
        }

        let query = format!(
            r#"
            INSERT INTO {} (id, content, embedding, file_path, file_name, file_type, chunk_id, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                file_path = EXCLUDED.file_path,
                file_name = EXCLUDED.file_name,
                file_type = EXCLUDED.file_type,
                chunk_id = EXCLUDED.chunk_id,
                metadata = EXCLUDED.metadata
            "#,
            self.table_name
        );

        let expected_dim = self.embedding_dim.load(Ordering::SeqCst);

        // Row by row so one bad record does not take the rest of the file with it
        for record in records {
            if expected_dim != 0 && record.vector.len() as u64 != expected_dim {
                summary.reject(
                    VectorStoreError::DimensionMismatch {
                        expected: expected_dim,
                        actual: record.vector.len() as u64,
                    }
                    .to_string(),
                );
                continue;
            }

            let id = match uuid::Uuid::parse_str(&record.id) {
                Ok(id) => id,
                Err(e) => {
                    summary.reject(format!("invalid UUID {}: {}", record.id, e));
                    continue;
                }
            };

            let result = sqlx::query(&query)
                .bind(id)
                .bind(&record.content)
                .bind(Vector::from(record.vector))
                .bind(&record.source_path)
                .bind(&record.file_name)
                .bind(&record.file_type)
                .bind(i32::try_from(record.sequence_index).unwrap_or(i32::MAX))
                .bind(Json(&record.metadata))
                .execute(&self.pool)
                .await;

            match result {
                Ok(_) => summary.succeeded += 1,
                Err(sqlx::Error::Database(e)) => summary.reject(e.to_string()),
                Err(e) => return Err(VectorStoreError::UpsertError(e.to_string())),
            }
        }

        debug!(
            table = %self.table_name,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "upsert finished"
        );
        Ok(summary)
    }

    async fn search_text(
        &self,
        query: &str,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let (mut parts, binds) = filter_clause(filter, 2);
        parts.insert(0, "content ILIKE $1".to_string());

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY file_path, chunk_id LIMIT {}",
            HIT_COLUMNS,
            self.table_name,
            parts.join(" AND "),
            limit
        );

        let mut query_builder = sqlx::query(&sql).bind(like_pattern(query));
        for value in &binds {
            query_builder = query_builder.bind(value);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(rows.iter().map(|row| Self::row_to_hit(row, 1.0)).collect())
    }

    async fn search_vector(
        &self,
        vector: Vec<f32>,
        limit: u64,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchHit>, VectorStoreError> {
        let embedding = Vector::from(vector);
        let (parts, binds) = filter_clause(filter, 2);
        let where_clause = if parts.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", parts.join(" AND "))
        };

        let sql = format!(
            r#"
            SELECT {}, 1 - (embedding <=> $1) AS score
            FROM {}
            {}
            ORDER BY embedding <=> $1
            LIMIT {}
            "#,
            HIT_COLUMNS, self.table_name, where_clause, limit
        );

        let mut query_builder = sqlx::query(&sql).bind(&embedding);
        for value in &binds {
            query_builder = query_builder.bind(value);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| VectorStoreError::SearchError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get("score");
                Self::row_to_hit(row, score as f32)
            })
            .collect())
    }

    async fn delete_by_path(&self, source_path: &str) -> Result<(), VectorStoreError> {
        let query = format!("DELETE FROM {} WHERE file_path = $1", self.table_name);
        sqlx::query(&query)
            .bind(source_path)
            .execute(&self.pool)
            .await
            .map_err(|e| VectorStoreError::DeleteError(e.to_string()))?;
        Ok(())
    }

    fn collection(&self) -> &str {
        &self.collection
    }
}
