mod config;
mod document;
mod event;
mod job;
mod search;

pub use config::{
    Config, DEFAULT_COLLECTION, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EMBEDDING_URL, DEFAULT_QDRANT_URL, EmbeddingBackend, EmbeddingConfig, IndexingConfig,
    PacingConfig, Pooling, VectorDriver, VectorStoreConfig,
};
pub use document::{Document, PassageChunk, RecordMetadata, StorageRecord};
pub use event::{
    CompletedPayload, ErrorPayload, IndexingEvent, ProgressPayload, StartedPayload, StatusPayload,
    WarningPayload, percentage,
};
pub use job::{FileOutcome, JobCounters, JobRequest, SkipReason};
pub use search::{OutputFormat, SearchFilter, SearchHit, SearchResults};
