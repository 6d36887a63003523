pub mod batcher;
pub mod chunker;
pub mod embedding;
pub mod job;
pub mod notifier;
pub mod pipeline;
pub mod vector_store;

#[cfg(test)]
pub(crate) mod testing;

pub use batcher::{BatchEmbedding, BatchFailure, BatchOptions, EmbeddingBatcher};
pub use chunker::{ChunkReport, ChunkWarning, ChunkerLimits, TextChunker};
pub use embedding::{Embedder, create_embedder};
pub use job::{CancelToken, JobContext, JobHandle, JobRegistry, run_directory_job};
pub use notifier::{ChannelNotifier, JsonLinesNotifier, LogNotifier, Notifier};
pub use pipeline::index_file;
pub use vector_store::{
    CollectionInfo, MemoryStore, SchemaAction, UpsertSummary, VectorStore, create_backend,
};
