use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::{content_hash, normalized_extension};

/// A file discovered for indexing.
///
/// The raw bytes are only held between `load` and `take_content`; the
/// pipeline drops them as soon as they have been decoded.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub extension: String,
    pub raw_size: u64,
    raw_content: Option<Vec<u8>>,
}

impl Document {
    pub fn new(path: impl Into<PathBuf>, raw_size: u64) -> Self {
        let path = path.into();
        let extension = normalized_extension(&path).unwrap_or_default();
        Self {
            path,
            extension,
            raw_size,
            raw_content: None,
        }
    }

    /// Read the file, refusing anything above `max_size` bytes.
    pub fn load(&mut self, max_size: u64) -> std::io::Result<()> {
        let bytes = crate::utils::read_limited(&self.path, max_size)?;
        self.raw_size = bytes.len() as u64;
        self.raw_content = Some(bytes);
        Ok(())
    }

    pub fn take_content(&mut self) -> Option<Vec<u8>> {
        self.raw_content.take()
    }

    pub fn file_name(&self) -> String {
        file_name_of(&self.path)
    }

    pub fn source_path(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// One passage of a document, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassageChunk {
    pub source_path: String,
    pub sequence_index: usize,
    pub text: String,
}

impl PassageChunk {
    /// Number chunk texts densely from 0.
    pub fn sequence(source_path: &str, texts: Vec<String>) -> Vec<Self> {
        texts
            .into_iter()
            .enumerate()
            .map(|(sequence_index, text)| Self {
                source_path: source_path.to_string(),
                sequence_index,
                text,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// RFC 3339 timestamp of the indexing run.
    pub indexed_at: String,
    pub content_hash: String,
    pub total_chunks: usize,
}

/// A passage with its embedding, ready to be written to a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRecord {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub vector: Vec<f32>,
    pub source_path: String,
    pub file_name: String,
    pub file_type: String,
    pub sequence_index: usize,
    pub metadata: RecordMetadata,
}

impl StorageRecord {
    /// Deterministic id: re-indexing a file overwrites its previous records.
    pub fn generate_id(source_path: &str, sequence_index: usize) -> String {
        let name = format!("{}:{}", source_path, sequence_index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
    }

    pub fn from_chunk(
        chunk: PassageChunk,
        vector: Vec<f32>,
        file_type: &str,
        total_chunks: usize,
        indexed_at: &str,
    ) -> Self {
        let id = Self::generate_id(&chunk.source_path, chunk.sequence_index);
        let file_name = file_name_of(Path::new(&chunk.source_path));
        let content_hash = content_hash(&chunk.text);
        Self {
            id,
            content: chunk.text,
            vector,
            source_path: chunk.source_path,
            file_name,
            file_type: file_type.to_string(),
            sequence_index: chunk.sequence_index,
            metadata: RecordMetadata {
                indexed_at: indexed_at.to_string(),
                content_hash,
                total_chunks,
            },
        }
    }
}
