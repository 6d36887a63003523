use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::IndexError;

/// Parameters of one directory indexing run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub root: PathBuf,
    pub recursive: bool,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
    /// Drop and recreate the collection even when its dimension matches.
    pub recreate_collection: bool,
}

impl JobRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: true,
            chunk_size: 256,
            chunk_overlap: 64,
            embedding_batch_size: 2,
            recreate_collection: false,
        }
    }
}

/// Running totals of a job. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounters {
    /// Files admitted after the size filter.
    pub total_files: usize,
    pub skipped_files: usize,
    pub indexed_chunks: usize,
    pub error_files: usize,
    pub indexed_files: usize,
}

impl JobCounters {
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome {
            FileOutcome::Done { chunks, .. } => {
                self.indexed_files += 1;
                self.indexed_chunks += chunks;
            }
            FileOutcome::Skipped(_) => self.skipped_files += 1,
            FileOutcome::Failed(_) => self.error_files += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoParser,
    TooLarge { size: u64, limit: u64 },
    Empty,
    NoChunks,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoParser => write!(f, "no parser registered for this file type"),
            SkipReason::TooLarge { size, limit } => {
                write!(f, "file too large ({size} bytes, limit {limit} bytes)")
            }
            SkipReason::Empty => write!(f, "file is empty"),
            SkipReason::NoChunks => write!(f, "no indexable text after parsing"),
        }
    }
}

/// Terminal state of the per-file pipeline.
#[derive(Debug)]
pub enum FileOutcome {
    /// `chunks` records were stored, `rejected` were refused by the store.
    Done { chunks: usize, rejected: usize },
    Skipped(SkipReason),
    Failed(IndexError),
}

impl FileOutcome {
    pub fn chunks(&self) -> usize {
        match self {
            FileOutcome::Done { chunks, .. } => *chunks,
            _ => 0,
        }
    }
}
