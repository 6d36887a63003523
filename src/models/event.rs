//! Events emitted while an indexing job runs.
//!
//! Serialized as `{"event": "<name>", "data": {...}}` so any transport can
//! forward them unchanged.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum IndexingEvent {
    IndexingStarted(StartedPayload),
    IndexingStatus(StatusPayload),
    IndexingProgress(ProgressPayload),
    IndexingWarning(WarningPayload),
    IndexingError(ErrorPayload),
    IndexingCompleted(CompletedPayload),
}

impl IndexingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            IndexingEvent::IndexingStarted(_) => "indexing_started",
            IndexingEvent::IndexingStatus(_) => "indexing_status",
            IndexingEvent::IndexingProgress(_) => "indexing_progress",
            IndexingEvent::IndexingWarning(_) => "indexing_warning",
            IndexingEvent::IndexingError(_) => "indexing_error",
            IndexingEvent::IndexingCompleted(_) => "indexing_completed",
        }
    }

    pub fn started(total_files: usize, skipped_files: usize) -> Self {
        IndexingEvent::IndexingStarted(StartedPayload {
            total_files,
            skipped_files,
        })
    }

    pub fn status(status: impl Into<String>, message: impl Into<String>) -> Self {
        IndexingEvent::IndexingStatus(StatusPayload {
            status: status.into(),
            message: message.into(),
        })
    }

    pub fn warning(file_path: impl Into<String>, warning: impl Into<String>) -> Self {
        IndexingEvent::IndexingWarning(WarningPayload {
            file_path: file_path.into(),
            warning: warning.into(),
        })
    }

    pub fn file_error(file_path: impl Into<String>, error: impl Into<String>) -> Self {
        IndexingEvent::IndexingError(ErrorPayload {
            file_path: Some(file_path.into()),
            error: error.into(),
        })
    }

    /// An error that is not tied to a single file.
    pub fn job_error(error: impl Into<String>) -> Self {
        IndexingEvent::IndexingError(ErrorPayload {
            file_path: None,
            error: error.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartedPayload {
    pub total_files: usize,
    pub skipped_files: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub file_path: String,
    pub chunks_indexed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage_mb: Option<f64>,
}

impl ProgressPayload {
    pub fn new(current: usize, total: usize, file_path: impl Into<String>, chunks_indexed: usize) -> Self {
        Self {
            current,
            total,
            percentage: percentage(current, total),
            file_path: file_path.into(),
            chunks_indexed,
            memory_usage_mb: None,
        }
    }

    pub fn with_memory_usage(mut self, memory_usage_mb: Option<f64>) -> Self {
        self.memory_usage_mb = memory_usage_mb.map(|mb| (mb * 100.0).round() / 100.0);
        self
    }
}

/// `current / total` as a percentage rounded to two decimals.
pub fn percentage(current: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = current as f64 / total as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningPayload {
    pub file_path: String,
    pub warning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPayload {
    pub total_files: usize,
    pub total_chunks: usize,
    pub skipped_files: usize,
    pub error_files: usize,
}
