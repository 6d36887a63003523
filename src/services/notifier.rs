//! Delivery of indexing events.
//!
//! A notifier never fails the job: transport problems are logged and the
//! event is dropped.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::IndexingEvent;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: IndexingEvent);
}

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: IndexingEvent) {
        match &event {
            IndexingEvent::IndexingStarted(p) => {
                info!(total_files = p.total_files, skipped_files = p.skipped_files, "indexing started")
            }
            IndexingEvent::IndexingStatus(p) => info!(status = %p.status, "{}", p.message),
            IndexingEvent::IndexingProgress(p) => info!(
                current = p.current,
                total = p.total,
                percentage = p.percentage,
                chunks = p.chunks_indexed,
                file = %p.file_path,
                "progress"
            ),
            IndexingEvent::IndexingWarning(p) => warn!(file = %p.file_path, "{}", p.warning),
            IndexingEvent::IndexingError(p) => match &p.file_path {
                Some(path) => error!(file = %path, "{}", p.error),
                None => error!("{}", p.error),
            },
            IndexingEvent::IndexingCompleted(p) => info!(
                total_files = p.total_files,
                total_chunks = p.total_chunks,
                skipped_files = p.skipped_files,
                error_files = p.error_files,
                "indexing completed"
            ),
        }
    }
}

/// Writes one JSON object per event, one per line.
pub struct JsonLinesNotifier {
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesNotifier {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

#[async_trait]
impl Notifier for JsonLinesNotifier {
    async fn notify(&self, event: IndexingEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };
        let Ok(mut out) = self.out.lock() else {
            warn!("event writer lock poisoned, dropping {}", event.name());
            return;
        };
        if let Err(e) = writeln!(out, "{line}").and_then(|_| out.flush()) {
            warn!("failed to write {} event: {}", event.name(), e);
        }
    }
}

/// Forwards events into a tokio channel, e.g. towards a websocket task.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<IndexingEvent>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<IndexingEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: IndexingEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!("event receiver dropped, discarding {}", e.0.name());
        }
    }
}
