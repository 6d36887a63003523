//! Text chunking with overlap and natural break points.
//!
//! All offsets are measured in characters (Unicode scalar values), never in
//! bytes, so a chunk boundary can not split a code point.

use std::ops::Range;

use crate::models::IndexingConfig;
use crate::utils::has_visible_content;

/// Break delimiters in priority order.
const DELIMITERS: [&str; 7] = ["\n\n", "\n", ". ", "! ", "? ", "; ", ", "];

/// Minimum forward movement expected once the grace period is over.
pub const MIN_PROGRESS: usize = 10;

/// Number of chunks emitted before `MIN_PROGRESS` is enforced.
pub const PROGRESS_GRACE_CHUNKS: usize = 5;

/// Hard limits applied to every chunking call.
#[derive(Debug, Clone, Copy)]
pub struct ChunkerLimits {
    pub max_text_length: usize,
    pub chunk_size_ceiling: usize,
}

impl Default for ChunkerLimits {
    fn default() -> Self {
        Self {
            max_text_length: 500_000,
            chunk_size_ceiling: 1000,
        }
    }
}

/// Non-fatal adjustments made while chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkWarning {
    TextTruncated { original: usize, limit: usize },
    ChunkSizeClamped { requested: usize, limit: usize },
    OverlapClamped { requested: usize, limit: usize },
    DuplicateChunk { position: usize },
    SmallProgress { moved: usize },
    MaxChunksReached { limit: usize, remaining: usize },
}

impl ChunkWarning {
    /// Whether the warning means input text was dropped.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            ChunkWarning::TextTruncated { .. } | ChunkWarning::MaxChunksReached { .. }
        )
    }
}

impl std::fmt::Display for ChunkWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkWarning::TextTruncated { original, limit } => {
                write!(f, "text is very large ({original} chars), truncated to {limit} chars")
            }
            ChunkWarning::ChunkSizeClamped { requested, limit } => {
                write!(f, "chunk size {requested} is too large, limited to {limit}")
            }
            ChunkWarning::OverlapClamped { requested, limit } => {
                write!(f, "chunk overlap {requested} is too large, limited to {limit}")
            }
            ChunkWarning::DuplicateChunk { position } => {
                write!(f, "duplicate chunk at position {position}, overlap skipped")
            }
            ChunkWarning::SmallProgress { moved } => {
                write!(f, "chunk window moved only {moved} chars, overlap skipped")
            }
            ChunkWarning::MaxChunksReached { limit, remaining } => write!(
                f,
                "maximum number of chunks ({limit}) reached, {remaining} trailing chars not indexed"
            ),
        }
    }
}

/// Result of a chunking call with the character span of every chunk.
#[derive(Debug, Clone, Default)]
pub struct ChunkReport {
    pub chunks: Vec<String>,
    pub spans: Vec<Range<usize>>,
    pub warnings: Vec<ChunkWarning>,
}

impl ChunkReport {
    fn push(&mut self, chunk: String, span: Range<usize>) {
        self.chunks.push(chunk);
        self.spans.push(span);
    }

    pub fn window_starts(&self) -> Vec<usize> {
        self.spans.iter().map(|s| s.start).collect()
    }
}

/// Splits text into overlapping passages, preferring natural break points.
///
/// Stateless and deterministic: the same input always yields the same chunks.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    limits: ChunkerLimits,
}

impl TextChunker {
    pub fn new(limits: ChunkerLimits) -> Self {
        Self { limits }
    }

    pub fn from_config(config: &IndexingConfig) -> Self {
        Self::new(ChunkerLimits {
            max_text_length: config.max_text_length,
            chunk_size_ceiling: config.chunk_size_ceiling,
        })
    }

    pub fn chunk(&self, text: &str, chunk_size: usize, overlap: usize, max_chunks: usize) -> Vec<String> {
        self.chunk_with_report(text, chunk_size, overlap, max_chunks)
            .chunks
    }

    pub fn chunk_with_report(
        &self,
        text: &str,
        chunk_size: usize,
        overlap: usize,
        max_chunks: usize,
    ) -> ChunkReport {
        let mut report = ChunkReport::default();

        let mut chars: Vec<char> = text.chars().collect();
        if chars.len() > self.limits.max_text_length {
            report.warnings.push(ChunkWarning::TextTruncated {
                original: chars.len(),
                limit: self.limits.max_text_length,
            });
            chars.truncate(self.limits.max_text_length);
        }

        let ceiling = self.limits.chunk_size_ceiling.max(1);
        let mut chunk_size = chunk_size.max(1);
        if chunk_size > ceiling {
            report.warnings.push(ChunkWarning::ChunkSizeClamped {
                requested: chunk_size,
                limit: ceiling,
            });
            chunk_size = ceiling;
        }

        let max_overlap = chunk_size / 2;
        let overlap = if overlap > max_overlap {
            report.warnings.push(ChunkWarning::OverlapClamped {
                requested: overlap,
                limit: max_overlap,
            });
            max_overlap
        } else {
            overlap
        };

        let len = chars.len();
        if max_chunks == 0 || len == 0 {
            return report;
        }

        if len <= chunk_size {
            let chunk: String = chars.iter().collect();
            if has_visible_content(&chunk) {
                report.push(chunk, 0..len);
            }
            return report;
        }

        let mut start = 0;
        while start < len {
            if report.chunks.len() >= max_chunks {
                report.warnings.push(ChunkWarning::MaxChunksReached {
                    limit: max_chunks,
                    remaining: len - start,
                });
                break;
            }

            let mut end = (start + chunk_size).min(len);
            if end < len
                && let Some(brk) = find_break(&chars, start + chunk_size / 3, end)
            {
                end = brk;
            }

            let chunk: String = chars[start..end].iter().collect();
            let emitted = has_visible_content(&chunk);
            let duplicate = emitted && report.chunks.last() == Some(&chunk);
            if emitted {
                report.push(chunk, start..end);
            }

            let previous = start;
            let mut next = end.saturating_sub(overlap);

            if duplicate {
                report.warnings.push(ChunkWarning::DuplicateChunk {
                    position: report.chunks.len(),
                });
                next = end;
            }

            if next < end {
                let stalled = next <= previous;
                let crawling = !stalled
                    && next - previous < MIN_PROGRESS
                    && report.chunks.len() > PROGRESS_GRACE_CHUNKS;
                if stalled || crawling {
                    report.warnings.push(ChunkWarning::SmallProgress {
                        moved: next.saturating_sub(previous),
                    });
                    next = end;
                }
            }

            // end > previous always holds, this only guards against a zero-width window
            if next <= previous {
                next = previous + 1;
            }

            start = next;
        }

        report
    }
}

/// Position just after the last delimiter found in `[min, end)`, trying
/// delimiters in priority order.
fn find_break(chars: &[char], min: usize, end: usize) -> Option<usize> {
    DELIMITERS.iter().find_map(|delimiter| {
        let pattern: Vec<char> = delimiter.chars().collect();
        rfind(chars, &pattern, min, end).map(|pos| pos + pattern.len())
    })
}

fn rfind(chars: &[char], pattern: &[char], min: usize, end: usize) -> Option<usize> {
    if end < min + pattern.len() {
        return None;
    }
    (min..=end - pattern.len())
        .rev()
        .find(|&i| chars[i..i + pattern.len()] == *pattern)
}
