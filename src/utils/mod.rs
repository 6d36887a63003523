//! Utility modules.

pub mod file;
pub mod memory;
pub mod retry;
pub mod text;

pub use file::{DecodedText, content_hash, decode_text, normalized_extension, read_limited};
pub use memory::resident_memory_mb;
pub use retry::{RetryPolicy, Retryable, with_retry};
pub use text::{collapse_whitespace, has_visible_content, truncate_chars};
