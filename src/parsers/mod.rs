//! Document parsers: raw decoded file content to indexable plain text.

mod markdown;
mod plain;

pub use markdown::MarkdownParser;
pub use plain::PlainTextParser;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::ParseError;

pub trait Parser: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions without the leading dot.
    fn supported_extensions(&self) -> &[&'static str];

    fn parse(&self, content: &str) -> Result<String, ParseError>;
}

/// Parsers keyed by file extension.
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: HashMap<String, Arc<dyn Parser>>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registry with the built-in Markdown and plain text parsers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MarkdownParser));
        registry.register(Arc::new(PlainTextParser));
        registry
    }

    /// Register a parser for all of its extensions, replacing earlier ones.
    pub fn register(&mut self, parser: Arc<dyn Parser>) {
        for ext in parser.supported_extensions() {
            self.parsers.insert(ext.to_lowercase(), Arc::clone(&parser));
        }
    }

    pub fn get(&self, extension: &str) -> Option<&Arc<dyn Parser>> {
        self.parsers.get(&extension.to_lowercase())
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.parsers.contains_key(&extension.to_lowercase())
    }

    /// Union of every registered extension, sorted.
    pub fn extensions(&self) -> BTreeSet<String> {
        self.parsers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
