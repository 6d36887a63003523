use super::Parser;
use crate::error::ParseError;

/// Passes text through unchanged apart from line ending normalization.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextParser;

impl Parser for PlainTextParser {
    fn name(&self) -> &str {
        "plain"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["txt", "text", "rst"]
    }

    fn parse(&self, content: &str) -> Result<String, ParseError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        Ok(content.replace("\r\n", "\n"))
    }
}
