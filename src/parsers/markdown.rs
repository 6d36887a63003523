//! Markdown to plain text.
//!
//! Markup is stripped and whitespace collapsed to single spaces, leaving only
//! the prose, link texts, image alt texts and code contents.

use std::sync::LazyLock;

use regex::Regex;

use super::Parser;
use crate::error::ParseError;
use crate::utils::collapse_whitespace;

static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(```|~~~).*$").unwrap());
static HTML_COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static HTML_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[A-Za-z][^>]*>").unwrap());
static IMAGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap());
static LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]*\)").unwrap());
static REF_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\[[^\]]*\]").unwrap());
static LINK_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}\[[^\]]+\]:\s+\S+.*$").unwrap());
static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s{0,3}#{1,6}\s*").unwrap());
static SETEXT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*(=+|-+)\s*$").unwrap());
static RULE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*([*_-]\s*){3,}$").unwrap());
static BLOCKQUOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*>+\s?").unwrap());
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*([*+-]|\d+[.)])\s+").unwrap());
static TABLE_SEP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\|?(\s*:?-+:?\s*\|)+\s*:?-*:?\s*$").unwrap());
static EMPHASIS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\*\*|__|\*|~~)([^*~\n]+?)(\*\*|__|\*|~~)").unwrap());
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`+([^`]*)`+").unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct MarkdownParser;

impl MarkdownParser {
    fn strip(content: &str) -> String {
        let text = HTML_COMMENT.replace_all(content, " ");
        let text = FENCE.replace_all(&text, "");
        let text = LINK_DEF.replace_all(&text, "");
        let text = IMAGE.replace_all(&text, "$1");
        let text = LINK.replace_all(&text, "$1");
        let text = REF_LINK.replace_all(&text, "$1");
        let text = HTML_TAG.replace_all(&text, " ");
        let text = TABLE_SEP.replace_all(&text, "");
        let text = RULE.replace_all(&text, "");
        let text = SETEXT.replace_all(&text, "");
        let text = HEADING.replace_all(&text, "");
        let text = BLOCKQUOTE.replace_all(&text, "");
        let text = LIST_MARKER.replace_all(&text, "");
        let text = INLINE_CODE.replace_all(&text, "$1");
        let text = EMPHASIS.replace_all(&text, "$2");
        let text = text.replace('|', " ");
        decode_entities(&text)
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

impl Parser for MarkdownParser {
    fn name(&self) -> &str {
        "markdown"
    }

    fn supported_extensions(&self) -> &[&'static str] {
        &["md", "markdown"]
    }

    fn parse(&self, content: &str) -> Result<String, ParseError> {
        Ok(collapse_whitespace(&Self::strip(content)))
    }
}
