use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{JobCounters, OutputFormat, SearchResults};

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_summary(&self, summary: &IndexSummary) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub embedder: String,
    pub embedder_healthy: bool,
    pub embedding_dim: usize,
    pub vector_store_driver: String,
    pub vector_store_url: String,
    pub vector_store_connected: bool,
    pub collection: String,
    /// `None` when the collection does not exist yet.
    pub points: Option<u64>,
    pub collection_dim: Option<u64>,
}

impl StatusInfo {
    pub fn dimension_mismatch(&self) -> bool {
        self.collection_dim
            .is_some_and(|dim| dim != self.embedding_dim as u64)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexSummary {
    pub root: String,
    #[serde(flatten)]
    pub counters: JobCounters,
    pub cancelled: bool,
    pub duration_ms: u64,
}

fn preview(content: &str, max_chars: usize) -> String {
    let head: String = content.chars().take(max_chars).collect();
    if content.chars().count() > max_chars {
        format!("{head}...")
    } else {
        head
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, hit) in results.results.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, hit.score).unwrap();
            writeln!(output, "   File:  {} (chunk {})", hit.file_path, hit.chunk_id).unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&hit.content, 200).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedder_status = if status.embedder_healthy {
            "[READY]"
        } else {
            "[UNAVAILABLE]"
        };
        writeln!(output, "Embedder:      {} {}", status.embedder, embedder_status).unwrap();
        writeln!(output, "  Dimension:   {}", status.embedding_dim).unwrap();
        writeln!(output).unwrap();

        let vector_status = if status.vector_store_connected {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(
            output,
            "Vector Store:  {} ({})",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "  URL:         {}", status.vector_store_url).unwrap();
        writeln!(output, "  Collection:  {}", status.collection).unwrap();
        if status.vector_store_connected {
            match status.points {
                Some(points) => writeln!(output, "  Points:      {}", points).unwrap(),
                None => writeln!(output, "  Points:      (collection not created)").unwrap(),
            }
            if let Some(dim) = status.collection_dim {
                writeln!(output, "  Dimension:   {}", dim).unwrap();
            }
        }

        output
    }

    fn format_index_summary(&self, summary: &IndexSummary) -> String {
        let mut output = String::new();
        if summary.cancelled {
            writeln!(output, "Indexing Cancelled").unwrap();
            writeln!(output, "------------------").unwrap();
        } else {
            writeln!(output, "Indexing Complete").unwrap();
            writeln!(output, "-----------------").unwrap();
        }
        writeln!(output, "Root:           {}", summary.root).unwrap();
        writeln!(output, "Files found:    {}", summary.counters.total_files).unwrap();
        writeln!(output, "Files indexed:  {}", summary.counters.indexed_files).unwrap();
        writeln!(output, "Files skipped:  {}", summary.counters.skipped_files).unwrap();
        writeln!(output, "Files failed:   {}", summary.counters.error_files).unwrap();
        writeln!(output, "Chunks indexed: {}", summary.counters.indexed_chunks).unwrap();
        writeln!(output, "Duration:       {}ms", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(&serde_json::json!({
            "embedder": {
                "description": status.embedder,
                "healthy": status.embedder_healthy,
                "dimension": status.embedding_dim,
            },
            "vector_store": {
                "driver": status.vector_store_driver,
                "url": status.vector_store_url,
                "connected": status.vector_store_connected,
                "collection": status.collection,
                "points": status.points,
                "dimension": status.collection_dim,
            }
        }))
    }

    fn format_index_summary(&self, summary: &IndexSummary) -> String {
        self.render(summary)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} results in {}ms\n",
            results.len(),
            results.duration_ms
        )
        .unwrap();

        for (i, hit) in results.results.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, hit.score).unwrap();
            writeln!(output, "**File:** `{}` (chunk {})\n", hit.file_path, hit.chunk_id).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", hit.content).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let embedder_status = if status.embedder_healthy { "✅" } else { "❌" };
        writeln!(output, "### Embedder {}\n", embedder_status).unwrap();
        writeln!(output, "- **Backend:** {}", status.embedder).unwrap();
        writeln!(output, "- **Dimension:** {}\n", status.embedding_dim).unwrap();

        let vector_status = if status.vector_store_connected {
            "✅"
        } else {
            "❌"
        };
        writeln!(
            output,
            "### Vector Store ({}) {}\n",
            status.vector_store_driver, vector_status
        )
        .unwrap();
        writeln!(output, "- **URL:** `{}`", status.vector_store_url).unwrap();
        writeln!(output, "- **Collection:** {}", status.collection).unwrap();
        if let Some(points) = status.points {
            writeln!(output, "- **Points:** {}", points).unwrap();
        }
        if let Some(dim) = status.collection_dim {
            writeln!(output, "- **Dimension:** {}", dim).unwrap();
        }

        output
    }

    fn format_index_summary(&self, summary: &IndexSummary) -> String {
        let mut output = String::new();
        let title = if summary.cancelled {
            "Indexing Cancelled"
        } else {
            "Indexing Complete"
        };
        writeln!(output, "## {}\n", title).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Files found | {} |", summary.counters.total_files).unwrap();
        writeln!(output, "| Files indexed | {} |", summary.counters.indexed_files).unwrap();
        writeln!(output, "| Files skipped | {} |", summary.counters.skipped_files).unwrap();
        writeln!(output, "| Files failed | {} |", summary.counters.error_files).unwrap();
        writeln!(output, "| Chunks indexed | {} |", summary.counters.indexed_chunks).unwrap();
        writeln!(output, "| Duration | {}ms |", summary.duration_ms).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
