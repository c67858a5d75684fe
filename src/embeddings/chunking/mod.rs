#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator placed between paragraphs packed into the same chunk
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n)+").expect("valid regex"));

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Soft character budget per chunk. A single paragraph longer than
    /// the budget is still emitted whole.
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self { max_chars: 1200 }
    }
}

/// Chunks of one document plus the page range label they share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDocument {
    pub chunks: Vec<String>,
    pub page_range: Option<String>,
}

/// Normalize line endings and collapse runs of blank lines to one
#[inline]
pub fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    BLANK_LINE_RUN
        .replace_all(&unified, PARAGRAPH_SEPARATOR)
        .into_owned()
}

/// Split normalized text into its non-blank paragraphs
#[inline]
pub fn split_paragraphs(normalized: &str) -> Vec<&str> {
    normalized
        .split(PARAGRAPH_SEPARATOR)
        .map(|paragraph| paragraph.trim_matches('\n'))
        .filter(|paragraph| !paragraph.trim().is_empty())
        .collect()
}

/// Greedily pack paragraphs into chunks under the configured budget
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;

    for paragraph in split_paragraphs(&normalized) {
        let paragraph_chars = paragraph.chars().count();

        if !current.is_empty()
            && current_chars + PARAGRAPH_SEPARATOR.len() + paragraph_chars > config.max_chars
        {
            chunks.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        if !current.is_empty() {
            current.push_str(PARAGRAPH_SEPARATOR);
            current_chars += PARAGRAPH_SEPARATOR.len();
        }
        current.push_str(paragraph);
        current_chars += paragraph_chars;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    debug!(
        "Chunked {} characters into {} chunks (budget {})",
        text.len(),
        chunks.len(),
        config.max_chars
    );

    chunks
}

/// Chunk an extracted document and label the chunks with its page range
#[inline]
pub fn chunk_document(text: &str, page_count: u32, config: &ChunkingConfig) -> ChunkedDocument {
    ChunkedDocument {
        chunks: chunk_text(text, config),
        page_range: page_range_label(page_count),
    }
}

/// `"1-<page_count>"`, or nothing for a document without pages
#[inline]
pub fn page_range_label(page_count: u32) -> Option<String> {
    (page_count > 0).then(|| format!("1-{}", page_count))
}
