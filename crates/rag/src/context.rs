//! Context block formatting
//!
//! ```text
//! Here is relevant information from the company's knowledge base:
//!
//!
//! [Source 1: hours.pdf (relevance: 0.91)]
//! We are open 9 to 5.
//!
//! ---
//!
//! User question: when do you open?
//! ```

use std::cmp::Ordering;

use crate::RetrievalChunk;

const CONTEXT_HEADER: &str = "Here is relevant information from the company's knowledge base:\n";
const CONTEXT_FOOTER: &str = "\n---\n";

/// Keep chunks at or above `threshold`, best first, at most `count`
pub fn select_chunks(
    mut chunks: Vec<RetrievalChunk>,
    threshold: f32,
    count: usize,
) -> Vec<RetrievalChunk> {
    chunks.retain(|c| c.similarity.is_finite() && c.similarity >= threshold);
    chunks.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    chunks.truncate(count);
    chunks
}

/// Render chunks as a context block; empty input renders nothing
pub fn format_context(chunks: &[RetrievalChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut parts = Vec::with_capacity(chunks.len() * 2 + 2);
    parts.push(CONTEXT_HEADER.to_string());

    for (i, chunk) in chunks.iter().enumerate() {
        parts.push(format!(
            "\n[Source {}: {} (relevance: {:.2})]",
            i + 1,
            chunk.file_name,
            chunk.similarity
        ));
        parts.push(chunk.text.clone());
    }

    parts.push(CONTEXT_FOOTER.to_string());
    parts.join("\n")
}

/// Prepend the context block to a user request
///
/// With no chunks the request is returned unchanged.
pub fn augment(text: &str, chunks: &[RetrievalChunk]) -> String {
    if chunks.is_empty() {
        return text.to_string();
    }
    format!("{}\nUser question: {}", format_context(chunks), text)
}
