//! Query outcomes and their text rendering.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use lore_core::types::{QueryMode, SearchResult};

/// Ranked results of one query plus how they were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    /// Mode the caller asked for.
    pub requested: QueryMode,
    pub results: Vec<SearchResult>,
    /// True when the embedder was unavailable and keyword results were
    /// returned instead of semantic or hybrid ones.
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl QueryOutcome {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Human-readable listing of the results, one block per hit.
    pub fn render(&self, show_content: bool, preview_chars: usize) -> String {
        let mut out = String::new();
        for warning in &self.warnings {
            let _ = writeln!(out, "warning: {}", warning);
        }
        if self.results.is_empty() {
            out.push_str("No results.\n");
            return out;
        }
        for (rank, result) in self.results.iter().enumerate() {
            out.push('\n');
            render_result(&mut out, rank + 1, result, show_content, preview_chars);
        }
        out
    }
}

fn render_result(
    out: &mut String,
    rank: usize,
    result: &SearchResult,
    show_content: bool,
    preview_chars: usize,
) {
    let _ = writeln!(out, "{}. {}", rank, result.title);
    let _ = writeln!(out, "   ID: {}", result.doc_id);
    let _ = writeln!(out, "   Type: {}", result.doc_type);
    let _ = writeln!(out, "   Tags: {}", result.tags.join(", "));
    let _ = writeln!(out, "   Score: {:.4} ({})", result.score, result.mode);

    if let (Some(semantic), Some(keyword)) = (result.semantic_score, result.keyword_score) {
        let _ = writeln!(
            out,
            "   Breakdown: semantic={:.4}, keyword={:.4}",
            semantic, keyword
        );
    }

    if !result.related.is_empty() {
        let related: Vec<String> = result
            .related
            .iter()
            .map(|r| format!("{} ({})", r.doc_id, r.edge_type))
            .collect();
        let _ = writeln!(out, "   Related: {}", related.join(", "));
    }

    if show_content {
        let _ = writeln!(out, "\n   Content:\n   {}", preview(&result.content, preview_chars));
    }
}

/// First `max_chars` characters of `content`, with `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}
