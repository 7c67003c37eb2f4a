//! Lexical chunk search.
//!
//! Score = sum over query tokens of the non-overlapping occurrences of the
//! token in the lower-cased chunk text. No weighting, no stemming.

use serde::Serialize;
use std::cmp::Ordering;

use super::store::{ChunkRecord, Store};
use crate::error::Result;

pub const DEFAULT_TOP_K: usize = 10;
pub const MAX_TOP_K: usize = 50;
pub const SNIPPET_CHARS: usize = 400;

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub query: String,
    pub top_k: Option<usize>,
    /// Restrict to these sources; `None` searches every registered source
    pub source_ids: Option<Vec<String>>,
    pub path_prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub score: usize,
    pub chunk_id: String,
    pub source_id: String,
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub snippet: String,
}

/// Whitespace tokenization, lower-cased, empties dropped.
pub fn tokenize(query: &str) -> Vec<String> {
    query.split_whitespace().map(str::to_lowercase).collect()
}

pub fn score(text: &str, tokens: &[String]) -> usize {
    let lower = text.to_lowercase();
    tokens.iter().map(|t| lower.matches(t.as_str()).count()).sum()
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

fn clamp_top_k(top_k: Option<usize>) -> usize {
    top_k.unwrap_or(DEFAULT_TOP_K).clamp(1, MAX_TOP_K)
}

/// Equal scores order by source id, then path, then start line.
fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.path.cmp(&b.path))
        .then_with(|| a.start_line.cmp(&b.start_line))
}

/// Score and rank an in-memory chunk set.
pub fn rank<I>(chunks: I, query: &SearchQuery) -> Vec<SearchHit>
where
    I: IntoIterator<Item = ChunkRecord>,
{
    let tokens = tokenize(&query.query);
    if tokens.is_empty() {
        return Vec::new();
    }
    let prefix = query.path_prefix.as_deref().unwrap_or("");

    let mut hits: Vec<SearchHit> = chunks
        .into_iter()
        .filter(|c| c.path.starts_with(prefix))
        .filter_map(|c| {
            let score = score(&c.text, &tokens);
            (score > 0).then(|| SearchHit {
                score,
                snippet: snippet(&c.text),
                chunk_id: c.id,
                source_id: c.source_id,
                path: c.path,
                start_line: c.start_line,
                end_line: c.end_line,
            })
        })
        .collect();

    hits.sort_by(rank_order);
    hits.truncate(clamp_top_k(query.top_k));
    hits
}

/// Search the persisted chunks of the selected sources.
pub fn search(store: &Store, query: &SearchQuery) -> Result<Vec<SearchHit>> {
    let registry = store.load_registry()?;
    let selected: Vec<&String> = match &query.source_ids {
        Some(ids) => registry.keys().filter(|k| ids.contains(*k)).collect(),
        None => registry.keys().collect(),
    };

    let mut chunks = Vec::new();
    for source_id in selected {
        chunks.extend(store.read_chunks(source_id)?);
    }

    let hits = rank(chunks, query);
    tracing::debug!(query = %query.query, hits = hits.len(), "kb search");
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, path: &str, start: usize, text: &str) -> ChunkRecord {
        ChunkRecord {
            id: format!("{}:{}:{}", source, path, start),
            source_id: source.to_string(),
            path: path.to_string(),
            start_line: start,
            end_line: start + 1,
            extension: "md".to_string(),
            text: text.to_string(),
        }
    }

    fn query(q: &str) -> SearchQuery {
        SearchQuery {
            query: q.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tokenize_drops_empties() {
        assert_eq!(tokenize("  Proxy   UPGRADE\t"), vec!["proxy", "upgrade"]);
        assert!(tokenize("   ").is_empty());
    }

    #[test]
    fn test_score_counts_non_overlapping() {
        assert_eq!(score("aaaa", &["aa".to_string()]), 2);
        assert_eq!(score("Gas gas GAS", &["gas".to_string()]), 3);
        assert_eq!(score("gas fee", &["gas".to_string(), "fee".to_string()]), 2);
        assert_eq!(score("nothing", &["gas".to_string()]), 0);
    }

    #[test]
    fn test_more_occurrences_rank_higher() {
        let hits = rank(
            vec![
                chunk("s", "once.md", 1, "token here"),
                chunk("s", "thrice.md", 1, "token token token"),
            ],
            &query("token"),
        );
        assert_eq!(hits[0].path, "thrice.md");
        assert_eq!(hits[0].score, 3);
        assert_eq!(hits[1].score, 1);
    }

    #[test]
    fn test_zero_scores_dropped_and_empty_ok() {
        let hits = rank(vec![chunk("s", "a.md", 1, "unrelated")], &query("token"));
        assert!(hits.is_empty());
        assert!(rank(vec![chunk("s", "a.md", 1, "x")], &query("  ")).is_empty());
    }

    #[test]
    fn test_top_k_cap() {
        let chunks: Vec<ChunkRecord> = (0..20)
            .map(|i| chunk("s", "a.md", i * 10 + 1, "match"))
            .collect();
        let mut q = query("match");
        q.top_k = Some(5);
        assert_eq!(rank(chunks.clone(), &q).len(), 5);

        q.top_k = None;
        assert_eq!(rank(chunks.clone(), &q).len(), DEFAULT_TOP_K);

        q.top_k = Some(0);
        assert_eq!(rank(chunks, &q).len(), 1);
    }

    #[test]
    fn test_top_k_hard_max() {
        let chunks: Vec<ChunkRecord> = (0..80)
            .map(|i| chunk("s", "a.md", i * 10 + 1, "match"))
            .collect();
        let mut q = query("match");
        q.top_k = Some(500);
        assert_eq!(rank(chunks, &q).len(), MAX_TOP_K);
    }

    #[test]
    fn test_ties_break_by_source_path_line() {
        let hits = rank(
            vec![
                chunk("b", "a.md", 1, "x"),
                chunk("a", "z.md", 5, "x"),
                chunk("a", "z.md", 1, "x"),
                chunk("a", "m.md", 9, "x"),
            ],
            &query("x"),
        );
        let order: Vec<(&str, &str, usize)> = hits
            .iter()
            .map(|h| (h.source_id.as_str(), h.path.as_str(), h.start_line))
            .collect();
        assert_eq!(
            order,
            vec![("a", "m.md", 9), ("a", "z.md", 1), ("a", "z.md", 5), ("b", "a.md", 1)]
        );
    }

    #[test]
    fn test_path_prefix_filter() {
        let hits = rank(
            vec![
                chunk("s", "docs/a.md", 1, "hit"),
                chunk("s", "src/b.rs", 1, "hit"),
            ],
            &SearchQuery {
                query: "hit".to_string(),
                path_prefix: Some("docs/".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "docs/a.md");
    }

    #[test]
    fn test_snippet_is_truncated_by_chars() {
        let long = "é".repeat(1000);
        let hits = rank(vec![chunk("s", "a.md", 1, &long)], &query("é"));
        assert_eq!(hits[0].snippet.chars().count(), SNIPPET_CHARS);
    }
}
