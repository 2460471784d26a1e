//! Knowledge base: in-memory chunk index with lexical similarity search.
//!
//! Stands in for an embedding store behind the same narrow contract:
//! `add`, `search`, `document_names`. Scoring is term-frequency cosine over
//! lowercased word tokens; ties break on insertion order so identical inputs
//! always rank identically.

use std::collections::HashMap;

use serde::Serialize;

/// One ranked search result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub text: String,
    pub document: String,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct Chunk {
    document: String,
    text: String,
    terms: HashMap<String, f64>,
    norm: f64,
}

/// Indexed document chunks for semantic-ish search.
#[derive(Debug, Default)]
pub struct KnowledgeBase {
    chunks: Vec<Chunk>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the chunks of one document. Returns the number stored.
    pub fn add(&mut self, _doc_id: &str, doc_name: &str, chunks: &[String]) -> usize {
        let mut stored = 0;
        for text in chunks {
            if text.trim().is_empty() {
                continue;
            }
            let terms = term_frequencies(text);
            if terms.is_empty() {
                continue;
            }
            let norm = vector_norm(&terms);
            self.chunks.push(Chunk {
                document: doc_name.to_string(),
                text: text.clone(),
                terms,
                norm,
            });
            stored += 1;
        }
        stored
    }

    /// Rank all chunks against the query; top `top_k`, best first.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let query_terms = term_frequencies(query);
        if query_terms.is_empty() || self.chunks.is_empty() {
            return Vec::new();
        }
        let query_norm = vector_norm(&query_terms);

        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(idx, chunk)| {
                let dot: f64 = query_terms
                    .iter()
                    .filter_map(|(term, qf)| chunk.terms.get(term).map(|cf| qf * cf))
                    .sum();
                if dot > 0.0 {
                    Some((idx, dot / (query_norm * chunk.norm)))
                } else {
                    None
                }
            })
            .collect();

        // Descending score; insertion order breaks ties deterministically.
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| SearchHit {
                text: self.chunks[idx].text.clone(),
                document: self.chunks[idx].document.clone(),
                score: (score * 10_000.0).round() / 10_000.0,
            })
            .collect()
    }

    /// Sorted, de-duplicated names of all indexed documents.
    pub fn document_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chunks.iter().map(|c| c.document.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Split text into overlapping character chunks for indexing.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        let trimmed = chunk.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut terms: HashMap<String, f64> = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
    {
        *terms.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    terms
}

fn vector_norm(terms: &HashMap<String, f64>) -> f64 {
    terms.values().map(|f| f * f).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indexed() -> KnowledgeBase {
        let mut kb = KnowledgeBase::new();
        kb.add(
            "d1",
            "tp53_review.txt",
            &[
                "TP53 is a tumor suppressor gene involved in apoptosis".to_string(),
                "Cell cycle regulation depends on cyclin concentrations".to_string(),
            ],
        );
        kb.add(
            "d2",
            "methods.txt",
            &["Samples were incubated at 37 degrees overnight".to_string()],
        );
        kb
    }

    #[test]
    fn add_skips_empty_chunks() {
        let mut kb = KnowledgeBase::new();
        let stored = kb.add("d", "doc", &["   ".to_string(), "real text".to_string()]);
        assert_eq!(stored, 1);
    }

    #[test]
    fn search_ranks_matching_chunk_first() {
        let hits = indexed().search("tumor suppressor apoptosis", 5);
        assert!(!hits.is_empty());
        assert!(hits[0].text.contains("TP53"));
        assert_eq!(hits[0].document, "tp53_review.txt");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn search_respects_top_k() {
        let hits = indexed().search("the cell samples gene", 1);
        assert!(hits.len() <= 1);
    }

    #[test]
    fn search_on_empty_index_returns_nothing() {
        assert!(KnowledgeBase::new().search("anything", 5).is_empty());
    }

    #[test]
    fn identical_queries_rank_identically() {
        let kb = indexed();
        assert_eq!(kb.search("cell gene", 5), kb.search("cell gene", 5));
    }

    #[test]
    fn document_names_are_sorted_unique() {
        assert_eq!(
            indexed().document_names(),
            vec!["methods.txt".to_string(), "tp53_review.txt".to_string()]
        );
    }

    #[test]
    fn chunk_text_overlaps() {
        let text = "a".repeat(1200);
        let chunks = chunk_text(&text, 500, 50);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        // Last chunk covers the tail beyond 900 chars.
        assert_eq!(chunks[2].len(), 300);
    }

    #[test]
    fn chunk_text_empty_input() {
        assert!(chunk_text("", 500, 50).is_empty());
    }
}
