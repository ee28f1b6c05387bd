//! In-memory manual index.
//!
//! Passages are scored by keyword overlap with the query. Good enough for a
//! handful of manuals; swap in a vector store behind [`ManualRetriever`] for
//! anything larger.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;

use fixit_core::{Error, ManualRetriever, Result};

const CHUNK_WORDS: usize = 500;
const CHUNK_OVERLAP: usize = 50;
const MIN_CHUNK_CHARS: usize = 100;

/// Split text into overlapping word windows, dropping tiny chunks.
pub fn chunk_text(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = CHUNK_WORDS - CHUNK_OVERLAP;

    (0..words.len())
        .step_by(step)
        .map(|start| words[start..(start + CHUNK_WORDS).min(words.len())].join(" "))
        .filter(|chunk| chunk.len() > MIN_CHUNK_CHARS)
        .collect()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
struct Passage {
    text: String,
    category: Option<String>,
    tokens: HashSet<String>,
}

/// Keyword-overlap manual index.
#[derive(Debug, Default)]
pub struct InMemoryManualIndex {
    passages: DashMap<String, Passage>,
}

impl InMemoryManualIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one passage. `category` limits it to matching filters; passages
    /// without one match every filter.
    pub fn add(&self, id: impl Into<String>, text: impl Into<String>, category: Option<&str>) {
        let text = text.into();
        let tokens = tokenize(&text);
        self.passages.insert(
            id.into(),
            Passage {
                text,
                category: category.map(str::to_string),
                tokens,
            },
        );
    }

    /// Chunk a whole document and index every chunk. Returns the chunk count.
    pub fn add_document(&self, source: &str, text: &str, category: Option<&str>) -> usize {
        let chunks = chunk_text(text);
        for (i, chunk) in chunks.iter().enumerate() {
            self.add(format!("{}_{}", source, i), chunk.as_str(), category);
        }
        chunks.len()
    }

    /// Index every `*.txt` file in a directory. A missing directory is an
    /// empty corpus.
    pub async fn load_dir(&self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        if !dir.exists() {
            tracing::warn!(dir = %dir.display(), "Manual directory not found, retrieval disabled");
            return Ok(0);
        }

        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::internal(format!("read {}: {}", dir.display(), e)))?;

        let mut total = 0;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::internal(format!("read {}: {}", dir.display(), e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let source = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("manual")
                .to_string();

            match tokio::fs::read_to_string(&path).await {
                Ok(text) => {
                    let added = self.add_document(&source, &text, None);
                    tracing::info!(source = %source, chunks = added, "Indexed manual");
                    total += added;
                }
                Err(e) => tracing::error!(source = %source, error = %e, "Failed to read manual"),
            }
        }

        tracing::info!(total_chunks = total, "Manual index ready");
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }
}

#[async_trait]
impl ManualRetriever for InMemoryManualIndex {
    async fn retrieve(&self, query: &str, category: Option<&str>, limit: usize) -> Result<Vec<String>> {
        if self.passages.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let query_tokens = tokenize(query);
        let mut scored: Vec<(usize, String)> = self
            .passages
            .iter()
            .filter(|p| match (category, &p.value().category) {
                (Some(wanted), Some(have)) => have.eq_ignore_ascii_case(wanted),
                _ => true,
            })
            .map(|p| {
                let score = p.value().tokens.intersection(&query_tokens).count();
                (score, p.value().text.clone())
            })
            .filter(|(score, _)| *score > 0)
            .collect();

        // Highest overlap first; text breaks ties so results are stable.
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        Ok(scored.into_iter().take(limit).map(|(_, text)| text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunking_overlap_and_min_size() {
        let words: Vec<String> = (0..1000).map(|i| format!("word{}", i)).collect();
        let chunks = chunk_text(&words.join(" "));

        // Windows start at 0, 450 and 900.
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].starts_with("word0 "));
        assert!(chunks[1].starts_with("word450 "));
        assert!(chunks[0].ends_with("word499"));

        assert!(chunk_text("too short").is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_overlap() {
        let index = InMemoryManualIndex::new();
        index.add("a", "Hold the reset button for ten seconds to restore factory settings.", Some("Router"));
        index.add("b", "Replace the toner cartridge when the light blinks.", Some("Printer"));
        index.add("c", "The router reset button sits beside the power jack.", None);

        let hits = index.retrieve("router reset button", Some("router"), 3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].contains("router reset button"));

        let none = index.retrieve("toner", Some("Router"), 3).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let index = InMemoryManualIndex::new();
        assert!(index.retrieve("anything", None, 3).await.unwrap().is_empty());
        assert_eq!(index.load_dir("/definitely/not/here").await.unwrap(), 0);
        assert!(index.is_empty());
    }
}
