//! In-memory retriever: keyword recall over a list of remembered facts.
//!
//! Entries can be loaded from a JSON-lines file (one [`MemoryEntry`] per
//! line), which keeps a scene's memory human-inspectable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use talewright_core::{
    ExternalCallError, HeuristicCounter, RetrievalQuery, Retriever, TokenCounter,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Query words shorter than this are ignored.
const MIN_TERM_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "but", "for", "are", "was", "were", "you", "your", "not", "with", "this",
    "that", "from", "have", "has", "had", "she", "her", "his", "him", "they", "them",
];

/// One remembered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    #[serde(default)]
    pub id: String,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Keyword-scored recall, trimmed to the query's token budget.
pub struct InMemoryRetriever {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    counter: Arc<dyn TokenCounter>,
    limit: usize,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            counter: Arc::new(HeuristicCounter),
            limit: 8,
        }
    }

    /// Count snippet tokens with `counter` instead of the byte estimate.
    pub fn with_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = counter;
        self
    }

    /// Maximum snippets returned per query.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Load entries from a JSON-lines file. Corrupt lines are skipped.
    pub fn load_jsonl(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<MemoryEntry> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<MemoryEntry>(line) {
                Ok(mut entry) => {
                    if entry.id.is_empty() {
                        entry.id = Uuid::new_v4().to_string();
                    }
                    Some(entry)
                }
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted memory entry");
                    None
                }
            })
            .collect();
        debug!(path = %path.display(), count = entries.len(), "Memory file loaded");
        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            ..Self::new()
        })
    }

    /// Remember a fact; returns its id.
    pub async fn remember(&self, content: impl Into<String>) -> String {
        let entry = MemoryEntry::new(content);
        let id = entry.id.clone();
        self.entries.write().await.push(entry);
        id
    }

    pub async fn forget(&self, id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let len_before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() < len_before
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Retriever for InMemoryRetriever {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError> {
        let terms = query_terms(&query.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &MemoryEntry)> = entries
            .iter()
            .map(|e| (score(&e.content, &terms), e))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable: equal scores keep the order they were remembered in.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut used = 0;
        let mut snippets = Vec::new();
        for (_, entry) in scored.into_iter().take(self.limit) {
            let tokens = self.counter.count(&entry.content);
            if used + tokens > query.budget {
                break;
            }
            used += tokens;
            snippets.push(entry.content.clone());
        }
        Ok(snippets)
    }
}

fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_TERM_LEN)
    {
        let word = word.to_lowercase();
        if !STOPWORDS.contains(&word.as_str()) && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Term occurrences, normalized per 100 bytes of content.
fn score(content: &str, terms: &[String]) -> f32 {
    let lower = content.to_lowercase();
    let occurrences: usize = terms.iter().map(|t| lower.matches(t.as_str()).count()).sum();
    occurrences as f32 / (content.len() as f32 / 100.0).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    async fn seeded() -> InMemoryRetriever {
        let mem = InMemoryRetriever::new().with_counter(Arc::new(words));
        mem.remember("Ava hid the ledger in the chapel.").await;
        mem.remember("Kai owes the harbor master money.").await;
        mem.remember("The ledger lists every bribe in the harbor.").await;
        mem
    }

    #[tokio::test]
    async fn remember_and_forget() {
        let mem = InMemoryRetriever::new();
        let id = mem.remember("Mira grew up in the mountains.").await;
        assert!(!id.is_empty());
        assert_eq!(mem.len().await, 1);
        assert!(mem.forget(&id).await);
        assert!(!mem.forget(&id).await);
        assert!(mem.is_empty().await);
    }

    #[tokio::test]
    async fn recall_by_keyword() {
        let mem = seeded().await;
        let snippets = mem
            .retrieve(&RetrievalQuery::new("Ava: Where is the ledger?", 100))
            .await
            .unwrap();
        assert_eq!(snippets.len(), 2);
        assert!(snippets.iter().all(|s| s.contains("ledger")));
        // "Ava" and "ledger" both match the first entry.
        assert_eq!(snippets[0], "Ava hid the ledger in the chapel.");
    }

    #[tokio::test]
    async fn recall_respects_budget() {
        let mem = seeded().await;
        let snippets = mem
            .retrieve(&RetrievalQuery::new("ledger harbor", 8))
            .await
            .unwrap();
        assert_eq!(snippets.len(), 1);
    }

    #[tokio::test]
    async fn short_and_common_words_ignored() {
        let mem = seeded().await;
        let snippets = mem
            .retrieve(&RetrievalQuery::new("in the", 100))
            .await
            .unwrap();
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn limit_caps_snippets() {
        let mem = seeded().await.with_limit(1);
        let snippets = mem
            .retrieve(&RetrievalQuery::new("harbor ledger", 100))
            .await
            .unwrap();
        assert_eq!(snippets.len(), 1);
    }

    #[tokio::test]
    async fn load_jsonl_skips_corrupt_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"content": "The chapel bell is cracked."}}"#).unwrap();
        writeln!(file, "not json").unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id": "m2", "content": "Kai fears the sea."}}"#).unwrap();

        let mem = InMemoryRetriever::load_jsonl(file.path()).unwrap();
        assert_eq!(mem.len().await, 2);
        assert!(mem.forget("m2").await);

        let snippets = mem
            .retrieve(&RetrievalQuery::new("Is the chapel empty?", 100))
            .await
            .unwrap();
        assert_eq!(snippets, vec!["The chapel bell is cracked.".to_string()]);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(InMemoryRetriever::load_jsonl(Path::new("/nonexistent/memories.jsonl")).is_err());
    }
}
