//! Retriever trait: long-term memory lookup for prompt augmentation.
//!
//! How memories are scored and stored is the backend's business. The engine
//! only asks for snippets relevant to a query, within a token budget, and
//! embeds whatever comes back as opaque text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExternalCallError;

/// A memory lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// The query text (usually recent scene lines)
    pub text: String,

    /// Token ceiling for the returned snippets; backends may overshoot and
    /// the composer trims
    pub budget: usize,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, budget: usize) -> Self {
        Self {
            text: text.into(),
            budget,
        }
    }
}

/// The memory / RAG backend.
///
/// Implementations: no-op and in-memory keyword search (see `talewright-memory`).
#[async_trait]
pub trait Retriever: Send + Sync {
    /// The backend name (e.g., "none", "in_memory").
    fn name(&self) -> &str;

    /// Snippets relevant to the query, most relevant first.
    async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError>;
}
