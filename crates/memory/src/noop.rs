//! No-op retriever: disables long-term memory entirely.

use async_trait::async_trait;
use talewright_core::{ExternalCallError, RetrievalQuery, Retriever};

/// A retriever that never recalls anything.
pub struct NoopRetriever;

#[async_trait]
impl Retriever for NoopRetriever {
    fn name(&self) -> &str {
        "none"
    }

    async fn retrieve(&self, _query: &RetrievalQuery) -> Result<Vec<String>, ExternalCallError> {
        Ok(Vec::new())
    }
}
