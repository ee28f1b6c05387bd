//! Manual-corpus retrieval traits.

use async_trait::async_trait;

use crate::error::Result;

/// Retrieves repair-manual passages relevant to a query.
#[async_trait]
pub trait ManualRetriever: Send + Sync {
    /// Ordered passages, best match first. An empty corpus yields an empty
    /// list, not an error.
    async fn retrieve(&self, query: &str, category: Option<&str>, limit: usize) -> Result<Vec<String>>;
}
