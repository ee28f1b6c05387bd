//! Inference provider traits.

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::InferenceRequest;

/// Remote vision-capable inference provider.
///
/// Implementations perform exactly one remote attempt per call. Caching,
/// admission, retry and output recovery belong to the gateway.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Send the request and return the raw response text.
    async fn generate(&self, request: &InferenceRequest) -> std::result::Result<String, ProviderError>;
}
