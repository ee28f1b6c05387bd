//! Mock implementations of core traits for testing.
//!
//! Shared by the unit tests of every crate and by the integration tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::{
    error::ProviderError,
    traits::{InferenceProvider, ManualRetriever},
    types::InferenceRequest,
    Error, Result,
};

// =============================================================================
// Scripted Provider
// =============================================================================

type Reply = std::result::Result<String, ProviderError>;

/// Provider that replays a queue of scripted replies in order.
///
/// Once the queue is drained the fallback reply is returned, or a terminal
/// error when none was configured.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedProvider {
    /// Create a provider with a queue of replies.
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns the same text on every call.
    pub fn constant(text: impl Into<String>) -> Self {
        Self::new(Vec::new()).with_fallback(Ok(text.into()))
    }

    /// Create a provider from successful JSON replies.
    pub fn json(replies: Vec<serde_json::Value>) -> Self {
        Self::new(replies.into_iter().map(|v| Ok(v.to_string())).collect())
    }

    /// Reply used once the queue is empty.
    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = Some(reply);
        self
    }

    /// Number of remote attempts made.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests received, in order.
    pub fn requests(&self) -> Vec<InferenceRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &InferenceRequest) -> Reply {
        self.requests.lock().unwrap().push(request.clone());

        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => reply,
            None => self
                .fallback
                .clone()
                .unwrap_or_else(|| Err(ProviderError::new("scripted provider exhausted"))),
        }
    }
}

// =============================================================================
// Manual Retrievers
// =============================================================================

/// Retriever returning a fixed passage list and recording queries.
#[derive(Default)]
pub struct StaticRetriever {
    passages: Vec<String>,
    queries: Mutex<Vec<(String, Option<String>)>>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<String>) -> Self {
        Self {
            passages,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Queries received as `(query, category)`.
    pub fn queries(&self) -> Vec<(String, Option<String>)> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl ManualRetriever for StaticRetriever {
    async fn retrieve(&self, query: &str, category: Option<&str>, limit: usize) -> Result<Vec<String>> {
        self.queries
            .lock()
            .unwrap()
            .push((query.to_string(), category.map(str::to_string)));
        Ok(self.passages.iter().take(limit).cloned().collect())
    }
}

/// Retriever whose backing store is always unavailable.
pub struct FailingRetriever;

#[async_trait]
impl ManualRetriever for FailingRetriever {
    async fn retrieve(&self, _query: &str, _category: Option<&str>, _limit: usize) -> Result<Vec<String>> {
        Err(Error::internal("manual index unavailable"))
    }
}
