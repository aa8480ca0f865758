//! Core trait definitions

use crate::error::DelveResult;
use crate::types::*;
use async_trait::async_trait;

/// Language model collaborator
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Run one completion and return the raw response text.
    ///
    /// Failures are reported as `DelveError::Llm` with the matching kind.
    async fn complete(&self, request: CompletionRequest) -> DelveResult<String>;

    /// Short identifier for logs, e.g. `openai/gpt-4o-mini`
    fn describe(&self) -> String {
        "llm".to_string()
    }
}

/// Web search + scrape collaborator
#[async_trait]
pub trait SearchClient: Send + Sync {
    /// Search and return up to `max_results` pages with their content
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>>;
}
