//! Core data type definitions

use crate::async_utils::RetryConfig;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DelveConfig {
    pub research: ResearchSettings,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub output: OutputConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Budgets and limits for one research run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Maximum sibling queries per level
    pub breadth: usize,
    /// Recursive levels below the root
    pub depth: usize,
    /// Search calls allowed to start per rolling minute
    pub search_rate_limit_per_minute: usize,
    /// Outstanding search calls allowed at once
    pub fetch_concurrency: usize,
    /// Concurrent page extractions per node
    pub extraction_concurrency: usize,
    /// Page content is truncated to this many characters before extraction
    pub max_page_chars: usize,
    pub max_learnings_per_page: usize,
    pub max_follow_ups_per_page: usize,
    /// Pages requested per search (top-K)
    pub results_per_query: usize,
    /// How a node's breadth is apportioned to its children
    pub breadth_policy: BreadthPolicy,
    pub planner_attempts: usize,
    pub extraction_attempts: usize,
    pub synthesis_attempts: usize,
    pub search_attempts: usize,
    pub llm_timeout_secs: u64,
    /// Deadline for one search call, shared by the HTTP client and the backend
    pub search_timeout_secs: u64,
}

/// Breadth apportioning policy for child nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreadthPolicy {
    /// floor(breadth / children), at least 1
    EvenSplit,
    /// ceil(breadth / 2)
    Halve,
    /// Children keep the parent's breadth
    Constant,
}

impl BreadthPolicy {
    /// Breadth handed to each of `children` child nodes of a node with `breadth`
    pub fn child_breadth(&self, breadth: usize, children: usize) -> usize {
        if children == 0 {
            return 0;
        }
        let breadth = breadth.max(1);
        match self {
            BreadthPolicy::EvenSplit => (breadth / children).max(1),
            BreadthPolicy::Halve => breadth.div_ceil(2),
            BreadthPolicy::Constant => breadth,
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider type (openai, anthropic, ollama, groq)
    pub provider: String,
    /// Model name
    pub model: String,
    /// API key (optional, can be set via environment)
    pub api_key: Option<String>,
    /// Base URL for custom providers
    pub base_url: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
}

/// Search and scrape backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    /// API key (optional, can be set via FIRECRAWL_API_KEY)
    pub api_key: Option<String>,
}

/// Where and how the final artifacts are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
    pub report_file: String,
    pub max_clarifying_questions: usize,
}

/// One page returned by the search collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: Option<String>,
    /// Raw or extracted page text; may be empty
    pub content: String,
}

/// A single completion call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System message, if any
    pub system: Option<String>,
    pub prompt: String,
    /// JSON schema the response must follow
    pub response_schema: Option<serde_json::Value>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            response_schema: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn even_split_floors_with_minimum_one() {
        let policy = BreadthPolicy::EvenSplit;
        assert_eq!(policy.child_breadth(4, 2), 2);
        assert_eq!(policy.child_breadth(5, 2), 2);
        assert_eq!(policy.child_breadth(2, 3), 1);
        assert_eq!(policy.child_breadth(4, 0), 0);
    }

    #[test]
    fn child_breadth_never_grows() {
        for policy in [
            BreadthPolicy::EvenSplit,
            BreadthPolicy::Halve,
            BreadthPolicy::Constant,
        ] {
            for breadth in 1..8 {
                for children in 1..8 {
                    let child = policy.child_breadth(breadth, children);
                    assert!(child >= 1 && child <= breadth, "{:?}", policy);
                }
            }
        }
    }

    #[test]
    fn halve_rounds_up() {
        assert_eq!(BreadthPolicy::Halve.child_breadth(3, 3), 2);
        assert_eq!(BreadthPolicy::Halve.child_breadth(1, 1), 1);
    }
}
