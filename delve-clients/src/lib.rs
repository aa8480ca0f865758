//! Delve Clients - concrete collaborators for the research engine
//!
//! - [`DelveLlmClient`]: siumai-backed language model (openai, anthropic, ollama, groq)
//! - [`FirecrawlSearchClient`]: web search with per-hit markdown scraping
//! - [`structured`]: JSON-shaped completions validated against a fixed field set

pub mod llm_client;
pub mod search_client;
pub mod structured;

pub use llm_client::{classify_provider_error, DelveLlmClient};
pub use search_client::FirecrawlSearchClient;
pub use structured::{complete_structured, extract_json_block, parse_structured};
