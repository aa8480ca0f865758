//! LLM client integration using siumai
//!
//! This module provides a unified interface for interacting with various
//! LLM providers through the siumai framework.

use async_trait::async_trait;
use delve_core::{
    config_error, with_timeout, CompletionRequest, DelveError, DelveResult, ErrorContext,
    LanguageModel, LlmConfig, LlmErrorKind,
};
use siumai::prelude::*;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Unified LLM client that supports multiple providers
pub struct DelveLlmClient {
    client: Box<dyn LlmClient>,
    config: LlmConfig,
    timeout_ms: u64,
}

impl DelveLlmClient {
    /// Create a new LLM client
    pub async fn new(config: LlmConfig, timeout_secs: u64) -> DelveResult<Self> {
        let client = Self::build_client(&config).await?;

        info!(
            "Created LLM client for provider: {} with model: {}",
            config.provider, config.model
        );

        Ok(Self {
            client,
            config,
            timeout_ms: timeout_secs.saturating_mul(1000),
        })
    }

    fn api_key(config: &LlmConfig, env_var: &str, provider: &str) -> DelveResult<String> {
        config
            .api_key
            .clone()
            .or_else(|| std::env::var(env_var).ok())
            .ok_or_else(|| config_error!(format!("{} API key not found (set {})", provider, env_var), "llm_client"))
    }

    /// Build the appropriate siumai client based on configuration
    async fn build_client(config: &LlmConfig) -> DelveResult<Box<dyn LlmClient>> {
        match config.provider.as_str() {
            "openai" => {
                let api_key = Self::api_key(config, "OPENAI_API_KEY", "OpenAI")?;

                let mut builder = LlmBuilder::new()
                    .openai()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                if let Some(base_url) = &config.base_url {
                    builder = builder.base_url(base_url);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error("OpenAI", e))?;

                Ok(Box::new(client))
            }
            "anthropic" => {
                let api_key = Self::api_key(config, "ANTHROPIC_API_KEY", "Anthropic")?;

                let mut builder = LlmBuilder::new()
                    .anthropic()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error("Anthropic", e))?;

                Ok(Box::new(client))
            }
            "ollama" => {
                let base_url = config
                    .base_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".to_string());

                let mut builder = LlmBuilder::new()
                    .ollama()
                    .model(&config.model)
                    .base_url(&base_url)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error("Ollama", e))?;

                Ok(Box::new(client))
            }
            "groq" => {
                let api_key = Self::api_key(config, "GROQ_API_KEY", "Groq")?;

                let mut builder = LlmBuilder::new()
                    .groq()
                    .api_key(&api_key)
                    .model(&config.model)
                    .temperature(config.temperature);

                if let Some(max_tokens) = config.max_tokens {
                    builder = builder.max_tokens(max_tokens);
                }

                let client = builder
                    .build()
                    .await
                    .map_err(|e| build_error("Groq", e))?;

                Ok(Box::new(client))
            }
            provider => Err(config_error!(
                format!("Unsupported LLM provider: {}", provider),
                "llm_client"
            )),
        }
    }

    /// Get the current configuration
    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Test the connection to the LLM provider
    pub async fn test_connection(&self) -> DelveResult<()> {
        debug!(
            "Testing connection to LLM provider: {}",
            self.config.provider
        );

        let request =
            CompletionRequest::new("Hello! Please respond with 'OK' to confirm the connection.");

        match self.complete(request).await {
            Ok(response) => {
                info!(
                    "Connection test successful. Response: {}",
                    response.chars().take(50).collect::<String>()
                );
                Ok(())
            }
            Err(e) => {
                warn!("Connection test failed: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LanguageModel for DelveLlmClient {
    async fn complete(&self, request: CompletionRequest) -> DelveResult<String> {
        let start_time = Instant::now();

        let prompt = match &request.response_schema {
            Some(schema) => with_schema_instructions(&request.prompt, schema)?,
            None => request.prompt.clone(),
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system_prompt) = &request.system {
            messages.push(system!(system_prompt.as_str()));
        }
        messages.push(user!(prompt.as_str()));

        debug!("Generating response with {} messages", messages.len());

        let response = with_timeout(self.client.chat(messages), self.timeout_ms, "llm_complete")
            .await
            .map_err(|_| {
                DelveError::llm(
                    LlmErrorKind::Timeout,
                    format!("No response within {} ms", self.timeout_ms),
                    "llm_client",
                )
            })?
            .map_err(|e| self.classify(e.to_string()))?;

        match response.content_text() {
            Some(content) => {
                info!(
                    "Generated response in {:?} ({} chars)",
                    start_time.elapsed(),
                    content.len()
                );
                Ok(content.to_string())
            }
            None => Err(DelveError::invalid_response(
                "No text content in LLM response",
                "llm_client",
            )),
        }
    }

    fn describe(&self) -> String {
        format!("{}/{}", self.config.provider, self.config.model)
    }
}

impl DelveLlmClient {
    fn classify(&self, message: String) -> DelveError {
        DelveError::Llm {
            kind: classify_provider_error(&message),
            message: format!("LLM generation failed: {}", message),
            provider: Some(self.config.provider.clone()),
            context: ErrorContext::new("llm_client").with_operation("complete"),
        }
    }
}

fn build_error(provider: &str, error: impl std::fmt::Display) -> DelveError {
    DelveError::Config {
        message: format!("Failed to build {} client: {}", provider, error),
        source: None,
        context: ErrorContext::new("llm_client")
            .with_operation("build_client")
            .with_suggestion("Check provider, model and API key settings"),
    }
}

/// Map a provider error message onto the failure kinds the pipeline retries on
pub fn classify_provider_error(message: &str) -> LlmErrorKind {
    let lowered = message.to_lowercase();
    if lowered.contains("rate limit") || lowered.contains("429") || lowered.contains("quota") {
        LlmErrorKind::RateLimited
    } else if lowered.contains("timeout") || lowered.contains("timed out") {
        LlmErrorKind::Timeout
    } else if lowered.contains("parse") || lowered.contains("deserializ") {
        LlmErrorKind::InvalidResponse
    } else {
        LlmErrorKind::Transport
    }
}

/// Append the JSON shape contract to a prompt
pub fn with_schema_instructions(prompt: &str, schema: &serde_json::Value) -> DelveResult<String> {
    let schema_str = serde_json::to_string_pretty(schema)?;
    Ok(format!(
        "{}\n\nRespond with JSON matching this JSON schema:\n{}\n\nReturn only valid JSON, without any explanation.",
        prompt, schema_str
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_kinds() {
        assert_eq!(
            classify_provider_error("HTTP 429 Too Many Requests"),
            LlmErrorKind::RateLimited
        );
        assert_eq!(
            classify_provider_error("request timed out after 30s"),
            LlmErrorKind::Timeout
        );
        assert_eq!(
            classify_provider_error("failed to parse response body"),
            LlmErrorKind::InvalidResponse
        );
        assert_eq!(
            classify_provider_error("connection refused"),
            LlmErrorKind::Transport
        );
    }

    #[test]
    fn schema_instructions_embed_schema() {
        let schema = serde_json::json!({"type": "object", "properties": {"queries": {"type": "array"}}});
        let prompt = with_schema_instructions("Plan queries", &schema).unwrap();
        assert!(prompt.starts_with("Plan queries"));
        assert!(prompt.contains("\"queries\""));
        assert!(prompt.contains("Return only valid JSON"));
    }

    #[tokio::test]
    async fn unknown_provider_is_a_config_error() {
        let config = LlmConfig {
            provider: "carrier-pigeon".to_string(),
            ..LlmConfig::default()
        };
        let result = DelveLlmClient::new(config, 10).await;
        assert!(matches!(result, Err(DelveError::Config { .. })));
    }
}
