//! Configuration management

use crate::error::{DelveError, DelveResult, ErrorContext};
use crate::types::*;

use std::path::{Path, PathBuf};

impl Default for DelveConfig {
    fn default() -> Self {
        Self {
            research: ResearchSettings::default(),
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            output: OutputConfig::default(),
            retry: crate::RetryConfig::default(),
            logging: crate::LoggingConfig::default(),
        }
    }
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            breadth: 4,
            depth: 2,
            search_rate_limit_per_minute: 60,
            fetch_concurrency: 2,
            extraction_concurrency: 4,
            max_page_chars: 25_000,
            max_learnings_per_page: 3,
            max_follow_ups_per_page: 3,
            results_per_query: 5,
            breadth_policy: BreadthPolicy::EvenSplit,
            planner_attempts: 3,
            extraction_attempts: 2,
            synthesis_attempts: 2,
            search_attempts: 3,
            llm_timeout_secs: 120,
            search_timeout_secs: 60,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
            temperature: 0.7,
            max_tokens: Some(8192),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.firecrawl.dev".to_string(),
            api_key: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "output".to_string(),
            report_file: "report.md".to_string(),
            max_clarifying_questions: 3,
        }
    }
}

impl DelveConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> DelveResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DelveError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        let config: DelveConfig = toml::from_str(&content).map_err(|e| DelveError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> DelveResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| DelveError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| DelveError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Candidate config locations, most specific first
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("delve").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".delve").join("config.toml"));
        }
        paths.push(PathBuf::from("delve.toml"));
        paths
    }

    /// Validate configuration
    pub fn validate(&self) -> DelveResult<()> {
        let research = &self.research;
        let checks: [(bool, &str, &str); 9] = [
            (research.breadth == 0, "research.breadth", "Breadth must be at least 1"),
            (
                research.search_rate_limit_per_minute == 0,
                "research.search_rate_limit_per_minute",
                "Search rate limit must be greater than 0",
            ),
            (
                research.fetch_concurrency == 0,
                "research.fetch_concurrency",
                "Fetch concurrency must be greater than 0",
            ),
            (
                research.extraction_concurrency == 0,
                "research.extraction_concurrency",
                "Extraction concurrency must be greater than 0",
            ),
            (
                research.max_page_chars == 0,
                "research.max_page_chars",
                "Page character budget must be greater than 0",
            ),
            (
                research.max_learnings_per_page == 0,
                "research.max_learnings_per_page",
                "Learnings per page must be greater than 0",
            ),
            (
                research.results_per_query == 0,
                "research.results_per_query",
                "At least one search result per query is required",
            ),
            (
                research.llm_timeout_secs == 0,
                "research.llm_timeout_secs",
                "LLM timeout must be greater than 0",
            ),
            (
                research.search_timeout_secs == 0,
                "research.search_timeout_secs",
                "Search timeout must be greater than 0",
            ),
        ];

        for (failed, field, message) in checks {
            if failed {
                return Err(DelveError::Config {
                    message: message.to_string(),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_metadata("field", field)
                        .with_suggestion(&format!("Set {} to a positive value", field)),
                });
            }
        }

        Ok(())
    }
}
