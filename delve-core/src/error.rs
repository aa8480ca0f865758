//! Unified error handling system
//!
//! Provides structured error types with context, recovery suggestions, and proper error chaining

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type DelveResult<T> = Result<T, DelveError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Failure kinds reported by a language model collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LlmErrorKind {
    /// Provider rejected the call because of a rate limit
    RateLimited,
    /// The call did not finish in time
    Timeout,
    /// The response did not match the expected shape
    InvalidResponse,
    /// Connection or provider-side failure
    Transport,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmErrorKind::RateLimited => write!(f, "rate limited"),
            LlmErrorKind::Timeout => write!(f, "timeout"),
            LlmErrorKind::InvalidResponse => write!(f, "invalid response"),
            LlmErrorKind::Transport => write!(f, "transport"),
        }
    }
}

/// Main error type for delve
#[derive(Error, Debug)]
pub enum DelveError {
    #[error("LLM error ({kind}): {message}")]
    Llm {
        kind: LlmErrorKind,
        message: String,
        provider: Option<String>,
        context: ErrorContext,
    },

    #[error("Search error: {message}")]
    Search {
        message: String,
        /// Whether the search backend signalled a rate limit
        rate_limited: bool,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        context: ErrorContext,
    },

    #[error("Operation timeout: {operation}")]
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },
}

impl DelveError {
    /// Build an LLM error of the given kind
    pub fn llm(kind: LlmErrorKind, message: impl Into<String>, component: &str) -> Self {
        DelveError::Llm {
            kind,
            message: message.into(),
            provider: None,
            context: ErrorContext::new(component),
        }
    }

    /// Shorthand for a response that did not match the expected shape
    pub fn invalid_response(message: impl Into<String>, component: &str) -> Self {
        Self::llm(LlmErrorKind::InvalidResponse, message, component)
    }

    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            DelveError::Llm { context, .. } => Some(context),
            DelveError::Search { context, .. } => Some(context),
            DelveError::Config { context, .. } => Some(context),
            DelveError::Validation { context, .. } => Some(context),
            DelveError::Timeout { context, .. } => Some(context),
            DelveError::Internal { context, .. } => Some(context),
            _ => None,
        }
    }

    /// The LLM failure kind, if this is an LLM error
    pub fn llm_kind(&self) -> Option<LlmErrorKind> {
        match self {
            DelveError::Llm { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            DelveError::Llm { .. } => true,
            DelveError::Search { .. } => true,
            DelveError::Timeout { .. } => true,
            DelveError::Config { .. } => false,
            DelveError::Validation { .. } => false,
            DelveError::Cancelled { .. } => false,
            _ => false,
        }
    }

    /// Get retry delay in milliseconds for recoverable errors
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DelveError::Llm {
                kind: LlmErrorKind::RateLimited,
                ..
            } => Some(5000),
            DelveError::Llm { .. } => Some(1000),
            DelveError::Search {
                rate_limited: true, ..
            } => Some(5000),
            DelveError::Search { .. } => Some(1000),
            DelveError::Timeout { .. } => Some(2000),
            _ => None,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            DelveError::Internal { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Internal error occurred"
                );
            }
            DelveError::Config { .. } | DelveError::Validation { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration or validation error"
                );
            }
            DelveError::Llm { .. } | DelveError::Search { .. } | DelveError::Timeout { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Collaborator error (may be recoverable)"
                );
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! search_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Search {
            message: $msg.to_string(),
            rate_limited: false,
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::DelveError::Search {
            message: $msg.to_string(),
            rate_limited: false,
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}

#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::DelveError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check your configuration file")
                .with_suggestion("Run 'delve config --init' to create default config"),
        }
    };
}

#[macro_export]
macro_rules! validation_error {
    ($msg:expr, $field:expr, $component:expr) => {
        $crate::DelveError::Validation {
            message: $msg.to_string(),
            field: Some($field.to_string()),
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the field value and format"),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_kinds_are_recoverable() {
        for kind in [
            LlmErrorKind::RateLimited,
            LlmErrorKind::Timeout,
            LlmErrorKind::InvalidResponse,
            LlmErrorKind::Transport,
        ] {
            let error = DelveError::llm(kind, "boom", "test");
            assert!(error.is_recoverable());
            assert_eq!(error.llm_kind(), Some(kind));
            assert!(error.retry_delay_ms().is_some());
        }
    }

    #[test]
    fn test_config_and_cancel_are_fatal() {
        let error = config_error!("bad breadth", "test");
        assert!(!error.is_recoverable());
        assert!(error.retry_delay_ms().is_none());

        let cancelled = DelveError::Cancelled {
            operation: "search".to_string(),
        };
        assert!(!cancelled.is_recoverable());
        assert!(cancelled.context().is_none());
    }

    #[test]
    fn test_rate_limited_search_waits_longer() {
        let mut error = search_error!("429", "test");
        assert_eq!(error.retry_delay_ms(), Some(1000));
        if let DelveError::Search { rate_limited, .. } = &mut error {
            *rate_limited = true;
        }
        assert_eq!(error.retry_delay_ms(), Some(5000));
    }
}
