//! Learning extraction from fetched pages

use crate::prompts;
use crate::types::{Learning, Query};
use crate::{ResearchError, StepResult};
use delve_clients::complete_structured;
use delve_core::{retry_async, LanguageModel, RetryConfig, SearchResult};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ExtractedLearnings {
    /// Self-contained factual statements taken from the page
    learnings: Vec<String>,
    /// Search queries worth running next
    follow_up_questions: Vec<String>,
}

/// Learnings and candidate follow-ups from a single page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageFindings {
    pub learnings: Vec<Learning>,
    /// Not yet deduplicated against the run's query ledger
    pub follow_up_queries: Vec<String>,
}

/// Limits applied to every page
#[derive(Debug, Clone, Copy)]
pub struct ExtractionLimits {
    pub max_page_chars: usize,
    pub max_learnings: usize,
    pub max_follow_ups: usize,
}

pub struct LearningExtractor {
    model: Arc<dyn LanguageModel>,
    retry: RetryConfig,
    limits: ExtractionLimits,
    system_prompt: String,
}

impl LearningExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryConfig, limits: ExtractionLimits) -> Self {
        Self {
            model,
            retry,
            limits,
            system_prompt: prompts::system_prompt(),
        }
    }

    /// Extract up to the configured number of learnings from `page`.
    ///
    /// Empty pages yield an empty result without calling the model.
    pub async fn extract(&self, query: &Query, page: &SearchResult) -> StepResult<PageFindings> {
        let content = truncate_chars(page.content.trim(), self.limits.max_page_chars);
        if content.is_empty() {
            debug!(url = %page.url, "Page has no content, skipping extraction");
            return Ok(PageFindings::default());
        }

        let prompt = prompts::extract_prompt(
            &query.query,
            content,
            self.limits.max_learnings,
            self.limits.max_follow_ups,
        );
        let model = self.model.as_ref();
        let system = self.system_prompt.as_str();
        let prompt = prompt.as_str();

        let extracted = retry_async(
            move |_| async move {
                complete_structured::<ExtractedLearnings>(model, Some(system), prompt).await
            },
            &self.retry,
            "extract_learnings",
        )
        .await
        .map_err(|e| ResearchError::ExtractionFailure {
            url: page.url.clone(),
            message: e.to_string(),
        })?;

        let learnings: Vec<Learning> = extracted
            .learnings
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .take(self.limits.max_learnings)
            .map(|text| Learning::new(text, page.url.as_str()))
            .collect();

        let follow_up_queries: Vec<String> = extracted
            .follow_up_questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .take(self.limits.max_follow_ups)
            .collect();

        debug!(
            url = %page.url,
            learnings = learnings.len(),
            follow_ups = follow_up_queries.len(),
            "Extracted learnings"
        );

        Ok(PageFindings {
            learnings,
            follow_up_queries,
        })
    }
}

/// First `max_chars` characters of `text`, cut on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("naïve café", 4), "naïv");
        assert_eq!(truncate_chars("short", 100), "short");
        assert_eq!(truncate_chars("abc", 0), "");
    }
}
