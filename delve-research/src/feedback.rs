//! Clarifying questions asked before a run starts

use crate::prompts;
use delve_clients::complete_structured;
use delve_core::{retry_async, LanguageModel, RetryConfig};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ClarifyingQuestions {
    /// Questions that would narrow down the research direction
    questions: Vec<String>,
}

pub struct ClarificationPlanner {
    model: Arc<dyn LanguageModel>,
    retry: RetryConfig,
    system_prompt: String,
}

impl ClarificationPlanner {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryConfig) -> Self {
        Self {
            model,
            retry,
            system_prompt: prompts::system_prompt(),
        }
    }

    /// Up to `max_questions` clarifying questions for `topic`.
    ///
    /// Failures are logged and yield no questions; the session then continues
    /// with the bare topic.
    pub async fn generate(&self, topic: &str, max_questions: usize) -> Vec<String> {
        if max_questions == 0 || topic.trim().is_empty() {
            return Vec::new();
        }

        let prompt = prompts::feedback_prompt(topic, max_questions);
        let model = self.model.as_ref();
        let system = self.system_prompt.as_str();
        let prompt = prompt.as_str();

        let response = retry_async(
            move |_| async move {
                complete_structured::<ClarifyingQuestions>(model, Some(system), prompt).await
            },
            &self.retry,
            "clarifying_questions",
        )
        .await;

        match response {
            Ok(response) => {
                let questions: Vec<String> = response
                    .questions
                    .into_iter()
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .take(max_questions)
                    .collect();
                debug!(count = questions.len(), "Generated clarifying questions");
                questions
            }
            Err(e) => {
                warn!(error = %e, "Could not generate clarifying questions");
                Vec::new()
            }
        }
    }
}
