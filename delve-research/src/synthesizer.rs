//! Research synthesis and report compilation

use crate::prompts;
use crate::types::{ResearchGoal, ResearchResult};
use crate::{ResearchError, StepResult};
use delve_clients::complete_structured;
use delve_core::{retry_async, LanguageModel, RetryConfig};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct ReportDraft {
    /// Final report on the topic in Markdown
    report_markdown: String,
}

/// Research synthesizer that compiles the aggregate into a Markdown report
pub struct ReportSynthesizer {
    model: Arc<dyn LanguageModel>,
    retry: RetryConfig,
    system_prompt: String,
}

impl ReportSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryConfig) -> Self {
        Self {
            model,
            retry,
            system_prompt: prompts::system_prompt(),
        }
    }

    /// Write the final report and append the source list.
    ///
    /// The whole aggregate goes into one prompt; callers that expect it to
    /// exceed the model's context must trim `result` first. On failure the
    /// error carries `result` so raw learnings can still be shown.
    pub async fn synthesize(
        &self,
        goal: &ResearchGoal,
        result: &ResearchResult,
    ) -> StepResult<String> {
        info!(
            topic = %goal.topic,
            learnings = result.learnings.len(),
            sources = result.sources.len(),
            "Writing final report"
        );

        let prompt = prompts::report_prompt(goal, &result.learnings);
        let model = self.model.as_ref();
        let system = self.system_prompt.as_str();
        let prompt = prompt.as_str();

        let draft = retry_async(
            move |_| async move {
                complete_structured::<ReportDraft>(model, Some(system), prompt).await
            },
            &self.retry,
            "synthesize_report",
        )
        .await;

        match draft {
            Ok(draft) if !draft.report_markdown.trim().is_empty() => {
                let mut report = draft.report_markdown.trim_end().to_string();
                report.push_str("\n\n");
                report.push_str(&sources_section(&result.sources));
                Ok(report)
            }
            Ok(_) => Err(synthesis_failure("model returned an empty report", result)),
            Err(e) => {
                warn!(error = %e, "Report synthesis failed");
                Err(synthesis_failure(&e.to_string(), result))
            }
        }
    }

    /// Raw learning list used when synthesis fails
    pub fn fallback_report(goal: &ResearchGoal, result: &ResearchResult) -> String {
        let mut report = format!("# Research notes: {}\n\n", goal.topic.trim());
        report.push_str(
            "_The final report could not be written; these are the raw learnings gathered during research._\n\n",
        );

        report.push_str("## Learnings\n\n");
        if result.learnings.is_empty() {
            report.push_str("No learnings were collected.\n");
        }
        for learning in &result.learnings {
            report.push_str(&format!("- {}", learning.text));
            if !learning.sources.is_empty() {
                report.push_str(&format!(" ({})", learning.sources.join(", ")));
            }
            report.push('\n');
        }

        report.push('\n');
        report.push_str(&sources_section(&result.sources));
        report
    }
}

fn sources_section(sources: &[String]) -> String {
    let mut section = String::from("## Sources\n\n");
    for url in sources {
        section.push_str(&format!("- {}\n", url));
    }
    section
}

fn synthesis_failure(message: &str, result: &ResearchResult) -> ResearchError {
    ResearchError::SynthesisFailure {
        message: message.to_string(),
        result: Box::new(result.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Learning, ResearchStats, RunStatus};

    fn sample_result() -> ResearchResult {
        ResearchResult {
            learnings: vec![Learning {
                text: "Caffeine half-life is about 5 hours".to_string(),
                sources: vec![
                    "https://a.example".to_string(),
                    "https://b.example".to_string(),
                ],
            }],
            sources: vec![
                "https://a.example".to_string(),
                "https://b.example".to_string(),
            ],
            queries: Vec::new(),
            stats: ResearchStats::default(),
            status: RunStatus::Completed,
        }
    }

    #[test]
    fn fallback_lists_learnings_and_sources() {
        let goal = ResearchGoal::new("effects of caffeine on sleep");
        let report = ReportSynthesizer::fallback_report(&goal, &sample_result());

        assert!(report.starts_with("# Research notes: effects of caffeine on sleep"));
        assert!(report.contains(
            "- Caffeine half-life is about 5 hours (https://a.example, https://b.example)"
        ));
        assert!(report.ends_with("## Sources\n\n- https://a.example\n- https://b.example\n"));
    }

    #[test]
    fn fallback_handles_empty_result() {
        let goal = ResearchGoal::new("nothing found");
        let mut result = sample_result();
        result.learnings.clear();
        result.sources.clear();

        let report = ReportSynthesizer::fallback_report(&goal, &result);
        assert!(report.contains("No learnings were collected."));
    }
}
