//! Query planning for one research node

use crate::dedup::normalize;
use crate::prompts;
use crate::types::Query;
use crate::{ResearchError, StepResult};
use delve_clients::complete_structured;
use delve_core::{retry_async, validation_error, LanguageModel, RetryConfig};
use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct PlannedQueries {
    /// Search queries, most information-dense first
    queries: Vec<Query>,
}

/// Planner that turns a goal context into the next search queries
pub struct QueryPlanner {
    model: Arc<dyn LanguageModel>,
    retry: RetryConfig,
    system_prompt: String,
}

impl QueryPlanner {
    /// `retry.max_attempts` bounds attempts per plan
    pub fn new(model: Arc<dyn LanguageModel>, retry: RetryConfig) -> Self {
        Self {
            model,
            retry,
            system_prompt: prompts::system_prompt(),
        }
    }

    /// Plan at most `breadth` queries for `goal_context`.
    ///
    /// The result has no two entries equal after normalization and keeps the
    /// model's priority order. `existing_queries` are only shown to the model;
    /// filtering against them is up to the caller.
    pub async fn plan(
        &self,
        goal_context: &str,
        breadth: usize,
        existing_queries: &[String],
    ) -> StepResult<Vec<Query>> {
        if breadth == 0 {
            return Err(validation_error!("breadth must be at least 1", "breadth", "query_planner").into());
        }

        let prompt = prompts::plan_prompt(goal_context, breadth, existing_queries);
        let model = self.model.as_ref();
        let system = self.system_prompt.as_str();
        let prompt = prompt.as_str();
        let attempts = AtomicUsize::new(0);
        let attempts_ref = &attempts;

        let planned = retry_async(
            move |attempt| async move {
                attempts_ref.store(attempt, Ordering::Relaxed);
                complete_structured::<PlannedQueries>(model, Some(system), prompt).await
            },
            &self.retry,
            "plan_queries",
        )
        .await
        .map_err(|e| ResearchError::PlanningFailure {
            attempts: attempts.load(Ordering::Relaxed),
            message: e.to_string(),
        })?;

        let queries = dedup_queries(planned.queries, breadth);

        info!(
            breadth = breadth,
            planned = queries.len(),
            "Planned research queries"
        );
        for query in &queries {
            debug!(query = %query.query, goal = %query.research_goal, "Planned query");
        }

        Ok(queries)
    }
}

/// Drop blank and normalized-duplicate queries, then cap at `breadth`
fn dedup_queries(queries: Vec<Query>, breadth: usize) -> Vec<Query> {
    let mut seen = HashSet::new();
    queries
        .into_iter()
        .filter_map(|query| {
            let key = normalize(&query.query);
            if key.is_empty() || !seen.insert(key) {
                return None;
            }
            Some(Query::new(query.query.trim(), query.research_goal.trim()))
        })
        .take(breadth)
        .collect()
}
