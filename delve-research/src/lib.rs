//! Delve Research - recursive research orchestration
//!
//! A run expands a tree of search queries level by level:
//! - [`QueryPlanner`] proposes the next queries for a node
//! - [`LearningExtractor`] turns each fetched page into learnings and follow-ups
//! - [`ResearchOrchestrator`] drives the expansion under the shared search limiter
//! - [`ReportSynthesizer`] writes the final report from the merged aggregate

pub mod dedup;
pub mod extractor;
pub mod feedback;
pub mod orchestrator;
pub mod planner;
pub mod prompts;
pub mod storage;
pub mod synthesizer;
pub mod types;

pub use dedup::{normalize, Findings, LearningSet, QueryLedger, SourceSet};
pub use extractor::{ExtractionLimits, LearningExtractor, PageFindings};
pub use feedback::ClarificationPlanner;
pub use orchestrator::ResearchOrchestrator;
pub use planner::QueryPlanner;
pub use storage::{ReportStore, SavedReport};
pub use synthesizer::ReportSynthesizer;
pub use types::*;

use delve_core::DelveError;

/// Research step error types
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Core error: {0}")]
    Core(#[from] DelveError),

    #[error("Query planning failed after {attempts} attempt(s): {message}")]
    PlanningFailure { attempts: usize, message: String },

    #[error("Learning extraction failed for {url}: {message}")]
    ExtractionFailure { url: String, message: String },

    /// The only failure that ends a run; the aggregate is kept for fallback output
    #[error("Report synthesis failed: {message}")]
    SynthesisFailure {
        message: String,
        result: Box<ResearchResult>,
    },
}

pub type StepResult<T> = Result<T, ResearchError>;

impl ResearchError {
    /// Research aggregate carried by a synthesis failure
    pub fn research_result(&self) -> Option<&ResearchResult> {
        match self {
            ResearchError::SynthesisFailure { result, .. } => Some(result),
            _ => None,
        }
    }
}
