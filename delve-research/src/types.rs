//! Types for the research tree

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The user's topic plus the clarifications gathered before the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchGoal {
    pub topic: String,
    pub clarifications: Vec<Clarification>,
}

/// One clarifying question and the user's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clarification {
    pub question: String,
    pub answer: String,
}

impl ResearchGoal {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            clarifications: Vec::new(),
        }
    }

    pub fn with_clarifications(mut self, clarifications: Vec<Clarification>) -> Self {
        self.clarifications = clarifications;
        self
    }

    /// Combined text used as the root planning context
    pub fn prompt_text(&self) -> String {
        let mut text = format!("Initial query: {}\n", self.topic.trim());
        for (i, clarification) in self.clarifications.iter().enumerate() {
            text.push_str(&format!(
                "\n{}. Question: {}\n   Answer: {}\n",
                i + 1,
                clarification.question.trim(),
                clarification.answer.trim()
            ));
        }
        text
    }
}

/// A search string with the goal it serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Query {
    /// The search engine query
    pub query: String,
    /// What this query is meant to find out and how to continue afterwards
    pub research_goal: String,
}

impl Query {
    pub fn new(query: impl Into<String>, research_goal: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            research_goal: research_goal.into(),
        }
    }
}

/// An atomic factual statement with the URLs that support it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learning {
    pub text: String,
    /// Unique, in discovery order
    pub sources: Vec<String>,
}

impl Learning {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: vec![source.into()],
        }
    }
}

/// Lifecycle of a node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Planning,
    Fetching,
    Extracting,
    Recursing,
    Merged,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Planning => write!(f, "planning"),
            NodeState::Fetching => write!(f, "fetching"),
            NodeState::Extracting => write!(f, "extracting"),
            NodeState::Recursing => write!(f, "recursing"),
            NodeState::Merged => write!(f, "merged"),
        }
    }
}

/// One unit of recursive work.
///
/// A node plans up to `breadth_remaining` queries from `context` and fetches
/// each of them. Its `path` is the index path of the query that spawned it;
/// the root has the empty path.
#[derive(Debug, Clone)]
pub struct ResearchNode {
    pub path: Vec<usize>,
    pub query: Query,
    pub context: String,
    pub depth_remaining: usize,
    pub breadth_remaining: usize,
    pub state: NodeState,
}

impl ResearchNode {
    /// Root node for a goal
    pub fn root(goal: &ResearchGoal, breadth: usize, depth: usize) -> Self {
        let context = goal.prompt_text();
        Self {
            path: Vec::new(),
            query: Query::new(goal.topic.trim(), context.clone()),
            context,
            depth_remaining: depth,
            breadth_remaining: breadth.max(1),
            state: NodeState::Planning,
        }
    }

    /// Depth-0 nodes fetch their own query instead of planning
    pub fn is_leaf(&self) -> bool {
        self.depth_remaining == 0
    }

    pub fn advance(&mut self, next: NodeState) {
        tracing::trace!(path = ?self.path, from = %self.state, to = %next, "Node state change");
        self.state = next;
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped at the root; only finished query units are included
    Cancelled,
}

/// Counters collected over a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchStats {
    pub nodes_planned: usize,
    pub planning_failures: usize,
    pub queries_executed: usize,
    pub duplicate_queries_skipped: usize,
    pub search_calls: usize,
    pub search_failures: usize,
    pub pages_extracted: usize,
    pub extraction_failures: usize,
    /// Query units run at nodes with no levels left below them
    pub leaf_fetches: usize,
}

impl ResearchStats {
    pub fn absorb(&mut self, other: &ResearchStats) {
        self.nodes_planned += other.nodes_planned;
        self.planning_failures += other.planning_failures;
        self.queries_executed += other.queries_executed;
        self.duplicate_queries_skipped += other.duplicate_queries_skipped;
        self.search_calls += other.search_calls;
        self.search_failures += other.search_failures;
        self.pages_extracted += other.pages_extracted;
        self.extraction_failures += other.extraction_failures;
        self.leaf_fetches += other.leaf_fetches;
    }
}

/// Root aggregate handed to the report synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchResult {
    /// Deduplicated, in depth-first discovery order
    pub learnings: Vec<Learning>,
    /// Every fetched URL, deduplicated, in discovery order
    pub sources: Vec<String>,
    /// Executed queries in the same order
    pub queries: Vec<Query>,
    pub stats: ResearchStats,
    pub status: RunStatus,
}

impl ResearchResult {
    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    LevelStarted {
        level: usize,
        nodes: usize,
    },
    QueryCompleted {
        query: String,
        depth_remaining: usize,
        pages: usize,
        learnings: usize,
    },
    QueryFailed {
        query: String,
        message: String,
    },
    LevelFinished {
        level: usize,
        queries: usize,
        learnings: usize,
    },
}
