//! Research orchestration
//!
//! The tree is expanded one level at a time over an explicit frontier:
//!
//! 1. every frontier node plans concurrently against a read-only view of the
//!    query ledger;
//! 2. plans are merged into the ledger in frontier (path) order, which is the
//!    only place the ledger changes;
//! 3. every accepted query is searched and its pages extracted;
//! 4. finished queries with levels left below them become the next frontier.
//!
//! Query outcomes are keyed by index path. Paths sort in depth-first
//! pre-order, so the final merge is independent of completion timing.

use crate::dedup::{normalize, Findings, QueryLedger};
use crate::extractor::{ExtractionLimits, LearningExtractor};
use crate::planner::QueryPlanner;
use crate::prompts;
use crate::types::*;
use delve_core::{
    log_operation_start, log_operation_success, retry_async, with_timeout, DelveResult,
    LanguageModel, ResearchSettings, RetryConfig, SearchClient, SearchLimiter, SearchResult,
};
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of the planning step for one node
enum Plan {
    /// Depth-0 node: fetch the node's own query
    Leaf,
    Queries(Vec<Query>),
    Failed,
}

/// A query accepted into the ledger, waiting to be fetched
struct PendingQuery {
    path: Vec<usize>,
    query: Query,
    /// Index of the owning node in the current frontier
    node: usize,
}

/// Everything one query unit (search plus page extraction) produced
struct QueryOutcome {
    query: Query,
    findings: Findings,
    follow_ups: Vec<String>,
    /// False when the search itself failed after all retries
    searched: bool,
    stats: ResearchStats,
}

/// Drives a research run from the root goal to the merged aggregate
pub struct ResearchOrchestrator {
    planner: QueryPlanner,
    extractor: LearningExtractor,
    search: Arc<dyn SearchClient>,
    limiter: Arc<SearchLimiter>,
    settings: ResearchSettings,
    search_retry: RetryConfig,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ResearchOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchClient>,
        settings: ResearchSettings,
        retry: &RetryConfig,
    ) -> Self {
        let planner = QueryPlanner::new(model.clone(), retry.with_attempts(settings.planner_attempts));
        let extractor = LearningExtractor::new(
            model,
            retry.with_attempts(settings.extraction_attempts),
            ExtractionLimits {
                max_page_chars: settings.max_page_chars,
                max_learnings: settings.max_learnings_per_page,
                max_follow_ups: settings.max_follow_ups_per_page,
            },
        );
        let limiter = Arc::new(SearchLimiter::new(
            settings.fetch_concurrency,
            settings.search_rate_limit_per_minute,
        ));

        Self {
            planner,
            extractor,
            search,
            limiter,
            search_retry: retry.with_attempts(settings.search_attempts),
            settings,
            progress: None,
        }
    }

    /// Share a limiter with other users of the same search backend
    pub fn with_limiter(mut self, limiter: Arc<SearchLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Run the whole research tree for `goal`.
    ///
    /// Collaborator failures never fail the run; they shrink it. Cancelling
    /// `cancel` stops the run at the next suspension point and returns the
    /// query units that had already finished.
    pub async fn run(&self, goal: &ResearchGoal, cancel: &CancellationToken) -> ResearchResult {
        log_operation_start!(
            "research_run",
            breadth = self.settings.breadth,
            depth = self.settings.depth
        );

        let mut ledger = QueryLedger::new();
        let mut stats = ResearchStats::default();
        let mut outcomes: BTreeMap<Vec<usize>, QueryOutcome> = BTreeMap::new();
        let mut status = RunStatus::Completed;

        let mut frontier = vec![ResearchNode::root(
            goal,
            self.settings.breadth,
            self.settings.depth,
        )];
        let mut level = 0;

        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            info!(level = level, nodes = frontier.len(), "Expanding research level");
            self.emit(ProgressEvent::LevelStarted {
                level,
                nodes: frontier.len(),
            });

            // Planning
            let plans = tokio::select! {
                plans = join_all(frontier.iter().map(|node| self.plan_node(node, &ledger))) => plans,
                _ = cancel.cancelled() => {
                    status = RunStatus::Cancelled;
                    break;
                }
            };

            // Ledger merge in frontier order
            let mut pending = Vec::new();
            let mut accepted = vec![0usize; frontier.len()];
            for (index, (node, plan)) in frontier.iter_mut().zip(plans).enumerate() {
                match plan {
                    Plan::Leaf => {
                        ledger.insert(&node.query.query);
                        accepted[index] = 1;
                        pending.push(PendingQuery {
                            path: node.path.clone(),
                            query: node.query.clone(),
                            node: index,
                        });
                    }
                    Plan::Queries(queries) => {
                        stats.nodes_planned += 1;
                        for query in queries {
                            if !ledger.insert(&query.query) {
                                stats.duplicate_queries_skipped += 1;
                                debug!(query = %query.query, "Skipping query already in ledger");
                                continue;
                            }
                            let mut path = node.path.clone();
                            path.push(accepted[index]);
                            accepted[index] += 1;
                            pending.push(PendingQuery {
                                path,
                                query,
                                node: index,
                            });
                        }
                    }
                    Plan::Failed => {
                        stats.nodes_planned += 1;
                        stats.planning_failures += 1;
                    }
                }
                node.advance(NodeState::Fetching);
            }

            // Fetching and extracting
            let extraction_slots: Vec<Semaphore> = frontier
                .iter()
                .map(|_| Semaphore::new(self.settings.extraction_concurrency.max(1)))
                .collect();

            let results = join_all(pending.iter().map(|pending| {
                let node = &frontier[pending.node];
                let slots = &extraction_slots[pending.node];
                async move {
                    tokio::select! {
                        outcome = self.execute_query(&pending.query, node.depth_remaining, slots) => Some(outcome),
                        _ = cancel.cancelled() => None,
                    }
                }
            }))
            .await;

            for node in frontier.iter_mut() {
                node.advance(NodeState::Extracting);
            }

            // Next frontier
            let mut next_frontier = Vec::new();
            let mut spawned = vec![false; frontier.len()];
            let mut level_queries = 0;
            let mut level_learnings = 0;

            for (pending, result) in pending.into_iter().zip(results) {
                let Some(outcome) = result else {
                    debug!(query = %pending.query.query, "Query unit cancelled before finishing");
                    continue;
                };

                stats.absorb(&outcome.stats);
                level_queries += 1;
                level_learnings += outcome.findings.learnings.len();

                let node = &frontier[pending.node];
                if outcome.searched && node.depth_remaining > 1 && !cancel.is_cancelled() {
                    let breadth = self
                        .settings
                        .breadth_policy
                        .child_breadth(node.breadth_remaining, accepted[pending.node]);
                    next_frontier.push(self.child_node(
                        pending.path.clone(),
                        node.depth_remaining - 1,
                        breadth,
                        &outcome,
                        &ledger,
                    ));
                    spawned[pending.node] = true;
                }

                outcomes.insert(pending.path, outcome);
            }

            for (node, has_children) in frontier.iter_mut().zip(spawned) {
                node.advance(if has_children {
                    NodeState::Recursing
                } else {
                    NodeState::Merged
                });
            }

            self.emit(ProgressEvent::LevelFinished {
                level,
                queries: level_queries,
                learnings: level_learnings,
            });

            if cancel.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }

            frontier = next_frontier;
            level += 1;
        }

        let result = assemble(outcomes, stats, status);

        log_operation_success!(
            "research_run",
            learnings = result.learnings.len(),
            sources = result.sources.len(),
            queries = result.queries.len(),
            cancelled = result.is_cancelled()
        );

        result
    }

    async fn plan_node(&self, node: &ResearchNode, ledger: &QueryLedger) -> Plan {
        if node.is_leaf() {
            return Plan::Leaf;
        }

        match self
            .planner
            .plan(&node.context, node.breadth_remaining, ledger.queries())
            .await
        {
            Ok(queries) => Plan::Queries(queries),
            Err(e) => {
                warn!(
                    path = ?node.path,
                    depth = node.depth_remaining,
                    error = %e,
                    "Planning failed, branch ends here"
                );
                Plan::Failed
            }
        }
    }

    /// Search one query and extract every returned page
    async fn execute_query(
        &self,
        query: &Query,
        depth_remaining: usize,
        extraction_slots: &Semaphore,
    ) -> QueryOutcome {
        let mut stats = ResearchStats {
            queries_executed: 1,
            leaf_fetches: usize::from(depth_remaining <= 1),
            ..Default::default()
        };

        let calls = AtomicUsize::new(0);
        let searched = self.search_with_retry(&query.query, &calls).await;
        stats.search_calls = calls.load(Ordering::Relaxed);

        // learnings and the source set must cite the same URL text
        let pages: Vec<SearchResult> = match searched {
            Ok(pages) => pages
                .into_iter()
                .map(|page| SearchResult {
                    url: page.url.trim().to_string(),
                    ..page
                })
                .collect(),
            Err(e) => {
                stats.search_failures = 1;
                warn!(query = %query.query, error = %e, "Search failed, query contributes nothing");
                self.emit(ProgressEvent::QueryFailed {
                    query: query.query.clone(),
                    message: e.to_string(),
                });
                return QueryOutcome {
                    query: query.clone(),
                    findings: Findings::default(),
                    follow_ups: Vec::new(),
                    searched: false,
                    stats,
                };
            }
        };

        let extractions = join_all(pages.iter().map(|page| async move {
            let _slot = extraction_slots.acquire().await.ok();
            self.extractor.extract(query, page).await
        }))
        .await;

        let mut findings = Findings::default();
        let mut follow_ups = Vec::new();
        for (page, extraction) in pages.iter().zip(extractions) {
            findings.sources.insert(&page.url);
            match extraction {
                Ok(page_findings) => {
                    stats.pages_extracted += 1;
                    for learning in page_findings.learnings {
                        findings.learnings.insert(learning);
                    }
                    follow_ups.extend(page_findings.follow_up_queries);
                }
                Err(e) => {
                    stats.extraction_failures += 1;
                    warn!(url = %page.url, error = %e, "Extraction failed, page skipped");
                }
            }
        }

        debug!(
            query = %query.query,
            pages = pages.len(),
            learnings = findings.learnings.len(),
            "Query unit finished"
        );
        self.emit(ProgressEvent::QueryCompleted {
            query: query.query.clone(),
            depth_remaining,
            pages: pages.len(),
            learnings: findings.learnings.len(),
        });

        QueryOutcome {
            query: query.clone(),
            findings,
            follow_ups,
            searched: true,
            stats,
        }
    }

    /// Search through the shared limiter; every attempt takes a fresh slot
    async fn search_with_retry(
        &self,
        query: &str,
        calls: &AtomicUsize,
    ) -> DelveResult<Vec<SearchResult>> {
        let search = self.search.as_ref();
        let limiter = self.limiter.as_ref();
        let max_results = self.settings.results_per_query;
        let timeout_ms = self.settings.search_timeout_secs.saturating_mul(1000);

        retry_async(
            move |attempt| async move {
                let _guard = limiter.acquire().await?;
                calls.fetch_add(1, Ordering::Relaxed);
                debug!(query = %query, attempt = attempt, "Issuing search");
                with_timeout(search.search(query, max_results), timeout_ms, "search").await?
            },
            &self.search_retry,
            "search",
        )
        .await
    }

    fn child_node(
        &self,
        path: Vec<usize>,
        depth_remaining: usize,
        breadth_remaining: usize,
        outcome: &QueryOutcome,
        ledger: &QueryLedger,
    ) -> ResearchNode {
        let mut seen = HashSet::new();
        let follow_ups: Vec<String> = outcome
            .follow_ups
            .iter()
            .filter(|f| !ledger.contains(f) && seen.insert(normalize(f)))
            .cloned()
            .collect();
        let learnings: Vec<&Learning> = outcome.findings.learnings.iter().collect();

        ResearchNode {
            path,
            query: outcome.query.clone(),
            context: prompts::child_context(&outcome.query.research_goal, &learnings, &follow_ups),
            depth_remaining,
            breadth_remaining,
            state: NodeState::Planning,
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(event);
        }
    }
}

/// Fold outcomes in path order into the root aggregate
fn assemble(
    outcomes: BTreeMap<Vec<usize>, QueryOutcome>,
    stats: ResearchStats,
    status: RunStatus,
) -> ResearchResult {
    let mut findings = Findings::default();
    let mut queries = Vec::with_capacity(outcomes.len());

    for outcome in outcomes.into_values() {
        findings = findings.merge(&outcome.findings);
        queries.push(outcome.query);
    }

    ResearchResult {
        learnings: findings.learnings.into_vec(),
        sources: findings.sources.into_vec(),
        queries,
        stats,
        status,
    }
}
