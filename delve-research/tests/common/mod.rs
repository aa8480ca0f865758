//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use delve_core::{
    search_error, CompletionRequest, DelveError, DelveResult, LanguageModel, LlmErrorKind,
    ResearchSettings, RetryConfig, SearchClient, SearchResult,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

pub const PLAN_MARKER: &str = "generate a list of web search queries";
pub const EXTRACT_MARKER: &str = "extract a list of learnings";
pub const REPORT_MARKER: &str = "write a final report";
pub const FEEDBACK_MARKER: &str = "clarify the research direction";

type Handler = Box<dyn Fn(&str) -> DelveResult<String> + Send + Sync>;

/// Language model that answers through a prompt-dispatching closure
pub struct ScriptedModel {
    handler: Handler,
    prompts: Mutex<Vec<String>>,
    slow: Option<(String, Duration)>,
    in_flight: InFlight,
}

/// High-water mark of overlapping calls
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ScriptedModel {
    pub fn new(handler: impl Fn(&str) -> DelveResult<String> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            prompts: Mutex::new(Vec::new()),
            slow: None,
            in_flight: InFlight::default(),
        }
    }

    /// Prompts containing `marker` take `latency` to answer and are counted while in flight
    pub fn slow_on(mut self, marker: &str, latency: Duration) -> Self {
        self.slow = Some((marker.to_string(), latency));
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.in_flight.peak()
    }

    pub fn prompts_containing(&self, marker: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(marker))
            .cloned()
            .collect()
    }

    pub fn calls_containing(&self, marker: &str) -> usize {
        self.prompts_containing(marker).len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: CompletionRequest) -> DelveResult<String> {
        self.prompts.lock().unwrap().push(request.prompt.clone());

        if let Some((marker, latency)) = &self.slow {
            if request.prompt.contains(marker.as_str()) {
                self.in_flight.enter();
                tokio::time::sleep(*latency).await;
                self.in_flight.leave();
            }
        }

        (self.handler)(&request.prompt)
    }
}

type SearchHandler = Box<dyn Fn(&str) -> DelveResult<Vec<SearchResult>> + Send + Sync>;

/// Search client that records every call and when it started
pub struct ScriptedSearch {
    handler: SearchHandler,
    calls: Mutex<Vec<(String, Instant)>>,
    stall_on: Option<String>,
    latency: Option<Duration>,
    in_flight: InFlight,
}

impl ScriptedSearch {
    pub fn new(
        handler: impl Fn(&str) -> DelveResult<Vec<SearchResult>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            stall_on: None,
            latency: None,
            in_flight: InFlight::default(),
        }
    }

    /// Every search takes `latency` and is counted while outstanding
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn peak_outstanding(&self) -> usize {
        self.in_flight.peak()
    }

    /// Queries containing `needle` hang for ten minutes before answering
    pub fn stalling_on(mut self, needle: &str) -> Self {
        self.stall_on = Some(needle.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(q, _)| q.clone())
            .collect()
    }

    pub fn start_times(&self) -> Vec<Instant> {
        let mut times: Vec<Instant> = self.calls.lock().unwrap().iter().map(|(_, t)| *t).collect();
        times.sort();
        times
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl SearchClient for ScriptedSearch {
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), Instant::now()));

        if let Some(latency) = self.latency {
            self.in_flight.enter();
            tokio::time::sleep(latency).await;
            self.in_flight.leave();
        }

        if let Some(needle) = &self.stall_on {
            if query.contains(needle.as_str()) {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
        }

        let mut results = (self.handler)(query)?;
        results.truncate(max_results);
        Ok(results)
    }
}

/// Two pages per query whose content lines become learnings
pub fn pages_for(query: &str) -> Vec<SearchResult> {
    let slug = slug(query);
    vec![
        SearchResult {
            url: format!("https://{}.example/one", slug),
            title: Some(format!("{} one", query)),
            content: format!("Finding about {}", query),
        },
        SearchResult {
            url: format!("https://{}.example/two", slug),
            title: None,
            content: format!("Finding about {}\nShared background fact", query),
        },
    ]
}

pub fn slug(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect()
}

pub fn failing_search(query: &str) -> DelveError {
    search_error!(format!("backend unavailable for {}", query), "scripted_search")
}

pub fn plan_json(queries: &[(&str, &str)]) -> String {
    let queries: Vec<serde_json::Value> = queries
        .iter()
        .map(|(q, g)| serde_json::json!({ "query": q, "research_goal": g }))
        .collect();
    serde_json::json!({ "queries": queries }).to_string()
}

pub fn extraction_json(learnings: &[&str], follow_ups: &[&str]) -> String {
    serde_json::json!({
        "learnings": learnings,
        "follow_up_questions": follow_ups,
    })
    .to_string()
}

/// Text between `start` and `end` in `prompt`
pub fn between<'a>(prompt: &'a str, start: &str, end: &str) -> &'a str {
    prompt
        .split_once(start)
        .and_then(|(_, rest)| rest.split_once(end))
        .map(|(inside, _)| inside)
        .unwrap_or("")
}

/// Extraction handler: every non-empty content line is one learning
pub fn extract_lines(prompt: &str) -> String {
    let content = between(prompt, "<content>\n", "\n</content>");
    let learnings: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    extraction_json(&learnings, &[])
}

pub fn invalid_response() -> DelveError {
    DelveError::llm(LlmErrorKind::InvalidResponse, "not json", "scripted_model")
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

pub fn settings(breadth: usize, depth: usize) -> ResearchSettings {
    ResearchSettings {
        breadth,
        depth,
        search_rate_limit_per_minute: 1000,
        fetch_concurrency: 4,
        extraction_concurrency: 2,
        results_per_query: 5,
        search_timeout_secs: 3600,
        ..ResearchSettings::default()
    }
}

/// Counter for handlers that need fresh names per call
pub fn next_id(counter: &AtomicUsize) -> usize {
    counter.fetch_add(1, Ordering::SeqCst)
}
