//! Deduplication of queries, learnings and sources
//!
//! Learnings and sources merge as a set union that is idempotent and
//! commutative in content. Each container remembers first-discovery order,
//! so folding contributions in a fixed order gives a fixed output order.

use crate::types::Learning;
use std::collections::{HashMap, HashSet};

/// Case-insensitive, whitespace-collapsed key used for equality
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Learnings keyed by normalized text; duplicate texts union their sources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LearningSet {
    entries: Vec<Learning>,
    index: HashMap<String, usize>,
}

impl LearningSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a learning; returns true if its text was not seen before
    pub fn insert(&mut self, learning: Learning) -> bool {
        let key = normalize(&learning.text);
        if key.is_empty() {
            return false;
        }

        match self.index.get(&key) {
            Some(&position) => {
                let existing = &mut self.entries[position];
                for source in learning.sources {
                    if !existing.sources.contains(&source) {
                        existing.sources.push(source);
                    }
                }
                false
            }
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(learning);
                true
            }
        }
    }

    /// Union with `other`, keeping this set's discovery order first
    pub fn merge(mut self, other: &LearningSet) -> LearningSet {
        for learning in &other.entries {
            self.insert(learning.clone());
        }
        self
    }

    pub fn get(&self, text: &str) -> Option<&Learning> {
        self.index
            .get(&normalize(text))
            .map(|&position| &self.entries[position])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Learning> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_vec(self) -> Vec<Learning> {
        self.entries
    }
}

impl FromIterator<Learning> for LearningSet {
    fn from_iter<I: IntoIterator<Item = Learning>>(iter: I) -> Self {
        let mut set = LearningSet::new();
        for learning in iter {
            set.insert(learning);
        }
        set
    }
}

/// Ordered set of source URLs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSet {
    urls: Vec<String>,
    seen: HashSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: &str) -> bool {
        let url = url.trim();
        if url.is_empty() || self.seen.contains(url) {
            return false;
        }
        self.seen.insert(url.to_string());
        self.urls.push(url.to_string());
        true
    }

    pub fn merge(mut self, other: &SourceSet) -> SourceSet {
        for url in &other.urls {
            self.insert(url);
        }
        self
    }

    pub fn contains(&self, url: &str) -> bool {
        self.seen.contains(url.trim())
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.urls.iter()
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.urls
    }
}

/// Learnings plus sources contributed by one query unit or subtree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub learnings: LearningSet,
    pub sources: SourceSet,
}

impl Findings {
    pub fn merge(self, other: &Findings) -> Findings {
        Findings {
            learnings: self.learnings.merge(&other.learnings),
            sources: self.sources.merge(&other.sources),
        }
    }
}

/// Every query accepted so far in a run, keyed by normalized text
#[derive(Debug, Clone, Default)]
pub struct QueryLedger {
    seen: HashSet<String>,
    queries: Vec<String>,
}

impl QueryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, query: &str) -> bool {
        self.seen.contains(&normalize(query))
    }

    /// Record a query; returns false if an equivalent one is already present
    pub fn insert(&mut self, query: &str) -> bool {
        let key = normalize(query);
        if key.is_empty() || !self.seen.insert(key) {
            return false;
        }
        self.queries.push(query.trim().to_string());
        true
    }

    /// Accepted queries in acceptance order
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
