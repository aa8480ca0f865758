//! Report persistence

use crate::types::{Learning, Query, ResearchResult, ResearchStats, RunStatus};
use crate::StepResult;
use chrono::{DateTime, Utc};
use delve_core::{DelveError, OutputConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// File written next to the report
pub const SOURCES_FILE: &str = "sources.json";

/// Machine-readable companion of the report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesDocument {
    pub topic: String,
    pub generated_at: DateTime<Utc>,
    pub status: RunStatus,
    pub sources: Vec<String>,
    pub learnings: Vec<Learning>,
    pub queries: Vec<Query>,
    pub stats: ResearchStats,
}

/// Paths of the files written by [`ReportStore::save`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedReport {
    pub report_path: PathBuf,
    pub sources_path: PathBuf,
}

/// File-based report storage
#[derive(Debug, Clone)]
pub struct ReportStore {
    directory: PathBuf,
    report_file: String,
}

impl ReportStore {
    pub fn new<P: AsRef<Path>>(directory: P, report_file: impl Into<String>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            report_file: report_file.into(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.directory, config.report_file.clone())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Write the report text and the sources document, creating the directory
    pub async fn save(
        &self,
        topic: &str,
        report: &str,
        result: &ResearchResult,
    ) -> StepResult<SavedReport> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(DelveError::Io)?;

        let report_path = self.directory.join(&self.report_file);
        tokio::fs::write(&report_path, report)
            .await
            .map_err(DelveError::Io)?;

        let document = SourcesDocument {
            topic: topic.to_string(),
            generated_at: Utc::now(),
            status: result.status,
            sources: result.sources.clone(),
            learnings: result.learnings.clone(),
            queries: result.queries.clone(),
            stats: result.stats.clone(),
        };
        let content = serde_json::to_string_pretty(&document).map_err(DelveError::Serialization)?;

        let sources_path = self.directory.join(SOURCES_FILE);
        tokio::fs::write(&sources_path, content)
            .await
            .map_err(DelveError::Io)?;

        info!(
            report = %report_path.display(),
            sources = %sources_path.display(),
            "Saved research report"
        );

        Ok(SavedReport {
            report_path,
            sources_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_result() -> ResearchResult {
        ResearchResult {
            learnings: vec![Learning::new(
                "Caffeine half-life is about 5 hours",
                "https://a.example",
            )],
            sources: vec!["https://a.example".to_string()],
            queries: vec![Query::new("caffeine half-life", "find clearance data")],
            stats: ResearchStats {
                queries_executed: 1,
                ..Default::default()
            },
            status: RunStatus::Completed,
        }
    }

    #[tokio::test]
    async fn save_writes_report_and_sources() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("nested").join("output");
        let store = ReportStore::new(&output, "report.md");

        let saved = store
            .save("caffeine and sleep", "# Report\n", &sample_result())
            .await
            .unwrap();

        assert_eq!(saved.report_path, output.join("report.md"));
        let report = std::fs::read_to_string(&saved.report_path).unwrap();
        assert_eq!(report, "# Report\n");

        let document: SourcesDocument =
            serde_json::from_str(&std::fs::read_to_string(&saved.sources_path).unwrap()).unwrap();
        assert_eq!(document.topic, "caffeine and sleep");
        assert_eq!(document.sources, vec!["https://a.example"]);
        assert_eq!(document.learnings.len(), 1);
        assert_eq!(document.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn store_follows_output_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = OutputConfig {
            directory: temp_dir.path().to_string_lossy().to_string(),
            report_file: "final.md".to_string(),
            max_clarifying_questions: 3,
        };

        let store = ReportStore::from_config(&config);
        let saved = store.save("t", "body", &sample_result()).await.unwrap();
        assert!(saved.report_path.ends_with("final.md"));
        assert!(saved.sources_path.ends_with(SOURCES_FILE));
    }
}
