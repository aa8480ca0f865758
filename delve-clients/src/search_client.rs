//! Web search + scrape client for Firecrawl-compatible APIs

use async_trait::async_trait;
use delve_core::{
    config_error, DelveError, DelveResult, ErrorContext, SearchClient, SearchConfig, SearchResult,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    timeout: u64,
    scrape_options: ScrapeOptions,
}

#[derive(Debug, Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<SearchHit>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    markdown: Option<String>,
}

/// Search client that scrapes each hit as markdown in the same call
pub struct FirecrawlSearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl FirecrawlSearchClient {
    /// Create a client whose requests give up after `timeout_secs`
    pub fn new(config: &SearchConfig, timeout_secs: u64) -> DelveResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("FIRECRAWL_API_KEY").ok())
            .ok_or_else(|| {
                config_error!(
                    "Search API key not found (set FIRECRAWL_API_KEY)",
                    "search_client"
                )
            })?;

        let timeout = Duration::from_secs(timeout_secs.max(1));
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DelveError::Config {
                message: format!("Failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
                context: ErrorContext::new("search_client").with_operation("build"),
            })?;

        info!(base_url = %config.base_url, "Created search client");

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/search", self.base_url)
    }
}

#[async_trait]
impl SearchClient for FirecrawlSearchClient {
    async fn search(&self, query: &str, max_results: usize) -> DelveResult<Vec<SearchResult>> {
        let request = SearchRequest {
            query,
            limit: max_results,
            timeout: self.timeout.as_millis() as u64,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };

        debug!(query = %query, limit = max_results, "Issuing search request");

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| search_failure(format!("Search request failed: {}", e), e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DelveError::Search {
                message: format!("Search returned HTTP {}: {}", status.as_u16(), body),
                rate_limited: status.as_u16() == 429,
                source: None,
                context: ErrorContext::new("search_client")
                    .with_operation("search")
                    .with_metadata("query", query),
            });
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| search_failure(format!("Malformed search response: {}", e), e))?;

        into_results(body, max_results)
    }
}

fn search_failure(message: String, source: reqwest::Error) -> DelveError {
    DelveError::Search {
        message,
        rate_limited: false,
        source: Some(Box::new(source)),
        context: ErrorContext::new("search_client").with_operation("search"),
    }
}

fn into_results(body: SearchResponse, max_results: usize) -> DelveResult<Vec<SearchResult>> {
    if !body.success && body.data.is_empty() {
        return Err(delve_core::search_error!(
            body.error
                .unwrap_or_else(|| "Search backend reported failure".to_string()),
            "search_client"
        ));
    }

    Ok(body
        .data
        .into_iter()
        .filter_map(|hit| {
            let url = hit.url.filter(|u| !u.trim().is_empty())?;
            let content = hit.markdown.or(hit.description).unwrap_or_default();
            Some(SearchResult {
                url,
                title: hit.title,
                content,
            })
        })
        .take(max_results)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_scrape_options() {
        let request = SearchRequest {
            query: "caffeine half-life",
            limit: 5,
            timeout: 15000,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["scrapeOptions"]["formats"][0], "markdown");
        assert_eq!(value["limit"], 5);
    }

    #[test]
    fn client_uses_the_given_deadline() {
        let config = SearchConfig {
            api_key: Some("fc-test".to_string()),
            ..SearchConfig::default()
        };
        let client = FirecrawlSearchClient::new(&config, 30).unwrap();
        assert_eq!(client.timeout, Duration::from_secs(30));
        assert_eq!(client.endpoint(), "https://api.firecrawl.dev/v1/search");
    }

    #[test]
    fn hits_without_url_are_skipped() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"success": true, "data": [
                {"url": "https://a.example", "title": "A", "markdown": "alpha"},
                {"title": "no url"},
                {"url": "https://b.example", "description": "beta snippet"}
            ]}"#,
        )
        .unwrap();

        let results = into_results(body, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "alpha");
        assert_eq!(results[1].content, "beta snippet");
        assert_eq!(results[1].title, None);
    }

    #[test]
    fn results_are_capped() {
        let body: SearchResponse = serde_json::from_str(
            r#"{"success": true, "data": [
                {"url": "https://a.example"}, {"url": "https://b.example"}, {"url": "https://c.example"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(into_results(body, 2).unwrap().len(), 2);
    }

    #[test]
    fn backend_failure_is_a_search_error() {
        let body: SearchResponse =
            serde_json::from_str(r#"{"success": false, "error": "quota exceeded"}"#).unwrap();
        let error = into_results(body, 5).unwrap_err();
        assert!(matches!(error, DelveError::Search { .. }));
        assert!(error.to_string().contains("quota exceeded"));
    }

    #[test]
    fn empty_success_is_ok() {
        let body: SearchResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(into_results(body, 5).unwrap().is_empty());
    }
}
