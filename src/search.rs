//! Search Client: calls the external search provider.
//!
//! Mirrors the teacher's `web_search::search_with_manager` shape (a plain
//! async function returning a structured result set) but targets the
//! Firecrawl HTTP search endpoint instead of a local headless browser, per
//! spec.md §4.2 / §6.

use crate::types::Source;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Outcome of one search call. A non-success response is a *value*, not an
/// exception, per spec.md §4.2: "A non-success response is surfaced
/// structurally, never as an exception."
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Success(Vec<Source>),
    Failure(String),
}

#[async_trait::async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str) -> SearchOutcome;
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResponse {
    success: bool,
    #[serde(default)]
    data: Vec<FirecrawlSearchResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirecrawlSearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Serialize)]
struct FirecrawlSearchRequest<'a> {
    query: &'a str,
}

/// Search Client backed by the Firecrawl `/v1/search` endpoint.
pub struct FirecrawlSearchClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl FirecrawlSearchClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_base: "https://api.firecrawl.dev".to_string(),
            api_key,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }
}

#[async_trait::async_trait]
impl SearchClient for FirecrawlSearchClient {
    async fn search(&self, query: &str) -> SearchOutcome {
        debug!("searching for: {query}");

        let response = match self
            .http
            .post(format!("{}/v1/search", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&FirecrawlSearchRequest { query })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return SearchOutcome::Failure(format!("search request failed: {e}")),
        };

        let parsed: FirecrawlSearchResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return SearchOutcome::Failure(format!("search response parse failed: {e}")),
        };

        if !parsed.success {
            let msg = parsed.error.unwrap_or_else(|| "search reported failure".to_string());
            warn!("search for '{query}' failed: {msg}");
            return SearchOutcome::Failure(msg);
        }

        let results: Vec<Source> = parsed
            .data
            .into_iter()
            .map(|r| Source {
                url: r.url,
                title: r.title,
                description: r.description,
            })
            .collect();

        info!("search for '{query}' returned {} results", results.len());
        SearchOutcome::Success(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Canned, sequenced search client for tests: each call consumes the
    /// next entry, panicking if exhausted. Mirrors the teacher's pattern of
    /// building fixtures inline rather than a generic mock framework.
    pub struct FakeSearchClient {
        responses: std::sync::Mutex<std::collections::VecDeque<SearchOutcome>>,
    }

    impl FakeSearchClient {
        pub fn new(responses: Vec<SearchOutcome>) -> Self {
            Self {
                responses: std::sync::Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SearchClient for FakeSearchClient {
        async fn search(&self, _query: &str) -> SearchOutcome {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(SearchOutcome::Failure("fixture exhausted".to_string()))
        }
    }

    #[tokio::test]
    async fn success_carries_results() {
        let client = FakeSearchClient::new(vec![SearchOutcome::Success(vec![Source {
            url: "https://a.example/".to_string(),
            title: "A".to_string(),
            description: "desc".to_string(),
        }])]);
        match client.search("x").await {
            SearchOutcome::Success(results) => assert_eq!(results.len(), 1),
            SearchOutcome::Failure(_) => panic!("expected success"),
        }
    }

    #[tokio::test]
    async fn failure_is_structural_not_a_panic() {
        let client = FakeSearchClient::new(vec![SearchOutcome::Failure("boom".to_string())]);
        match client.search("x").await {
            SearchOutcome::Failure(msg) => assert_eq!(msg, "boom"),
            SearchOutcome::Success(_) => panic!("expected failure"),
        }
    }
}
