//! Extract Client: calls the external extract provider on one URL.
//!
//! Mirrors the teacher's `DeepResearch::process_url` (navigate, extract
//! content, summarize) but replaces in-process browser navigation with a
//! single HTTP call to Firecrawl's `/v1/extract` endpoint, per spec.md §4.3.

use crate::types::Finding;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of one extract call. Failures are structural, never exceptions,
/// per spec.md §4.3.
#[derive(Debug, Clone)]
pub enum ExtractOutcome {
    Success(Vec<Finding>),
    Failure(String),
}

#[async_trait::async_trait]
pub trait ExtractClient: Send + Sync {
    async fn extract(&self, url: &str, prompt: &str) -> ExtractOutcome;
}

#[derive(Debug, Serialize)]
struct FirecrawlExtractRequest<'a> {
    urls: [&'a str; 1],
    prompt: &'a str,
}

/// The extract payload's `data` field may be a single record or a list; the
/// untagged enum lets serde pick whichever shape the response actually used.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FirecrawlExtractData {
    Many(Vec<FirecrawlExtractRecord>),
    One(FirecrawlExtractRecord),
}

#[derive(Debug, Deserialize)]
struct FirecrawlExtractRecord {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct FirecrawlExtractResponse {
    success: bool,
    #[serde(default)]
    data: Option<FirecrawlExtractData>,
    #[serde(default)]
    error: Option<String>,
}

/// Extract Client backed by the Firecrawl `/v1/extract` endpoint.
pub struct FirecrawlExtractClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl FirecrawlExtractClient {
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
impl ExtractClient for FirecrawlExtractClient {
    async fn extract(&self, url: &str, prompt: &str) -> ExtractOutcome {
        debug!("extracting {url}");

        let response = match self
            .http
            .post(format!("{}/v1/extract", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&FirecrawlExtractRequest { urls: [url], prompt })
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ExtractOutcome::Failure(format!("extract request failed: {e}")),
        };

        let parsed: FirecrawlExtractResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return ExtractOutcome::Failure(format!("extract response parse failed: {e}")),
        };

        if !parsed.success {
            let msg = parsed.error.unwrap_or_else(|| "extract reported failure".to_string());
            warn!("extract of {url} failed: {msg}");
            return ExtractOutcome::Failure(msg);
        }

        // The caller attaches the requesting URL as `source` regardless of
        // what the service returns, per spec.md §4.3.
        let records = match parsed.data {
            Some(FirecrawlExtractData::Many(records)) => records,
            Some(FirecrawlExtractData::One(record)) => vec![record],
            None => Vec::new(),
        };

        let findings = records
            .into_iter()
            .filter(|r| !r.text.is_empty())
            .map(|r| Finding::new(r.text, url))
            .collect();

        ExtractOutcome::Success(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeExtractClient {
        responses: std::sync::Mutex<std::collections::HashMap<String, ExtractOutcome>>,
    }

    #[async_trait::async_trait]
    impl ExtractClient for FakeExtractClient {
        async fn extract(&self, url: &str, _prompt: &str) -> ExtractOutcome {
            self.responses
                .lock()
                .unwrap()
                .remove(url)
                .unwrap_or(ExtractOutcome::Failure("no fixture for url".to_string()))
        }
    }

    #[tokio::test]
    async fn failure_carries_no_finding() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(
            "https://bad.example/".to_string(),
            ExtractOutcome::Failure("404".to_string()),
        );
        let client = FakeExtractClient {
            responses: std::sync::Mutex::new(responses),
        };
        match client.extract("https://bad.example/", "p").await {
            ExtractOutcome::Failure(_) => {}
            ExtractOutcome::Success(_) => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn success_attaches_requesting_url_as_source() {
        let mut responses = std::collections::HashMap::new();
        responses.insert(
            "https://good.example/".to_string(),
            ExtractOutcome::Success(vec![Finding::new("hello", "https://good.example/")]),
        );
        let client = FakeExtractClient {
            responses: std::sync::Mutex::new(responses),
        };
        match client.extract("https://good.example/", "p").await {
            ExtractOutcome::Success(findings) => {
                assert_eq!(findings[0].source, "https://good.example/");
            }
            ExtractOutcome::Failure(_) => panic!("expected success"),
        }
    }
}
