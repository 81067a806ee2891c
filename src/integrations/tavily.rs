//! Tavily web search client.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::graph::state::Passage;
use crate::websearch::WebSearch;
use crate::{Error, Result};

const TAVILY_API_URL: &str = "https://api.tavily.com";

#[derive(Debug, Clone)]
pub struct TavilyClient {
    http: Client,
    api_key: String,
    base_url: String,
    max_results: usize,
}

impl TavilyClient {
    pub fn new<S: Into<String>>(api_key: S, max_results: usize) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::Config("TAVILY_API_KEY is empty".to_string()));
        }

        let http = Client::builder()
            .user_agent(concat!("agentic_rag/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::WebSearch(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            http,
            api_key,
            base_url: TAVILY_API_URL.to_string(),
            max_results: max_results.max(1),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Run a search and return raw results.
    pub async fn search_raw(&self, query: &str) -> Result<Vec<SearchResult>> {
        let request = SearchRequest {
            query: query.to_string(),
            max_results: self.max_results,
            search_depth: "basic",
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::WebSearch(format!("Tavily request failed: {}", e)))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::rate_limited(format!("Tavily error {}: {}", status, text)));
        }
        if !status.is_success() {
            return Err(Error::WebSearch(format!("Tavily error {}: {}", status, text)));
        }

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| Error::WebSearch(format!("Invalid Tavily response: {}", e)))?;
        Ok(parsed.results)
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &str) -> Result<Vec<Passage>> {
        let results = self.search_raw(query).await?;
        Ok(results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| Passage::new(r.content).with_source(r.url))
            .collect())
    }
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    query: String,
    max_results: usize,
    search_depth: &'static str,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

/// Single Tavily hit.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> TavilyClient {
        TavilyClient::new("tvly-test", 3)
            .unwrap()
            .with_base_url(&server.base_url())
    }

    #[test]
    fn rejects_empty_key() {
        assert!(matches!(TavilyClient::new(" ", 3), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn search_maps_results_to_passages_with_provenance() {
        let server = MockServer::start_async().await;

        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/search")
                .header("authorization", "Bearer tvly-test")
                .matches(|req| {
                    let body: serde_json::Value =
                        serde_json::from_slice(req.body().as_ref()).unwrap();
                    body["query"] == "how to make pizza" && body["max_results"] == 3
                });
            then.status(200).json_body(json!({
                "results": [
                    { "title": "Pizza", "url": "https://a.example/pizza", "content": "Knead the dough." },
                    { "title": "Empty", "url": "https://b.example", "content": "  " },
                    { "title": "Oven", "url": "https://c.example/oven", "content": "Bake at 250C." }
                ]
            }));
        });

        let passages = client(&server).search("how to make pizza").await.unwrap();

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source.as_deref(), Some("https://a.example/pizza"));
        assert_eq!(passages[1].content, "Bake at 250C.");
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn http_failure_is_web_search_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/search");
            then.status(401).body("bad key");
        });

        let err = client(&server).search("q").await.unwrap_err();
        assert!(matches!(err, Error::WebSearch(ref msg) if msg.contains("401")));
    }
}
