//! Web search gateway
//!
//! Enrichment-class caller: when capacity is exhausted the gateway signals
//! RateLimited immediately so the stage can fall back instead of queuing.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::gateways::{
    build_http_client, classify_status, classify_transport_error, GatewayError, GatewayState,
    StageClass,
};
use crate::models::WebSnippet;

const SERVICE: &str = "web_search";

/// Seam for the web search dependency
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<WebSnippet>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct SearchResultDto {
    title: String,
    url: String,
    #[serde(default)]
    snippet: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResultDto>,
}

/// HTTP client for the web search service
pub struct HttpWebSearchGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    state: Arc<GatewayState>,
}

impl HttpWebSearchGateway {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        state: Arc<GatewayState>,
    ) -> Self {
        Self {
            client: build_http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            state,
        }
    }
}

#[async_trait]
impl WebSearchProvider for HttpWebSearchGateway {
    async fn search(&self, query: &str) -> Result<Vec<WebSnippet>, GatewayError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .state
            .call(StageClass::Enrichment, || {
                let client = self.client.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let query = query.to_string();
                async move {
                    let mut req = client.get(&url).query(&[("q", query.as_str()), ("count", "5")]);
                    if let Some(key) = api_key {
                        req = req.bearer_auth(key);
                    }

                    let response = req
                        .send()
                        .await
                        .map_err(|e| classify_transport_error(SERVICE, e))?;

                    let status = response.status();
                    if !status.is_success() {
                        return Err(classify_status(SERVICE, status));
                    }

                    response
                        .json::<SearchResponse>()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse {
                            service: SERVICE.to_string(),
                            detail: e.to_string(),
                        })
                }
            })
            .await?;

        // Rank reflects the provider's returned order
        Ok(response
            .results
            .into_iter()
            .enumerate()
            .map(|(i, r)| WebSnippet {
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                rank: (i + 1) as u32,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_assigns_ranks() {
        let json = r#"{ "results": [
            { "title": "A", "url": "http://a", "snippet": "sa" },
            { "title": "B", "url": "http://b" }
        ]}"#;
        let parsed: SearchResponse = serde_json::from_str(json).unwrap();
        let snippets: Vec<WebSnippet> = parsed
            .results
            .into_iter()
            .enumerate()
            .map(|(i, r)| WebSnippet {
                title: r.title,
                url: r.url,
                snippet: r.snippet,
                rank: (i + 1) as u32,
            })
            .collect();

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].rank, 1);
        assert_eq!(snippets[1].rank, 2);
        assert_eq!(snippets[1].snippet, "");
    }

    #[test]
    fn empty_response_is_valid() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
