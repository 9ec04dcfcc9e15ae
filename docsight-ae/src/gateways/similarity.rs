//! Similarity store gateway
//!
//! Core-class caller feeding the final score. Matches are re-ordered here
//! into a deterministic (rounded score desc, id asc) order: ties must break
//! on the stable identifier, never on the insertion order of the search
//! backend.

use async_trait::async_trait;
use serde::Deserialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::canonical::round4;
use crate::gateways::{
    build_http_client, classify_status, classify_transport_error, GatewayError, GatewayState,
    StageClass,
};
use crate::models::SimilarMatch;

const SERVICE: &str = "similarity";

/// Seam for the similarity store dependency
#[async_trait]
pub trait SimilarityProvider: Send + Sync {
    async fn query(&self, text: &str, top_k: u32) -> Result<Vec<SimilarMatch>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct MatchDto {
    id: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<MatchDto>,
}

/// Sort matches by rounded score descending, then id ascending
pub fn order_matches(mut matches: Vec<SimilarMatch>) -> Vec<SimilarMatch> {
    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    matches
}

/// HTTP client for the similarity store
pub struct HttpSimilarityGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    state: Arc<GatewayState>,
}

impl HttpSimilarityGateway {
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
impl SimilarityProvider for HttpSimilarityGateway {
    async fn query(&self, text: &str, top_k: u32) -> Result<Vec<SimilarMatch>, GatewayError> {
        let url = format!("{}/query", self.base_url);

        let response = self
            .state
            .call(StageClass::Core, || {
                let client = self.client.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let body = serde_json::json!({ "text": text, "top_k": top_k });
                async move {
                    let mut req = client.post(&url).json(&body);
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
                        .json::<QueryResponse>()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse {
                            service: SERVICE.to_string(),
                            detail: e.to_string(),
                        })
                }
            })
            .await?;

        let matches = response
            .matches
            .into_iter()
            .map(|m| SimilarMatch {
                id: m.id,
                score: round4(m.score),
            })
            .collect();

        Ok(order_matches(matches))
    }
}
