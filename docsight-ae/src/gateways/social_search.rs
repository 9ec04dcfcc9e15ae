//! Social search gateway
//!
//! Enrichment-class caller, same fallback-over-queuing policy as web
//! search. Post timestamps from the provider are dropped: they are
//! non-semantic for the assessment and would poison canonical inputs.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::gateways::{
    build_http_client, classify_status, classify_transport_error, GatewayError, GatewayState,
    StageClass,
};
use crate::models::SocialPost;

const SERVICE: &str = "social_search";

/// Seam for the social search dependency
#[async_trait]
pub trait SocialSearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SocialPost>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct PostDto {
    author: String,
    text: String,
    #[serde(default)]
    engagement: u64,
}

#[derive(Debug, Deserialize)]
struct PostsResponse {
    #[serde(default)]
    posts: Vec<PostDto>,
}

/// HTTP client for the social search service
pub struct HttpSocialSearchGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    state: Arc<GatewayState>,
}

impl HttpSocialSearchGateway {
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
impl SocialSearchProvider for HttpSocialSearchGateway {
    async fn search(&self, query: &str) -> Result<Vec<SocialPost>, GatewayError> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .state
            .call(StageClass::Enrichment, || {
                let client = self.client.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let query = query.to_string();
                async move {
                    let mut req = client.get(&url).query(&[("q", query.as_str()), ("limit", "10")]);
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
                        .json::<PostsResponse>()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse {
                            service: SERVICE.to_string(),
                            detail: e.to_string(),
                        })
                }
            })
            .await?;

        Ok(response
            .posts
            .into_iter()
            .map(|p| SocialPost {
                author: p.author,
                text: p.text,
                engagement: p.engagement,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing() {
        let json = r#"{ "posts": [
            { "author": "@a", "text": "t", "engagement": 12, "posted_at": "2024-01-01" }
        ]}"#;
        let parsed: PostsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.posts.len(), 1);
        assert_eq!(parsed.posts[0].engagement, 12);
    }
}
