//! Generative inference gateway
//!
//! Every request carries fully deterministic inference parameters
//! (temperature 0.0, top_p 1.0, fixed seed) so identical canonical prompts
//! always produce identical structured responses. Reproducibility does not
//! depend on the stage cache alone.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::canonical::round4;
use crate::gateways::{
    build_http_client, classify_status, classify_transport_error, GatewayError, GatewayState,
    StageClass,
};
use crate::models::{AnalysisReport, AnalysisScores, Claim, ExtractedDocument};

const SERVICE: &str = "inference";

/// Fixed seed sent with every inference request
const INFERENCE_SEED: u64 = 42;

/// Seam for the generative inference dependency
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn analyze(&self, document: &ExtractedDocument) -> Result<AnalysisReport, GatewayError>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest {
    model: String,
    prompt: String,
    temperature: f64,
    top_p: f64,
    seed: u64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ClaimDto {
    text: String,
    #[serde(default)]
    salience: f64,
}

#[derive(Debug, Deserialize)]
struct ScoresDto {
    clarity: f64,
    evidence: f64,
    consistency: f64,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    summary: String,
    #[serde(default)]
    claims: Vec<ClaimDto>,
    scores: ScoresDto,
}

/// HTTP client for the inference service
pub struct HttpInferenceGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    state: Arc<GatewayState>,
}

impl HttpInferenceGateway {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
        state: Arc<GatewayState>,
    ) -> Self {
        Self {
            client: build_http_client(timeout),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            state,
        }
    }

    /// Canonical prompt: derived only from the committed extraction output,
    /// never from wall-clock time or call-site randomness.
    fn build_prompt(document: &ExtractedDocument) -> String {
        let title = document.title.as_deref().unwrap_or("(untitled)");
        format!(
            "Assess the following document.\nTitle: {}\nTopics: {}\n---\n{}",
            title,
            document.topics.join(", "),
            document.body
        )
    }
}

#[async_trait]
impl InferenceProvider for HttpInferenceGateway {
    async fn analyze(&self, document: &ExtractedDocument) -> Result<AnalysisReport, GatewayError> {
        let url = format!("{}/v1/analyze", self.base_url);
        let request = AnalyzeRequest {
            model: self.model.clone(),
            prompt: Self::build_prompt(document),
            temperature: 0.0,
            top_p: 1.0,
            seed: INFERENCE_SEED,
            max_tokens: 1024,
        };

        tracing::debug!(
            content_hash = %document.content_hash,
            model = %self.model,
            "Issuing deterministic inference request"
        );

        let response = self
            .state
            .call(StageClass::Core, || {
                let client = self.client.clone();
                let url = url.clone();
                let api_key = self.api_key.clone();
                let body = serde_json::json!(&request);
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
                        .json::<AnalyzeResponse>()
                        .await
                        .map_err(|e| GatewayError::InvalidResponse {
                            service: SERVICE.to_string(),
                            detail: e.to_string(),
                        })
                }
            })
            .await?;

        Ok(AnalysisReport {
            summary: response.summary,
            claims: response
                .claims
                .into_iter()
                .map(|c| Claim {
                    text: c.text,
                    salience: round4(c.salience),
                })
                .collect(),
            scores: AnalysisScores {
                clarity: round4(response.scores.clarity),
                evidence: round4(response.scores.evidence),
                consistency: round4(response.scores.consistency),
            },
        })
    }
}
