//! Web enrichment stage
//!
//! Skippable: any gateway failure degrades to a neutral Fallback payload
//! with low confidence instead of failing the execution.

use crate::gateways::WebSearchProvider;
use crate::models::{StagePayload, WebEvidence};
use crate::stages::StageExecution;

pub async fn run(provider: &dyn WebSearchProvider, query: &str) -> StageExecution {
    match provider.search(query).await {
        Ok(results) => StageExecution::success(StagePayload::WebEvidence(WebEvidence {
            results,
            degraded: false,
        })),
        Err(err) => {
            tracing::warn!(error = %err, "Web enrichment degraded to fallback");
            StageExecution::fallback(
                StagePayload::WebEvidence(WebEvidence::degraded()),
                format!("Web enrichment degraded: {}", err),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::GatewayError;
    use crate::models::{ConfidenceFlag, StageOutcome, WebSnippet};
    use async_trait::async_trait;

    struct FixedProvider(Result<Vec<WebSnippet>, GatewayError>);

    #[async_trait]
    impl WebSearchProvider for FixedProvider {
        async fn search(&self, _query: &str) -> Result<Vec<WebSnippet>, GatewayError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn success_keeps_full_confidence() {
        let provider = FixedProvider(Ok(vec![WebSnippet {
            title: "t".to_string(),
            url: "http://x".to_string(),
            snippet: "s".to_string(),
            rank: 1,
        }]));
        let result = run(&provider, "q").await;
        assert_eq!(result.outcome, StageOutcome::Success);
        assert_eq!(result.confidence, ConfidenceFlag::Full);
    }

    #[tokio::test]
    async fn rate_limit_becomes_fallback() {
        let provider = FixedProvider(Err(GatewayError::RateLimited {
            service: "web_search".to_string(),
        }));
        let result = run(&provider, "q").await;

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(result.confidence, ConfidenceFlag::Low);
        let payload = result.payload.unwrap();
        assert!(payload.as_web_evidence().unwrap().degraded);
    }

    #[tokio::test]
    async fn timeout_becomes_fallback() {
        let provider = FixedProvider(Err(GatewayError::Timeout {
            service: "web_search".to_string(),
        }));
        let result = run(&provider, "q").await;
        assert_eq!(result.outcome, StageOutcome::Fallback);
    }
}
