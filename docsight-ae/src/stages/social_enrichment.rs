//! Social enrichment stage
//!
//! Same fallback policy as web enrichment: degraded, never fatal.

use crate::gateways::SocialSearchProvider;
use crate::models::{SocialEvidence, StagePayload};
use crate::stages::StageExecution;

pub async fn run(provider: &dyn SocialSearchProvider, query: &str) -> StageExecution {
    match provider.search(query).await {
        Ok(posts) => StageExecution::success(StagePayload::SocialEvidence(SocialEvidence {
            posts,
            degraded: false,
        })),
        Err(err) => {
            tracing::warn!(error = %err, "Social enrichment degraded to fallback");
            StageExecution::fallback(
                StagePayload::SocialEvidence(SocialEvidence::degraded()),
                format!("Social enrichment degraded: {}", err),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateways::GatewayError;
    use crate::models::{ConfidenceFlag, SocialPost, StageOutcome};
    use async_trait::async_trait;

    struct FixedProvider(Result<Vec<SocialPost>, GatewayError>);

    #[async_trait]
    impl SocialSearchProvider for FixedProvider {
        async fn search(&self, _query: &str) -> Result<Vec<SocialPost>, GatewayError> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn unreachable_becomes_fallback_with_low_confidence() {
        let provider = FixedProvider(Err(GatewayError::Unreachable {
            service: "social_search".to_string(),
            detail: "dns".to_string(),
        }));
        let result = run(&provider, "q").await;

        assert_eq!(result.outcome, StageOutcome::Fallback);
        assert_eq!(result.confidence, ConfidenceFlag::Low);
        let payload = result.payload.unwrap();
        assert!(payload.as_social_evidence().unwrap().posts.is_empty());
    }

    #[tokio::test]
    async fn posts_pass_through_on_success() {
        let provider = FixedProvider(Ok(vec![SocialPost {
            author: "@a".to_string(),
            text: "t".to_string(),
            engagement: 3,
        }]));
        let result = run(&provider, "q").await;
        assert_eq!(result.outcome, StageOutcome::Success);
        let payload = result.payload.unwrap();
        assert_eq!(payload.as_social_evidence().unwrap().posts.len(), 1);
    }
}
