//! Knowledge retrieval stage
//!
//! Queries the similarity store with the committed analysis summary. Core
//! stage: its matches feed the final score, so failure is fatal. Match
//! ordering is deterministic (the gateway sorts by rounded score desc,
//! id asc).

use crate::gateways::SimilarityProvider;
use crate::models::{KnowledgeMatches, StagePayload};
use crate::stages::StageExecution;

pub async fn run(provider: &dyn SimilarityProvider, text: &str, top_k: u32) -> StageExecution {
    match provider.query(text, top_k).await {
        Ok(matches) => {
            StageExecution::success(StagePayload::Knowledge(KnowledgeMatches { matches }))
        }
        Err(err) => {
            tracing::error!(error = %err, "Knowledge retrieval failed");
            StageExecution::failed(format!("Knowledge retrieval failed: {}", err))
        }
    }
}
