//! Primary analysis stage
//!
//! Deterministic inference call producing structured scores and narrative.
//! Core stage: retry exhaustion against an unreachable dependency fails the
//! execution.

use crate::gateways::InferenceProvider;
use crate::models::{ExtractedDocument, StagePayload};
use crate::stages::StageExecution;

pub async fn run(
    provider: &dyn InferenceProvider,
    document: &ExtractedDocument,
) -> StageExecution {
    match provider.analyze(document).await {
        Ok(report) => StageExecution::success(StagePayload::Analysis(report)),
        Err(err) => {
            tracing::error!(error = %err, "Primary analysis inference failed");
            StageExecution::failed(format!("Primary analysis failed: {}", err))
        }
    }
}
