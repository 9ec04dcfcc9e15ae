//! Stage adapters
//!
//! Seven uniform units, each calling a gateway or local computation and
//! classifying the outcome. Adapters catch and classify all external errors
//! into typed outcomes; the coordinator never observes raw dependency
//! errors.

pub mod extraction;
pub mod knowledge_retrieval;
pub mod persistence;
pub mod primary_analysis;
pub mod signal_scoring;
pub mod social_enrichment;
pub mod web_enrichment;

use crate::models::{ConfidenceFlag, ExtractedDocument, StageOutcome, StagePayload};

/// Uniform adapter result: outcome, payload, confidence
#[derive(Debug, Clone)]
pub struct StageExecution {
    pub outcome: StageOutcome,
    /// Absent when the stage failed before producing output
    pub payload: Option<StagePayload>,
    pub confidence: ConfidenceFlag,
    /// Classification detail for Failed/Fallback outcomes
    pub error: Option<String>,
}

impl StageExecution {
    pub fn success(payload: StagePayload) -> Self {
        Self {
            outcome: StageOutcome::Success,
            payload: Some(payload),
            confidence: ConfidenceFlag::Full,
            error: None,
        }
    }

    pub fn fallback(payload: StagePayload, error: String) -> Self {
        Self {
            outcome: StageOutcome::Fallback,
            payload: Some(payload),
            confidence: ConfidenceFlag::Low,
            error: Some(error),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            outcome: StageOutcome::Failed,
            payload: None,
            confidence: ConfidenceFlag::Low,
            error: Some(error),
        }
    }
}

/// Search query shared by both enrichment stages, derived only from the
/// committed extraction output
pub fn enrichment_query(document: &ExtractedDocument) -> String {
    match &document.title {
        Some(title) if !document.topics.is_empty() => {
            format!("{} {}", title, document.topics.join(" "))
        }
        Some(title) => title.clone(),
        None => document.topics.join(" "),
    }
}
