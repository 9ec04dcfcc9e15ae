//! Persistence stage
//!
//! Composes the final assessment from all committed stage payloads and
//! writes it durably. Idempotent: retrying with the same execution id never
//! creates a duplicate record. An unrecorded result has no value to the
//! caller, so exhausted persistence retries fail the execution.

use sqlx::SqlitePool;

use crate::canonical::round4;
use crate::db::{assessments, retry_on_lock};
use crate::models::{
    AssessmentRecord, Execution, KnowledgeMatches, PersistReceipt, SocialEvidence, Stage,
    StagePayload, WebEvidence,
};
use crate::stages::StageExecution;

/// Weight of the signal composite vs. corpus support in the overall score
const SIGNAL_WEIGHT: f64 = 0.85;
const SUPPORT_WEIGHT: f64 = 0.15;

/// Build the composite assessment from committed stage payloads.
///
/// Enrichment payloads may be degraded Fallback substitutes; core payloads
/// must all be present or composition is an error.
pub fn compose_assessment(execution: &Execution) -> Result<AssessmentRecord, String> {
    let analysis = execution
        .stage_result(Stage::PrimaryAnalysis)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.as_analysis())
        .ok_or("Missing committed primary analysis output")?;

    let signals = execution
        .stage_result(Stage::SignalScoring)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.as_signals())
        .ok_or("Missing committed signal scores")?;

    let related = execution
        .stage_result(Stage::KnowledgeRetrieval)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.as_knowledge())
        .cloned()
        .ok_or("Missing committed knowledge matches")?;

    let web_evidence = execution
        .stage_result(Stage::WebEnrichment)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.as_web_evidence())
        .cloned()
        .unwrap_or_else(WebEvidence::degraded);

    let social_evidence = execution
        .stage_result(Stage::SocialEnrichment)
        .and_then(|r| r.payload.as_ref())
        .and_then(|p| p.as_social_evidence())
        .cloned()
        .unwrap_or_else(SocialEvidence::degraded);

    let overall_score = overall_score(signals.composite, &related);

    Ok(AssessmentRecord {
        execution_id: execution.execution_id,
        artifact_ref: execution.artifact_ref.clone(),
        overall_score,
        signals: signals.clone(),
        summary: analysis.summary.clone(),
        web_evidence,
        social_evidence,
        related,
    })
}

/// Corpus support is the mean similarity score; with no matches the
/// composite stands alone
fn overall_score(composite: f64, related: &KnowledgeMatches) -> f64 {
    if related.matches.is_empty() {
        return round4(composite);
    }
    let support: f64 =
        related.matches.iter().map(|m| m.score).sum::<f64>() / related.matches.len() as f64;
    round4(SIGNAL_WEIGHT * composite + SUPPORT_WEIGHT * round4(support))
}

/// Write the composite record; lock contention is retried
pub async fn run(pool: &SqlitePool, execution: &Execution) -> StageExecution {
    let record = match compose_assessment(execution) {
        Ok(record) => record,
        Err(detail) => {
            return StageExecution::failed(format!("Cannot compose assessment: {}", detail));
        }
    };

    let inserted = retry_on_lock("insert_assessment", 5000, || {
        let record = record.clone();
        let pool = pool.clone();
        async move { assessments::insert_assessment(&pool, &record).await }
    })
    .await;

    match inserted {
        Ok(wrote) => {
            if !wrote {
                tracing::info!(
                    execution_id = %execution.execution_id,
                    "Assessment already persisted, idempotent re-run"
                );
            }
            StageExecution::success(StagePayload::Persisted(PersistReceipt {
                overall_score: record.overall_score,
                duplicate: !wrote,
            }))
        }
        Err(err) => {
            tracing::error!(
                execution_id = %execution.execution_id,
                error = %err,
                "Assessment persistence failed"
            );
            StageExecution::failed(format!("Result could not be recorded: {}", err))
        }
    }
}
