//! Analysis workflow API handlers
//!
//! POST /analysis, GET /analysis/:id, POST /analysis/:id/cancel

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::{ConfidenceFlag, Execution, ExecutionStatus, StageOutcome, Subject},
    AppState,
};

/// POST /analysis request
#[derive(Debug, Deserialize)]
pub struct SubmitAnalysisRequest {
    pub artifact_ref: String,
    #[serde(default)]
    pub subject: Subject,
}

/// POST /analysis response
#[derive(Debug, Serialize)]
pub struct SubmitAnalysisResponse {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Per-stage view in the status snapshot
#[derive(Debug, Serialize)]
pub struct StageView {
    pub stage: String,
    pub outcome: StageOutcome,
    pub cache_hit: bool,
    pub confidence: ConfidenceFlag,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

/// GET /analysis/:id response
#[derive(Debug, Serialize)]
pub struct AnalysisStatusResponse {
    pub execution_id: Uuid,
    pub artifact_ref: String,
    pub status: ExecutionStatus,
    pub stages: Vec<StageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl AnalysisStatusResponse {
    fn from_execution(execution: Execution) -> Self {
        let stages = execution
            .stage_results
            .iter()
            .map(|record| StageView {
                stage: record.stage.as_str().to_string(),
                outcome: record.outcome,
                cache_hit: record.cache_hit,
                confidence: record.confidence,
                duration_ms: record.duration_ms,
                payload: record
                    .payload
                    .as_ref()
                    .and_then(|p| serde_json::to_value(p).ok()),
            })
            .collect();

        Self {
            execution_id: execution.execution_id,
            artifact_ref: execution.artifact_ref,
            status: execution.status,
            stages,
            error: execution.error,
            created_at: execution.created_at,
            ended_at: execution.ended_at,
        }
    }
}

/// POST /analysis
///
/// Accepts an artifact reference plus subject metadata and schedules a
/// background run. Returns 202 Accepted with the execution id immediately.
pub async fn submit_analysis(
    State(state): State<AppState>,
    Json(request): Json<SubmitAnalysisRequest>,
) -> ApiResult<(StatusCode, Json<SubmitAnalysisResponse>)> {
    let coordinator = Arc::clone(&state.coordinator);
    let execution = coordinator
        .submit(request.artifact_ref, request.subject)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitAnalysisResponse {
            execution_id: execution.execution_id,
            status: execution.status,
            created_at: execution.created_at,
        }),
    ))
}

/// GET /analysis/:id
///
/// Poll the latest durable snapshot: status, ordered per-stage results with
/// confidence flags, and error detail when terminal-failed.
pub async fn analysis_status(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisStatusResponse>> {
    let execution = state
        .coordinator
        .poll(execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown execution: {}", execution_id)))?;

    Ok(Json(AnalysisStatusResponse::from_execution(execution)))
}

/// POST /analysis/:id/cancel
///
/// Best-effort cooperative cancellation; returns the current snapshot.
pub async fn cancel_analysis(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> ApiResult<Json<AnalysisStatusResponse>> {
    let execution = state
        .coordinator
        .cancel(execution_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Unknown execution: {}", execution_id)))?;

    Ok(Json(AnalysisStatusResponse::from_execution(execution)))
}

/// Build analysis workflow routes
pub fn analysis_routes() -> Router<AppState> {
    Router::new()
        .route("/analysis", post(submit_analysis))
        .route("/analysis/:id", get(analysis_status))
        .route("/analysis/:id/cancel", post(cancel_analysis))
}
