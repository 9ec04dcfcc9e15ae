//! Execution coordinator
//!
//! Drives the seven-stage pipeline for each submitted artifact:
//! - submit() persists a Pending execution and schedules one background
//!   task, returning immediately
//! - core stages run strictly sequentially; enrichment stages fan out
//!   concurrently once Extraction commits and fan back in before
//!   Persistence
//! - enrichment failures degrade to Fallback; core failures stop the
//!   pipeline and mark the execution Failed
//! - cancellation is cooperative: a token checked between stages, with the
//!   in-flight gateway call left to finish or time out on its own
//!
//! Every stage's canonical input is computed only from the artifact and
//! prior committed stage outputs, never from wall-clock time or call-site
//! randomness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docsight_common::config::PipelineConfig;
use docsight_common::events::{AnalysisEvent, EventBus};
use docsight_common::{Error, Result};

use crate::artifact::ArtifactStore;
use crate::cache::DeterministicCache;
use crate::gateways::{
    InferenceProvider, SimilarityProvider, SocialSearchProvider, WebSearchProvider,
};
use crate::models::{
    AnalysisReport, Execution, ExecutionStatus, ExtractedDocument, Stage, StageOutcome,
    StageRecord, Subject,
};
use crate::pipeline::StatusStore;
use crate::stages::{
    self, extraction, knowledge_retrieval, persistence, primary_analysis, signal_scoring,
    social_enrichment, web_enrichment, StageExecution,
};

/// External dependencies injected at construction
pub struct CoordinatorDeps {
    pub inference: Arc<dyn InferenceProvider>,
    pub web: Arc<dyn WebSearchProvider>,
    pub social: Arc<dyn SocialSearchProvider>,
    pub similarity: Arc<dyn SimilarityProvider>,
}

pub struct Coordinator {
    db: SqlitePool,
    status: StatusStore,
    cache: DeterministicCache,
    artifacts: ArtifactStore,
    deps: CoordinatorDeps,
    events: EventBus,
    cancel_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    config: PipelineConfig,
    /// Top-k requested from the similarity store
    top_k: u32,
}

impl Coordinator {
    pub fn new(
        db: SqlitePool,
        artifacts: ArtifactStore,
        deps: CoordinatorDeps,
        events: EventBus,
        config: PipelineConfig,
        top_k: u32,
    ) -> Self {
        let status = StatusStore::new(db.clone());
        let cache = DeterministicCache::new(db.clone(), config.cache_ttl_secs);
        Self {
            db,
            status,
            cache,
            artifacts,
            deps,
            events,
            cancel_tokens: Arc::new(RwLock::new(HashMap::new())),
            config,
            top_k,
        }
    }

    /// Accept a submission and schedule the background run.
    ///
    /// Non-blocking: the returned execution is Pending; callers poll until
    /// a terminal status.
    pub async fn submit(
        self: Arc<Self>,
        artifact_ref: String,
        subject: Subject,
    ) -> Result<Execution> {
        self.artifacts.validate_ref(&artifact_ref)?;

        let execution = Execution::new(artifact_ref, subject);
        self.status.create(&execution).await?;

        let token = CancellationToken::new();
        self.cancel_tokens
            .write()
            .await
            .insert(execution.execution_id, token.clone());

        let _ = self.events.emit(AnalysisEvent::ExecutionSubmitted {
            execution_id: execution.execution_id,
            artifact_ref: execution.artifact_ref.clone(),
        });

        tracing::info!(
            execution_id = %execution.execution_id,
            artifact_ref = %execution.artifact_ref,
            "Execution submitted, scheduling background run"
        );

        let coordinator = Arc::clone(&self);
        let background = execution.clone();
        tokio::spawn(async move {
            coordinator.run_pipeline(background, token).await;
        });

        Ok(execution)
    }

    /// Poll the latest durable snapshot
    pub async fn poll(&self, execution_id: Uuid) -> Result<Option<Execution>> {
        self.status.get(execution_id).await
    }

    /// Request best-effort cancellation.
    ///
    /// The flag is checked between stages; a currently-running gateway call
    /// finishes or times out rather than being forcibly interrupted.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<Option<Execution>> {
        if let Some(token) = self.cancel_tokens.read().await.get(&execution_id) {
            tracing::info!(execution_id = %execution_id, "Cancellation requested");
            token.cancel();
        }
        self.status.get(execution_id).await
    }

    /// One background task per execution. Arms the wall-clock watchdog,
    /// drives the stage loop, and settles cleanup regardless of outcome.
    async fn run_pipeline(self: Arc<Self>, mut execution: Execution, token: CancellationToken) {
        let execution_id = execution.execution_id;
        let timed_out = Arc::new(AtomicBool::new(false));

        // Watchdog: the wall-clock budget triggers cooperative cancellation
        let watchdog = {
            let token = token.clone();
            let timed_out = Arc::clone(&timed_out);
            let budget = Duration::from_secs(self.config.execution_timeout_secs);
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                timed_out.store(true, Ordering::SeqCst);
                token.cancel();
            })
        };

        if let Err(e) = Arc::clone(&self).drive(&mut execution, &token, &timed_out).await {
            tracing::error!(
                execution_id = %execution_id,
                error = %e,
                "Pipeline run aborted on internal error"
            );
            let detail = format!("Internal error: {}", e);
            if let Err(e) = self
                .status
                .set_status(&mut execution, ExecutionStatus::Failed, Some(detail.clone()))
                .await
            {
                tracing::error!(execution_id = %execution_id, error = %e, "Failed to persist failure status");
            }
            let _ = self.events.emit(AnalysisEvent::ExecutionFailed {
                execution_id,
                error: detail,
            });
        }

        watchdog.abort();
        self.cancel_tokens.write().await.remove(&execution_id);
    }

    /// The stage loop. Returns Err only on status-store failures; stage and
    /// gateway errors are classified into outcomes and never surface here.
    async fn drive(
        self: Arc<Self>,
        execution: &mut Execution,
        token: &CancellationToken,
        timed_out: &AtomicBool,
    ) -> Result<()> {
        self.status
            .set_status(execution, ExecutionStatus::Running, None)
            .await?;
        let _ = self.events.emit(AnalysisEvent::ExecutionStarted {
            execution_id: execution.execution_id,
        });

        // ── Extraction ──────────────────────────────────────────────────
        if self.finish_if_cancelled(execution, token, timed_out).await? {
            return Ok(());
        }
        self.emit_stage_started(execution.execution_id, Stage::Extraction);

        let started = Instant::now();
        let raw = match self.artifacts.load(&execution.artifact_ref) {
            Ok(raw) => raw,
            Err(e) => {
                // Unreadable artifact: fatal input error, no retry
                let result = StageExecution::failed(format!("Unreadable artifact: {}", e));
                self.commit(
                    execution,
                    Stage::Extraction,
                    result,
                    false,
                    started.elapsed().as_millis() as u64,
                )
                .await?;
                return Ok(());
            }
        };

        let extraction_input = json!({
            "artifact_ref": execution.artifact_ref,
            "content_hash": raw.content_hash,
        });
        let (result, cache_hit, duration_ms) = self
            .run_cached(Stage::Extraction, &extraction_input, || async {
                extraction::run(&raw)
            })
            .await;
        self.commit(execution, Stage::Extraction, result, cache_hit, duration_ms)
            .await?;
        if execution.is_terminal() {
            return Ok(());
        }

        let document = self.committed_extraction(execution)?;

        // ── Enrichment fan-out (web ∥ social) ───────────────────────────
        // Canonical inputs derive only from the committed extraction output
        let query = stages::enrichment_query(&document);
        let enrichment_input = json!({ "query": query });

        self.emit_stage_started(execution.execution_id, Stage::WebEnrichment);
        let web_handle = {
            let this = Arc::clone(&self);
            let input = enrichment_input.clone();
            let query = query.clone();
            tokio::spawn(async move {
                this.run_cached(Stage::WebEnrichment, &input, || async {
                    web_enrichment::run(this.deps.web.as_ref(), &query).await
                })
                .await
            })
        };

        self.emit_stage_started(execution.execution_id, Stage::SocialEnrichment);
        let social_handle = {
            let this = Arc::clone(&self);
            let input = enrichment_input.clone();
            let query = query.clone();
            tokio::spawn(async move {
                this.run_cached(Stage::SocialEnrichment, &input, || async {
                    social_enrichment::run(this.deps.social.as_ref(), &query).await
                })
                .await
            })
        };

        // ── Primary analysis ────────────────────────────────────────────
        if self.finish_if_cancelled(execution, token, timed_out).await? {
            Self::discard_enrichment(web_handle, social_handle).await;
            return Ok(());
        }
        self.emit_stage_started(execution.execution_id, Stage::PrimaryAnalysis);

        let analysis_input = canonical_value(&document)?;
        let (result, cache_hit, duration_ms) = self
            .run_cached(Stage::PrimaryAnalysis, &analysis_input, || async {
                primary_analysis::run(self.deps.inference.as_ref(), &document).await
            })
            .await;
        self.commit(
            execution,
            Stage::PrimaryAnalysis,
            result,
            cache_hit,
            duration_ms,
        )
        .await?;
        if execution.is_terminal() {
            Self::discard_enrichment(web_handle, social_handle).await;
            return Ok(());
        }

        let report = self.committed_analysis(execution)?;

        // ── Signal scoring ──────────────────────────────────────────────
        if self.finish_if_cancelled(execution, token, timed_out).await? {
            Self::discard_enrichment(web_handle, social_handle).await;
            return Ok(());
        }
        self.emit_stage_started(execution.execution_id, Stage::SignalScoring);

        let scoring_input = canonical_value(&report)?;
        let (result, cache_hit, duration_ms) = self
            .run_cached(Stage::SignalScoring, &scoring_input, || async {
                signal_scoring::run(&report)
            })
            .await;
        self.commit(
            execution,
            Stage::SignalScoring,
            result,
            cache_hit,
            duration_ms,
        )
        .await?;
        if execution.is_terminal() {
            Self::discard_enrichment(web_handle, social_handle).await;
            return Ok(());
        }

        // ── Enrichment fan-in ───────────────────────────────────────────
        // Committed in pipeline order regardless of completion order; the
        // coordinator stays the sole status writer.
        let (web_result, web_hit, web_ms) = join_enrichment(web_handle, Stage::WebEnrichment).await;
        self.commit(execution, Stage::WebEnrichment, web_result, web_hit, web_ms)
            .await?;

        let (social_result, social_hit, social_ms) =
            join_enrichment(social_handle, Stage::SocialEnrichment).await;
        self.commit(
            execution,
            Stage::SocialEnrichment,
            social_result,
            social_hit,
            social_ms,
        )
        .await?;

        // ── Knowledge retrieval ─────────────────────────────────────────
        if self.finish_if_cancelled(execution, token, timed_out).await? {
            return Ok(());
        }
        self.emit_stage_started(execution.execution_id, Stage::KnowledgeRetrieval);

        let retrieval_input = json!({ "text": report.summary, "top_k": self.top_k });
        let (result, cache_hit, duration_ms) = self
            .run_cached(Stage::KnowledgeRetrieval, &retrieval_input, || async {
                knowledge_retrieval::run(self.deps.similarity.as_ref(), &report.summary, self.top_k)
                    .await
            })
            .await;
        self.commit(
            execution,
            Stage::KnowledgeRetrieval,
            result,
            cache_hit,
            duration_ms,
        )
        .await?;
        if execution.is_terminal() {
            return Ok(());
        }

        // ── Persistence ─────────────────────────────────────────────────
        // Never served from cache: a hit would skip the durable write.
        // Idempotency on execution_id covers re-runs instead.
        if self.finish_if_cancelled(execution, token, timed_out).await? {
            return Ok(());
        }
        self.emit_stage_started(execution.execution_id, Stage::Persistence);

        let started = Instant::now();
        let result = persistence::run(&self.db, execution).await;
        let overall_score = result
            .payload
            .as_ref()
            .and_then(|p| p.as_persisted())
            .map(|r| r.overall_score);
        self.commit(
            execution,
            Stage::Persistence,
            result,
            false,
            started.elapsed().as_millis() as u64,
        )
        .await?;
        if execution.is_terminal() {
            return Ok(());
        }

        self.status
            .set_status(execution, ExecutionStatus::Completed, None)
            .await?;
        let _ = self.events.emit(AnalysisEvent::ExecutionCompleted {
            execution_id: execution.execution_id,
            overall_score: overall_score.unwrap_or_default(),
        });

        tracing::info!(
            execution_id = %execution.execution_id,
            stages = execution.stage_results.len(),
            "Execution completed"
        );

        Ok(())
    }

    /// Consult the cache, invoke the adapter on a miss, and populate the
    /// cache on success. Returns (result, cache_hit, duration_ms).
    async fn run_cached<F, Fut>(
        &self,
        stage: Stage,
        canonical_input: &serde_json::Value,
        op: F,
    ) -> (StageExecution, bool, u64)
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = StageExecution>,
    {
        let started = Instant::now();

        if let Some(payload) = self.cache.get(stage, canonical_input).await {
            tracing::debug!(stage = %stage, "Cache hit, replaying committed payload");
            return (
                StageExecution::success(payload),
                true,
                started.elapsed().as_millis() as u64,
            );
        }

        let result = op().await;

        if result.outcome == StageOutcome::Success {
            if let Some(payload) = &result.payload {
                self.cache.put(stage, canonical_input, payload).await;
            }
        }

        (result, false, started.elapsed().as_millis() as u64)
    }

    /// Commit a stage result; a Failed outcome marks the execution Failed
    /// and stops the pipeline.
    async fn commit(
        &self,
        execution: &mut Execution,
        stage: Stage,
        result: StageExecution,
        cache_hit: bool,
        duration_ms: u64,
    ) -> Result<()> {
        let outcome = result.outcome;
        let error = result.error.clone();

        let record = StageRecord {
            stage,
            outcome,
            payload: result.payload,
            cache_hit,
            confidence: result.confidence,
            duration_ms,
        };
        self.status.commit_stage(execution, record).await?;

        let _ = self.events.emit(AnalysisEvent::StageCompleted {
            execution_id: execution.execution_id,
            stage: stage.as_str().to_string(),
            outcome: outcome_str(outcome).to_string(),
            cache_hit,
            duration_ms,
        });

        if outcome == StageOutcome::Failed {
            let detail = error.unwrap_or_else(|| format!("{} failed", stage));
            tracing::error!(
                execution_id = %execution.execution_id,
                stage = %stage,
                error = %detail,
                "Core stage failed, stopping pipeline"
            );
            self.status
                .set_status(execution, ExecutionStatus::Failed, Some(detail.clone()))
                .await?;
            let _ = self.events.emit(AnalysisEvent::ExecutionFailed {
                execution_id: execution.execution_id,
                error: detail,
            });
        }

        Ok(())
    }

    /// Check the cooperative flag between stages; settle the terminal state
    /// when it fired. Returns true when the pipeline must stop.
    async fn finish_if_cancelled(
        &self,
        execution: &mut Execution,
        token: &CancellationToken,
        timed_out: &AtomicBool,
    ) -> Result<bool> {
        if !token.is_cancelled() {
            return Ok(false);
        }

        if timed_out.load(Ordering::SeqCst) {
            let detail = "Execution wall-clock timeout exceeded".to_string();
            tracing::warn!(execution_id = %execution.execution_id, "Execution timed out");
            self.status
                .set_status(execution, ExecutionStatus::Failed, Some(detail.clone()))
                .await?;
            let _ = self.events.emit(AnalysisEvent::ExecutionFailed {
                execution_id: execution.execution_id,
                error: detail,
            });
        } else {
            tracing::info!(execution_id = %execution.execution_id, "Execution cancelled");
            self.status
                .set_status(execution, ExecutionStatus::Cancelled, None)
                .await?;
            let _ = self.events.emit(AnalysisEvent::ExecutionCancelled {
                execution_id: execution.execution_id,
            });
        }

        Ok(true)
    }

    fn emit_stage_started(&self, execution_id: Uuid, stage: Stage) {
        let _ = self.events.emit(AnalysisEvent::StageStarted {
            execution_id,
            stage: stage.as_str().to_string(),
        });
    }

    fn committed_extraction(&self, execution: &Execution) -> Result<ExtractedDocument> {
        execution
            .stage_result(Stage::Extraction)
            .and_then(|r| r.payload.as_ref())
            .and_then(|p| p.as_extracted())
            .cloned()
            .ok_or_else(|| Error::Internal("Committed extraction payload missing".to_string()))
    }

    fn committed_analysis(&self, execution: &Execution) -> Result<AnalysisReport> {
        execution
            .stage_result(Stage::PrimaryAnalysis)
            .and_then(|r| r.payload.as_ref())
            .and_then(|p| p.as_analysis())
            .cloned()
            .ok_or_else(|| Error::Internal("Committed analysis payload missing".to_string()))
    }

    /// After a fatal core failure the in-flight enrichment calls are left
    /// to finish or time out on their own; their results are discarded.
    async fn discard_enrichment(
        web: tokio::task::JoinHandle<(StageExecution, bool, u64)>,
        social: tokio::task::JoinHandle<(StageExecution, bool, u64)>,
    ) {
        let _ = web.await;
        let _ = social.await;
    }
}

/// Canonical JSON for a committed payload used as the next stage's input
fn canonical_value<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize canonical input: {}", e)))
}

fn outcome_str(outcome: StageOutcome) -> &'static str {
    match outcome {
        StageOutcome::Success => "success",
        StageOutcome::Fallback => "fallback",
        StageOutcome::Failed => "failed",
    }
}

/// Join an enrichment task; a panicked task degrades to Fallback like any
/// other enrichment failure.
async fn join_enrichment(
    handle: tokio::task::JoinHandle<(StageExecution, bool, u64)>,
    stage: Stage,
) -> (StageExecution, bool, u64) {
    match handle.await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(stage = %stage, error = %e, "Enrichment task join failed");
            let payload = match stage {
                Stage::SocialEnrichment => crate::models::StagePayload::SocialEvidence(
                    crate::models::SocialEvidence::degraded(),
                ),
                _ => crate::models::StagePayload::WebEvidence(
                    crate::models::WebEvidence::degraded(),
                ),
            };
            (
                StageExecution::fallback(payload, format!("Enrichment task failed: {}", e)),
                false,
                0,
            )
        }
    }
}
