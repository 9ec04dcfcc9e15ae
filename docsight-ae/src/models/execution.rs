//! Execution state machine
//!
//! One Execution record per submitted artifact. Status progresses
//! PENDING → RUNNING → {COMPLETED, FAILED, CANCELLED}; terminal states are
//! immutable and never regress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::payloads::StagePayload;

/// Pipeline stage identifiers, in pipeline order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw artifact → structured document
    Extraction,
    /// Deterministic inference producing scores and narrative
    PrimaryAnalysis,
    /// Deterministic signal scores derived from the analysis
    SignalScoring,
    /// Web search evidence (skippable)
    WebEnrichment,
    /// Social search evidence (skippable)
    SocialEnrichment,
    /// Similarity store matches feeding the final score
    KnowledgeRetrieval,
    /// Durable composite record write
    Persistence,
}

impl Stage {
    /// All stages in pipeline order
    pub const PIPELINE: [Stage; 7] = [
        Stage::Extraction,
        Stage::PrimaryAnalysis,
        Stage::SignalScoring,
        Stage::WebEnrichment,
        Stage::SocialEnrichment,
        Stage::KnowledgeRetrieval,
        Stage::Persistence,
    ];

    /// Stable name used for cache keys, events, and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Extraction => "extraction",
            Stage::PrimaryAnalysis => "primary_analysis",
            Stage::SignalScoring => "signal_scoring",
            Stage::WebEnrichment => "web_enrichment",
            Stage::SocialEnrichment => "social_enrichment",
            Stage::KnowledgeRetrieval => "knowledge_retrieval",
            Stage::Persistence => "persistence",
        }
    }

    /// Core stages abort the execution on failure
    pub fn is_core(&self) -> bool {
        !self.is_enrichment()
    }

    /// Enrichment stages degrade to Fallback on failure
    pub fn is_enrichment(&self) -> bool {
        matches!(self, Stage::WebEnrichment | Stage::SocialEnrichment)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    /// Accepted, background run not yet started
    Pending,
    /// Pipeline in progress
    Running,
    /// All mandatory stages succeeded (possibly with allowed Fallbacks)
    Completed,
    /// A mandatory stage failed
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Per-stage outcome classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Success,
    /// Primary dependency failed; degraded result substituted
    Fallback,
    Failed,
}

/// Distinguishes fully-enriched results from degraded ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceFlag {
    Full,
    Low,
}

/// Committed result of one pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
    /// Absent when the stage failed before producing output
    pub payload: Option<StagePayload>,
    pub cache_hit: bool,
    pub confidence: ConfidenceFlag,
    pub duration_ms: u64,
}

/// Lightweight subject metadata supplied at submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Status transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub execution_id: Uuid,
    pub old_status: ExecutionStatus,
    pub new_status: ExecutionStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One end-to-end pipeline run for a single submitted artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Unique execution identifier
    pub execution_id: Uuid,

    /// Artifact reference, relative to the root folder
    pub artifact_ref: String,

    /// Subject metadata from the submission
    pub subject: Subject,

    /// Current status
    pub status: ExecutionStatus,

    /// Committed stage results, in pipeline order
    pub stage_results: Vec<StageRecord>,

    /// Index of the next stage to run
    pub current_stage: usize,

    /// Human-readable error detail when terminal-Failed
    pub error: Option<String>,

    /// Submission time
    pub created_at: DateTime<Utc>,

    /// Set when a terminal state is reached
    pub ended_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Create a new pending execution
    pub fn new(artifact_ref: String, subject: Subject) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            artifact_ref,
            subject,
            status: ExecutionStatus::Pending,
            stage_results: Vec::new(),
            current_stage: 0,
            error: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new status
    ///
    /// Terminal states are immutable: a transition attempted after one is
    /// reached returns None and leaves the execution untouched.
    pub fn transition_to(&mut self, new_status: ExecutionStatus) -> Option<StatusTransition> {
        if self.status.is_terminal() {
            return None;
        }

        let transition = StatusTransition {
            execution_id: self.execution_id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;

        if new_status.is_terminal() {
            self.ended_at = Some(Utc::now());
        }

        Some(transition)
    }

    /// Append a committed stage result and advance the stage cursor
    pub fn record_stage(&mut self, record: StageRecord) {
        self.stage_results.push(record);
        self.current_stage = self.stage_results.len();
    }

    /// Find a committed stage result by stage
    pub fn stage_result(&self, stage: Stage) -> Option<&StageRecord> {
        self.stage_results.iter().find(|r| r.stage == stage)
    }

    /// Check if the execution reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Derive the aggregate status from committed stage results.
    ///
    /// Completed only if every mandatory stage reached Success or an allowed
    /// Fallback and Persistence succeeded; Failed if any mandatory stage
    /// Failed; Running otherwise.
    pub fn derive_status(&self) -> ExecutionStatus {
        for record in &self.stage_results {
            if record.outcome == StageOutcome::Failed {
                return ExecutionStatus::Failed;
            }
            if record.stage.is_core() && record.outcome == StageOutcome::Fallback {
                return ExecutionStatus::Failed;
            }
        }

        let persisted = self
            .stage_result(Stage::Persistence)
            .map(|r| r.outcome == StageOutcome::Success)
            .unwrap_or(false);

        if persisted {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Running
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_execution() -> Execution {
        Execution::new("reports/q3.txt".to_string(), Subject::default())
    }

    #[test]
    fn new_execution_is_pending() {
        let exec = test_execution();
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.stage_results.is_empty());
        assert_eq!(exec.current_stage, 0);
        assert!(exec.ended_at.is_none());
    }

    #[test]
    fn terminal_status_never_regresses() {
        let mut exec = test_execution();
        exec.transition_to(ExecutionStatus::Running).unwrap();
        exec.transition_to(ExecutionStatus::Completed).unwrap();
        assert!(exec.ended_at.is_some());

        // Any further transition is refused
        assert!(exec.transition_to(ExecutionStatus::Running).is_none());
        assert!(exec.transition_to(ExecutionStatus::Failed).is_none());
        assert_eq!(exec.status, ExecutionStatus::Completed);
    }

    #[test]
    fn transition_records_old_and_new() {
        let mut exec = test_execution();
        let t = exec.transition_to(ExecutionStatus::Running).unwrap();
        assert_eq!(t.old_status, ExecutionStatus::Pending);
        assert_eq!(t.new_status, ExecutionStatus::Running);
        assert_eq!(t.execution_id, exec.execution_id);
    }

    #[test]
    fn stage_classes() {
        assert!(Stage::Extraction.is_core());
        assert!(Stage::PrimaryAnalysis.is_core());
        assert!(Stage::SignalScoring.is_core());
        assert!(Stage::KnowledgeRetrieval.is_core());
        assert!(Stage::Persistence.is_core());
        assert!(Stage::WebEnrichment.is_enrichment());
        assert!(Stage::SocialEnrichment.is_enrichment());
    }

    #[test]
    fn pipeline_order_is_stable() {
        assert_eq!(Stage::PIPELINE[0], Stage::Extraction);
        assert_eq!(Stage::PIPELINE[6], Stage::Persistence);
        assert_eq!(Stage::PIPELINE.len(), 7);
    }

    #[test]
    fn status_serializes_uppercase() {
        let json = serde_json::to_string(&ExecutionStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
    }
}
