//! Data models for docsight-ae (Analysis Engine microservice)
//!
//! - Execution state machine and per-stage result records
//! - Typed stage payload contracts passed between pipeline stages

pub mod execution;
pub mod payloads;

pub use execution::{
    ConfidenceFlag, Execution, ExecutionStatus, Stage, StageOutcome, StageRecord, StatusTransition,
    Subject,
};
pub use payloads::{
    AnalysisReport, AnalysisScores, AssessmentRecord, Claim, ExtractedDocument, KnowledgeMatches,
    PersistReceipt, SimilarMatch, SocialEvidence, SocialPost, StagePayload, SignalScores,
    WebEvidence, WebSnippet,
};
