//! Execution State Machine Tests
//!
//! Covers status transitions, terminal immutability, and aggregate status
//! derivation from committed stage results.

use docsight_ae::models::{
    ConfidenceFlag, Execution, ExecutionStatus, Stage, StageOutcome, StageRecord, Subject,
};

/// Helper function to create a test execution
fn create_test_execution() -> Execution {
    Execution::new("reports/q3.txt".to_string(), Subject::default())
}

fn record(stage: Stage, outcome: StageOutcome) -> StageRecord {
    StageRecord {
        stage,
        outcome,
        payload: None,
        cache_hit: false,
        confidence: if outcome == StageOutcome::Success {
            ConfidenceFlag::Full
        } else {
            ConfidenceFlag::Low
        },
        duration_ms: 1,
    }
}

#[test]
fn pending_to_running_transition() {
    // Given: a freshly submitted execution
    let mut execution = create_test_execution();
    assert_eq!(execution.status, ExecutionStatus::Pending);

    // When: the background run starts
    let transition = execution.transition_to(ExecutionStatus::Running).unwrap();

    // Then: the transition records old and new states
    assert_eq!(transition.old_status, ExecutionStatus::Pending);
    assert_eq!(transition.new_status, ExecutionStatus::Running);
    assert_eq!(execution.status, ExecutionStatus::Running);
    assert!(execution.ended_at.is_none());
}

#[test]
fn running_to_completed_sets_end_time() {
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    execution.transition_to(ExecutionStatus::Completed).unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert!(execution.ended_at.is_some());
    assert!(execution.is_terminal());
}

#[test]
fn all_terminal_states_are_immutable() {
    for terminal in [
        ExecutionStatus::Completed,
        ExecutionStatus::Failed,
        ExecutionStatus::Cancelled,
    ] {
        let mut execution = create_test_execution();
        execution.transition_to(ExecutionStatus::Running).unwrap();
        execution.transition_to(terminal).unwrap();
        let ended_at = execution.ended_at;

        // No transition out of a terminal state is ever accepted
        for next in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert!(execution.transition_to(next).is_none());
        }
        assert_eq!(execution.status, terminal);
        assert_eq!(execution.ended_at, ended_at);
    }
}

#[test]
fn stage_commits_advance_the_cursor() {
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    execution.record_stage(record(Stage::Extraction, StageOutcome::Success));
    assert_eq!(execution.current_stage, 1);

    execution.record_stage(record(Stage::PrimaryAnalysis, StageOutcome::Success));
    assert_eq!(execution.current_stage, 2);

    assert!(execution.stage_result(Stage::Extraction).is_some());
    assert!(execution.stage_result(Stage::Persistence).is_none());
}

#[test]
fn derive_status_requires_persistence_success() {
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    for stage in [
        Stage::Extraction,
        Stage::PrimaryAnalysis,
        Stage::SignalScoring,
        Stage::WebEnrichment,
        Stage::SocialEnrichment,
        Stage::KnowledgeRetrieval,
    ] {
        execution.record_stage(record(stage, StageOutcome::Success));
    }
    // All stages but Persistence: still running
    assert_eq!(execution.derive_status(), ExecutionStatus::Running);

    execution.record_stage(record(Stage::Persistence, StageOutcome::Success));
    assert_eq!(execution.derive_status(), ExecutionStatus::Completed);
}

#[test]
fn derive_status_tolerates_enrichment_fallback() {
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    execution.record_stage(record(Stage::Extraction, StageOutcome::Success));
    execution.record_stage(record(Stage::PrimaryAnalysis, StageOutcome::Success));
    execution.record_stage(record(Stage::SignalScoring, StageOutcome::Success));
    execution.record_stage(record(Stage::WebEnrichment, StageOutcome::Fallback));
    execution.record_stage(record(Stage::SocialEnrichment, StageOutcome::Fallback));
    execution.record_stage(record(Stage::KnowledgeRetrieval, StageOutcome::Success));
    execution.record_stage(record(Stage::Persistence, StageOutcome::Success));

    assert_eq!(execution.derive_status(), ExecutionStatus::Completed);
}

#[test]
fn derive_status_fails_on_any_failed_stage() {
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    execution.record_stage(record(Stage::Extraction, StageOutcome::Success));
    execution.record_stage(record(Stage::PrimaryAnalysis, StageOutcome::Failed));

    assert_eq!(execution.derive_status(), ExecutionStatus::Failed);
}

#[test]
fn derive_status_treats_core_fallback_as_failure() {
    // A degraded core result would make scores non-reproducible; only
    // enrichment stages may fall back
    let mut execution = create_test_execution();
    execution.transition_to(ExecutionStatus::Running).unwrap();

    execution.record_stage(record(Stage::Extraction, StageOutcome::Success));
    execution.record_stage(record(Stage::PrimaryAnalysis, StageOutcome::Fallback));

    assert_eq!(execution.derive_status(), ExecutionStatus::Failed);
}
