//! Event types for the DocSight event system
//!
//! Provides shared event definitions and the EventBus used for SSE
//! progress streaming.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted while an analysis execution progresses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// Execution accepted and scheduled
    ExecutionSubmitted {
        execution_id: Uuid,
        artifact_ref: String,
    },

    /// Background run started
    ExecutionStarted { execution_id: Uuid },

    /// A stage began executing
    StageStarted {
        execution_id: Uuid,
        stage: String,
    },

    /// A stage committed its result
    StageCompleted {
        execution_id: Uuid,
        stage: String,
        outcome: String,
        cache_hit: bool,
        duration_ms: u64,
    },

    /// Execution reached Completed
    ExecutionCompleted {
        execution_id: Uuid,
        overall_score: f64,
    },

    /// Execution reached Failed
    ExecutionFailed {
        execution_id: Uuid,
        error: String,
    },

    /// Execution reached Cancelled
    ExecutionCancelled { execution_id: Uuid },
}

impl AnalysisEvent {
    /// Event type string used as the SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ExecutionSubmitted { .. } => "execution_submitted",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::StageStarted { .. } => "stage_started",
            Self::StageCompleted { .. } => "stage_completed",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::ExecutionCancelled { .. } => "execution_cancelled",
        }
    }

    /// Execution this event belongs to
    pub fn execution_id(&self) -> Uuid {
        match self {
            Self::ExecutionSubmitted { execution_id, .. }
            | Self::ExecutionStarted { execution_id }
            | Self::StageStarted { execution_id, .. }
            | Self::StageCompleted { execution_id, .. }
            | Self::ExecutionCompleted { execution_id, .. }
            | Self::ExecutionFailed { execution_id, .. }
            | Self::ExecutionCancelled { execution_id } => *execution_id,
        }
    }
}

/// Central event distribution bus
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// A send error means no subscribers are currently listening; emitters
    /// treat that as non-fatal.
    pub fn emit(&self, event: AnalysisEvent) -> std::result::Result<usize, String> {
        self.tx.send(event).map_err(|e| e.to_string())
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
