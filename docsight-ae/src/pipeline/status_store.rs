//! Status/progress store
//!
//! Durable execution snapshots with single-writer-per-execution-id
//! discipline: all writes for one execution are serialized through a per-id
//! async mutex so polling clients never observe interleaved partial
//! updates. Downstream stages only ever see inputs built from snapshots
//! committed here.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use docsight_common::Result;

use crate::db::executions;
use crate::models::{Execution, ExecutionStatus, StageRecord, StatusTransition};

#[derive(Clone)]
pub struct StatusStore {
    db: SqlitePool,
    writers: Arc<RwLock<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl StatusStore {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            writers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn writer(&self, execution_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(lock) = self.writers.read().await.get(&execution_id) {
            return lock.clone();
        }
        self.writers
            .write()
            .await
            .entry(execution_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Persist a newly submitted execution
    pub async fn create(&self, execution: &Execution) -> Result<()> {
        let lock = self.writer(execution.execution_id).await;
        let _guard = lock.lock().await;
        executions::save_execution(&self.db, execution).await
    }

    /// Commit one stage result and persist the updated snapshot.
    ///
    /// The record becomes visible to downstream consumers only after the
    /// snapshot write completes.
    pub async fn commit_stage(
        &self,
        execution: &mut Execution,
        record: StageRecord,
    ) -> Result<()> {
        let lock = self.writer(execution.execution_id).await;
        let _guard = lock.lock().await;
        execution.record_stage(record);
        executions::save_execution(&self.db, execution).await
    }

    /// Transition execution status and persist.
    ///
    /// Terminal states are immutable: an attempt to move past one is logged
    /// and ignored. The writer entry is released once a terminal snapshot
    /// is durable.
    pub async fn set_status(
        &self,
        execution: &mut Execution,
        status: ExecutionStatus,
        error: Option<String>,
    ) -> Result<Option<StatusTransition>> {
        let lock = self.writer(execution.execution_id).await;
        let guard = lock.lock().await;

        let Some(transition) = execution.transition_to(status) else {
            tracing::warn!(
                execution_id = %execution.execution_id,
                current = ?execution.status,
                requested = ?status,
                "Ignoring status transition past terminal state"
            );
            return Ok(None);
        };

        if error.is_some() {
            execution.error = error;
        }

        executions::save_execution(&self.db, execution).await?;
        drop(guard);

        if status.is_terminal() {
            self.writers.write().await.remove(&execution.execution_id);
        }

        Ok(Some(transition))
    }

    /// Load the latest snapshot for polling
    pub async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>> {
        executions::load_execution(&self.db, execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::{ConfidenceFlag, Stage, StageOutcome, Subject};

    #[tokio::test]
    async fn create_then_get() {
        let store = StatusStore::new(memory_pool().await);
        let execution = Execution::new("doc.txt".to_string(), Subject::default());
        store.create(&execution).await.unwrap();

        let snapshot = store.get(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Pending);
    }

    #[tokio::test]
    async fn terminal_status_is_immutable_in_store() {
        let store = StatusStore::new(memory_pool().await);
        let mut execution = Execution::new("doc.txt".to_string(), Subject::default());
        store.create(&execution).await.unwrap();

        store
            .set_status(&mut execution, ExecutionStatus::Running, None)
            .await
            .unwrap();
        store
            .set_status(&mut execution, ExecutionStatus::Cancelled, None)
            .await
            .unwrap();

        let ignored = store
            .set_status(&mut execution, ExecutionStatus::Completed, None)
            .await
            .unwrap();
        assert!(ignored.is_none());

        let snapshot = store.get(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(snapshot.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn committed_stage_is_visible_in_snapshot() {
        let store = StatusStore::new(memory_pool().await);
        let mut execution = Execution::new("doc.txt".to_string(), Subject::default());
        store.create(&execution).await.unwrap();

        store
            .commit_stage(
                &mut execution,
                StageRecord {
                    stage: Stage::Extraction,
                    outcome: StageOutcome::Success,
                    payload: None,
                    cache_hit: false,
                    confidence: ConfidenceFlag::Full,
                    duration_ms: 3,
                },
            )
            .await
            .unwrap();

        let snapshot = store.get(execution.execution_id).await.unwrap().unwrap();
        assert_eq!(snapshot.stage_results.len(), 1);
        assert_eq!(snapshot.current_stage, 1);
    }
}
