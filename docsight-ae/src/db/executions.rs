//! Execution snapshot persistence
//!
//! Full snapshots are written on every commit so polling clients always see
//! a consistent execution. Complex fields (subject, stage results) are
//! stored as JSON text columns.

use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docsight_common::{Error, Result};

use crate::db::retry_on_lock;
use crate::models::{Execution, ExecutionStatus, StageRecord, Subject};

/// Upsert an execution snapshot
pub async fn save_execution(pool: &SqlitePool, execution: &Execution) -> Result<()> {
    // Prepare all data BEFORE acquiring a database connection
    let execution_id = execution.execution_id.to_string();
    let status = serde_json::to_string(&execution.status)
        .map_err(|e| Error::Internal(format!("Failed to serialize status: {}", e)))?;
    let subject = serde_json::to_string(&execution.subject)
        .map_err(|e| Error::Internal(format!("Failed to serialize subject: {}", e)))?;
    let stage_results = serde_json::to_string(&execution.stage_results)
        .map_err(|e| Error::Internal(format!("Failed to serialize stage results: {}", e)))?;
    let created_at = execution.created_at.to_rfc3339();
    let ended_at = execution.ended_at.map(|dt| dt.to_rfc3339());
    let current_stage = execution.current_stage as i64;
    let artifact_ref = execution.artifact_ref.clone();
    let error = execution.error.clone();

    retry_on_lock("save_execution", 5000, || async {
        sqlx::query(
            r#"
            INSERT INTO executions (
                execution_id, artifact_ref, subject, status,
                stage_results, current_stage, error, created_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(execution_id) DO UPDATE SET
                status = excluded.status,
                stage_results = excluded.stage_results,
                current_stage = excluded.current_stage,
                error = excluded.error,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&execution_id)
        .bind(&artifact_ref)
        .bind(&subject)
        .bind(&status)
        .bind(&stage_results)
        .bind(current_stage)
        .bind(&error)
        .bind(&created_at)
        .bind(&ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Load an execution snapshot by id
pub async fn load_execution(pool: &SqlitePool, execution_id: Uuid) -> Result<Option<Execution>> {
    let row = sqlx::query(
        r#"
        SELECT execution_id, artifact_ref, subject, status,
               stage_results, current_stage, error, created_at, ended_at
        FROM executions
        WHERE execution_id = ?
        "#,
    )
    .bind(execution_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let status: String = row.get("status");
    let status: ExecutionStatus = serde_json::from_str(&status)
        .map_err(|e| Error::Internal(format!("Failed to deserialize status: {}", e)))?;

    let subject: String = row.get("subject");
    let subject: Subject = serde_json::from_str(&subject)
        .map_err(|e| Error::Internal(format!("Failed to deserialize subject: {}", e)))?;

    let stage_results: String = row.get("stage_results");
    let stage_results: Vec<StageRecord> = serde_json::from_str(&stage_results)
        .map_err(|e| Error::Internal(format!("Failed to deserialize stage results: {}", e)))?;

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
        .with_timezone(&chrono::Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&chrono::Utc));

    Ok(Some(Execution {
        execution_id,
        artifact_ref: row.get("artifact_ref"),
        subject,
        status,
        stage_results,
        current_stage: row.get::<i64, _>("current_stage") as usize,
        error: row.get("error"),
        created_at,
        ended_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::{ConfidenceFlag, Stage, StageOutcome, StagePayload, SignalScores};

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let pool = memory_pool().await;
        let mut execution = Execution::new("reports/q3.txt".to_string(), Subject::default());
        execution.transition_to(ExecutionStatus::Running);
        execution.record_stage(StageRecord {
            stage: Stage::SignalScoring,
            outcome: StageOutcome::Success,
            payload: Some(StagePayload::Signals(SignalScores {
                credibility: 0.8,
                rigor: 0.7,
                transparency: 0.6,
                composite: 0.72,
            })),
            cache_hit: false,
            confidence: ConfidenceFlag::Full,
            duration_ms: 5,
        });

        save_execution(&pool, &execution).await.unwrap();

        let loaded = load_execution(&pool, execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Running);
        assert_eq!(loaded.stage_results.len(), 1);
        assert_eq!(loaded.current_stage, 1);
        assert_eq!(loaded.artifact_ref, "reports/q3.txt");
    }

    #[tokio::test]
    async fn unknown_id_is_none() {
        let pool = memory_pool().await;
        let loaded = load_execution(&pool, Uuid::new_v4()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn upsert_overwrites_snapshot() {
        let pool = memory_pool().await;
        let mut execution = Execution::new("a.txt".to_string(), Subject::default());
        save_execution(&pool, &execution).await.unwrap();

        execution.transition_to(ExecutionStatus::Running);
        execution.transition_to(ExecutionStatus::Failed);
        execution.error = Some("dependency unreachable".to_string());
        save_execution(&pool, &execution).await.unwrap();

        let loaded = load_execution(&pool, execution.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.status, ExecutionStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("dependency unreachable"));
        assert!(loaded.ended_at.is_some());
    }
}
