//! Finalized assessment persistence
//!
//! Exactly one durable record per completed execution. Inserts are
//! idempotent on execution_id: retrying with the same id never creates a
//! duplicate.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use docsight_common::{Error, Result};

use crate::models::AssessmentRecord;

/// Insert a finalized assessment.
///
/// Returns true when a row was written, false when a record for this
/// execution id already existed (idempotent re-run).
pub async fn insert_assessment(pool: &SqlitePool, record: &AssessmentRecord) -> Result<bool> {
    let payload = serde_json::to_string(record)
        .map_err(|e| Error::Internal(format!("Failed to serialize assessment: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT INTO assessments (execution_id, artifact_ref, overall_score, payload, created_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(execution_id) DO NOTHING
        "#,
    )
    .bind(record.execution_id.to_string())
    .bind(&record.artifact_ref)
    .bind(record.overall_score)
    .bind(&payload)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Load a finalized assessment by execution id
pub async fn load_assessment(
    pool: &SqlitePool,
    execution_id: Uuid,
) -> Result<Option<AssessmentRecord>> {
    let row = sqlx::query("SELECT payload FROM assessments WHERE execution_id = ?")
        .bind(execution_id.to_string())
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let payload: String = row.get("payload");
    let record: AssessmentRecord = serde_json::from_str(&payload)
        .map_err(|e| Error::Internal(format!("Failed to deserialize assessment: {}", e)))?;

    Ok(Some(record))
}

/// Count stored assessments for an execution id (used by idempotency tests)
pub async fn count_assessments(pool: &SqlitePool, execution_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM assessments WHERE execution_id = ?")
            .bind(execution_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::{KnowledgeMatches, SignalScores, SocialEvidence, WebEvidence};

    fn test_record(execution_id: Uuid) -> AssessmentRecord {
        AssessmentRecord {
            execution_id,
            artifact_ref: "reports/q3.txt".to_string(),
            overall_score: 0.73,
            signals: SignalScores {
                credibility: 0.8,
                rigor: 0.7,
                transparency: 0.6,
                composite: 0.72,
            },
            summary: "Quarterly report".to_string(),
            web_evidence: WebEvidence::degraded(),
            social_evidence: SocialEvidence::degraded(),
            related: KnowledgeMatches { matches: vec![] },
        }
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let pool = memory_pool().await;
        let id = Uuid::new_v4();
        let record = test_record(id);

        assert!(insert_assessment(&pool, &record).await.unwrap());
        assert!(!insert_assessment(&pool, &record).await.unwrap());
        assert_eq!(count_assessments(&pool, id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_round_trip() {
        let pool = memory_pool().await;
        let id = Uuid::new_v4();
        insert_assessment(&pool, &test_record(id)).await.unwrap();

        let loaded = load_assessment(&pool, id).await.unwrap().unwrap();
        assert_eq!(loaded.execution_id, id);
        assert_eq!(loaded.overall_score, 0.73);
    }
}
