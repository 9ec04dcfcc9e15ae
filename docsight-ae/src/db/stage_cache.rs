//! Stage cache table access
//!
//! Row-level operations only; canonicalization and corruption handling live
//! in the cache module.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use docsight_common::Result;

/// A raw cache row
#[derive(Debug, Clone)]
pub struct CacheRow {
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: Option<i64>,
}

impl CacheRow {
    /// TTL check against now; rows without a TTL never expire
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            Some(ttl) => (now - self.created_at).num_seconds() >= ttl,
            None => false,
        }
    }
}

/// Fetch a cache row by (stage, input hash)
pub async fn get_entry(
    pool: &SqlitePool,
    stage_name: &str,
    input_hash: &str,
) -> Result<Option<CacheRow>> {
    let row = sqlx::query(
        r#"
        SELECT payload, created_at, ttl_seconds
        FROM stage_cache
        WHERE stage_name = ? AND input_hash = ?
        "#,
    )
    .bind(stage_name)
    .bind(input_hash)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let created_at: String = row.get("created_at");
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Some(CacheRow {
        payload: row.get("payload"),
        created_at,
        ttl_seconds: row.get("ttl_seconds"),
    }))
}

/// Upsert a cache row. Last writer wins: computation is deterministic, so a
/// same-key race writes an identical value.
pub async fn put_entry(
    pool: &SqlitePool,
    stage_name: &str,
    input_hash: &str,
    payload: &str,
    ttl_seconds: Option<i64>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO stage_cache (stage_name, input_hash, payload, created_at, ttl_seconds)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(stage_name, input_hash) DO UPDATE SET
            payload = excluded.payload,
            created_at = excluded.created_at,
            ttl_seconds = excluded.ttl_seconds
        "#,
    )
    .bind(stage_name)
    .bind(input_hash)
    .bind(payload)
    .bind(Utc::now().to_rfc3339())
    .bind(ttl_seconds)
    .execute(pool)
    .await?;

    Ok(())
}

/// Remove a corrupt row so the next run repopulates it
pub async fn delete_entry(pool: &SqlitePool, stage_name: &str, input_hash: &str) -> Result<()> {
    sqlx::query("DELETE FROM stage_cache WHERE stage_name = ? AND input_hash = ?")
        .bind(stage_name)
        .bind(input_hash)
        .execute(pool)
        .await?;
    Ok(())
}
