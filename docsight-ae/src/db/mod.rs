//! Database access for docsight-ae
//!
//! Single SQLite database under the root folder holding execution
//! snapshots, the deterministic stage cache, and finalized assessments.

pub mod assessments;
pub mod executions;
pub mod retry;
pub mod stage_cache;

pub use retry::retry_on_lock;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create docsight-ae tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS executions (
            execution_id TEXT PRIMARY KEY,
            artifact_ref TEXT NOT NULL,
            subject TEXT NOT NULL DEFAULT '{}',
            status TEXT NOT NULL,
            stage_results TEXT NOT NULL DEFAULT '[]',
            current_stage INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            created_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stage_cache (
            stage_name TEXT NOT NULL,
            input_hash TEXT NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL,
            ttl_seconds INTEGER,
            PRIMARY KEY (stage_name, input_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assessments (
            execution_id TEXT PRIMARY KEY,
            artifact_ref TEXT NOT NULL,
            overall_score REAL NOT NULL,
            payload TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized (executions, stage_cache, assessments)");

    Ok(())
}

#[cfg(test)]
pub async fn memory_pool() -> SqlitePool {
    // A pooled in-memory database must stay on one connection: every new
    // connection would otherwise see its own empty database.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}
