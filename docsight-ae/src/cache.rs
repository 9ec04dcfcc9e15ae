//! Deterministic stage cache
//!
//! Content-addressed store mapping (stage, canonical input) to a stage
//! payload. A hit replays the committed payload so identical input always
//! produces identical output on repeated runs. Cache hits are a
//! latency/rate-limit optimization, not the sole determinism mechanism:
//! inference calls use fixed deterministic parameters regardless.

use serde_json::Value;
use sqlx::SqlitePool;

use crate::canonical;
use crate::db::stage_cache;
use crate::models::{Stage, StagePayload};

#[derive(Clone)]
pub struct DeterministicCache {
    db: SqlitePool,
    ttl_seconds: Option<i64>,
}

impl DeterministicCache {
    pub fn new(db: SqlitePool, ttl_seconds: Option<i64>) -> Self {
        Self { db, ttl_seconds }
    }

    /// Look up a stage payload by canonical input.
    ///
    /// Expired rows and corrupt rows (payloads that no longer deserialize)
    /// are treated as misses; corruption is logged and the row removed so a
    /// live call repopulates it.
    pub async fn get(&self, stage: Stage, canonical_input: &Value) -> Option<StagePayload> {
        let input_hash = canonical::cache_key(stage.as_str(), canonical_input);

        let row = match stage_cache::get_entry(&self.db, stage.as_str(), &input_hash).await {
            Ok(row) => row?,
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        if row.is_expired(chrono::Utc::now()) {
            tracing::debug!(stage = %stage, input_hash = %input_hash, "Cache entry expired");
            return None;
        }

        match serde_json::from_str::<StagePayload>(&row.payload) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(
                    stage = %stage,
                    input_hash = %input_hash,
                    error = %e,
                    "Corrupt cache entry, treating as miss"
                );
                if let Err(e) = stage_cache::delete_entry(&self.db, stage.as_str(), &input_hash).await {
                    tracing::warn!(stage = %stage, error = %e, "Failed to remove corrupt cache entry");
                }
                None
            }
        }
    }

    /// Store a stage payload under its canonical input.
    ///
    /// Failures are logged and swallowed: the pipeline result is already
    /// committed and a cold cache only costs the next run a live call.
    pub async fn put(&self, stage: Stage, canonical_input: &Value, payload: &StagePayload) {
        let input_hash = canonical::cache_key(stage.as_str(), canonical_input);

        let serialized = match serde_json::to_string(payload) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(stage = %stage, error = %e, "Failed to serialize payload for cache");
                return;
            }
        };

        if let Err(e) = stage_cache::put_entry(
            &self.db,
            stage.as_str(),
            &input_hash,
            &serialized,
            self.ttl_seconds,
        )
        .await
        {
            tracing::warn!(stage = %stage, error = %e, "Cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::{ExtractedDocument, StagePayload};
    use serde_json::json;

    fn doc_payload() -> StagePayload {
        StagePayload::Extracted(ExtractedDocument {
            title: Some("Q3".to_string()),
            body: "body".to_string(),
            word_count: 1,
            topics: vec!["finance".to_string()],
            content_hash: "aa".to_string(),
        })
    }

    #[tokio::test]
    async fn get_after_put_returns_stored_value() {
        let cache = DeterministicCache::new(memory_pool().await, None);
        let input = json!({ "content_hash": "aa" });

        assert!(cache.get(Stage::Extraction, &input).await.is_none());
        cache.put(Stage::Extraction, &input, &doc_payload()).await;

        let hit = cache.get(Stage::Extraction, &input).await.unwrap();
        assert_eq!(hit, doc_payload());
    }

    #[tokio::test]
    async fn order_insensitive_inputs_share_an_entry() {
        let cache = DeterministicCache::new(memory_pool().await, None);
        let a = json!({ "topics": ["x", "y"], "content_hash": "aa" });
        let b = json!({ "content_hash": "aa", "topics": ["y", "x"] });

        cache.put(Stage::Extraction, &a, &doc_payload()).await;
        assert!(cache.get(Stage::Extraction, &b).await.is_some());
    }

    #[tokio::test]
    async fn corrupt_entry_is_a_miss_and_removed() {
        let pool = memory_pool().await;
        let cache = DeterministicCache::new(pool.clone(), None);
        let input = json!({ "content_hash": "aa" });
        let key = crate::canonical::cache_key("extraction", &input);

        crate::db::stage_cache::put_entry(&pool, "extraction", &key, "not json", None)
            .await
            .unwrap();

        assert!(cache.get(Stage::Extraction, &input).await.is_none());
        // Row was removed, a put now repopulates it cleanly
        cache.put(Stage::Extraction, &input, &doc_payload()).await;
        assert!(cache.get(Stage::Extraction, &input).await.is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let pool = memory_pool().await;
        // TTL of zero seconds expires immediately
        let cache = DeterministicCache::new(pool, Some(0));
        let input = json!({ "content_hash": "aa" });

        cache.put(Stage::Extraction, &input, &doc_payload()).await;
        assert!(cache.get(Stage::Extraction, &input).await.is_none());
    }
}
