//! Shared test helpers: fake gateway providers and a pipeline harness
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use docsight_ae::artifact::ArtifactStore;
use docsight_ae::gateways::{
    GatewayError, InferenceProvider, SimilarityProvider, SocialSearchProvider, WebSearchProvider,
};
use docsight_ae::models::{
    AnalysisReport, AnalysisScores, Claim, Execution, ExtractedDocument, SimilarMatch, SocialPost,
    WebSnippet,
};
use docsight_ae::pipeline::coordinator::CoordinatorDeps;
use docsight_ae::pipeline::Coordinator;
use docsight_common::config::PipelineConfig;
use docsight_common::events::EventBus;

/// Deterministic report derived only from the document, so tests can verify
/// that downstream stages consumed the committed upstream output
pub fn report_for(document: &ExtractedDocument) -> AnalysisReport {
    AnalysisReport {
        summary: format!("summary:{}", document.content_hash),
        claims: vec![Claim {
            text: "primary claim".to_string(),
            salience: 0.5,
        }],
        scores: AnalysisScores {
            clarity: 0.7,
            evidence: 0.8,
            consistency: 0.6,
        },
    }
}

pub struct FakeInference {
    pub calls: AtomicUsize,
    pub fail: Option<GatewayError>,
    pub delay: Option<Duration>,
}

impl FakeInference {
    pub fn ok() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: None,
            delay: None,
        }
    }

    pub fn failing(error: GatewayError) -> Self {
        Self {
            fail: Some(error),
            ..Self::ok()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::ok()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceProvider for FakeInference {
    async fn analyze(&self, document: &ExtractedDocument) -> Result<AnalysisReport, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok(report_for(document)),
        }
    }
}

pub struct FakeWebSearch {
    pub fail: Option<GatewayError>,
}

#[async_trait]
impl WebSearchProvider for FakeWebSearch {
    async fn search(&self, query: &str) -> Result<Vec<WebSnippet>, GatewayError> {
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok(vec![WebSnippet {
                title: format!("result for {}", query),
                url: "http://example.com/1".to_string(),
                snippet: "snippet".to_string(),
                rank: 1,
            }]),
        }
    }
}

pub struct FakeSocialSearch {
    pub fail: Option<GatewayError>,
}

#[async_trait]
impl SocialSearchProvider for FakeSocialSearch {
    async fn search(&self, _query: &str) -> Result<Vec<SocialPost>, GatewayError> {
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok(vec![SocialPost {
                author: "@observer".to_string(),
                text: "discussion".to_string(),
                engagement: 4,
            }]),
        }
    }
}

pub struct FakeSimilarity {
    /// Queries observed, in call order
    pub queries: Mutex<Vec<String>>,
    pub fail: Option<GatewayError>,
}

impl FakeSimilarity {
    pub fn ok() -> Self {
        Self {
            queries: Mutex::new(Vec::new()),
            fail: None,
        }
    }
}

#[async_trait]
impl SimilarityProvider for FakeSimilarity {
    async fn query(&self, text: &str, _top_k: u32) -> Result<Vec<SimilarMatch>, GatewayError> {
        self.queries.lock().unwrap().push(text.to_string());
        match &self.fail {
            Some(err) => Err(err.clone()),
            None => Ok(vec![
                SimilarMatch {
                    id: "kb-1".to_string(),
                    score: 0.9,
                },
                SimilarMatch {
                    id: "kb-2".to_string(),
                    score: 0.7,
                },
            ]),
        }
    }
}

pub fn rate_limited(service: &str) -> GatewayError {
    GatewayError::RateLimited {
        service: service.to_string(),
    }
}

pub fn unreachable(service: &str) -> GatewayError {
    GatewayError::Unreachable {
        service: service.to_string(),
        detail: "connection refused".to_string(),
    }
}

/// A full pipeline wired to fake providers over a file-backed SQLite
/// database and a temp artifact folder
pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub pool: SqlitePool,
    pub events: EventBus,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(self.dir.path().to_path_buf())
    }

    /// Write an artifact file under the harness root folder
    pub fn write_artifact(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Poll until the execution reaches a terminal status
    pub async fn wait_terminal(&self, execution_id: Uuid) -> Execution {
        for _ in 0..400 {
            if let Some(execution) = self.coordinator.poll(execution_id).await.unwrap() {
                if execution.is_terminal() {
                    return execution;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("execution {} never reached a terminal status", execution_id);
    }
}

pub async fn harness(deps: CoordinatorDeps) -> Harness {
    harness_with_timeout(deps, 30).await
}

pub async fn harness_with_timeout(deps: CoordinatorDeps, execution_timeout_secs: u64) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let pool = docsight_ae::db::init_database_pool(&dir.path().join("docsight-test.db"))
        .await
        .unwrap();

    let events = EventBus::new(256);
    let config = PipelineConfig {
        execution_timeout_secs,
        gateway_timeout_secs: 5,
        max_retries: 1,
        cache_ttl_secs: None,
    };

    let coordinator = Arc::new(Coordinator::new(
        pool.clone(),
        ArtifactStore::new(dir.path().to_path_buf()),
        deps,
        events.clone(),
        config,
        5,
    ));

    Harness {
        coordinator,
        pool,
        events,
        dir,
    }
}

/// Deps where every dependency behaves
pub fn healthy_deps() -> (CoordinatorDeps, Arc<FakeInference>, Arc<FakeSimilarity>) {
    let inference = Arc::new(FakeInference::ok());
    let similarity = Arc::new(FakeSimilarity::ok());
    let deps = CoordinatorDeps {
        inference: inference.clone(),
        web: Arc::new(FakeWebSearch { fail: None }),
        social: Arc::new(FakeSocialSearch { fail: None }),
        similarity: similarity.clone(),
    };
    (deps, inference, similarity)
}
