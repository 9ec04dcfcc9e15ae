//! docsight-ae library interface
//!
//! Exposes the analysis pipeline and HTTP surface for integration testing.

pub mod api;
pub mod artifact;
pub mod cache;
pub mod canonical;
pub mod db;
pub mod error;
pub mod gateways;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use crate::error::{ApiError, ApiResult};

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use docsight_common::config::TomlConfig;
use docsight_common::events::EventBus;

use crate::gateways::{
    GatewayState, HttpInferenceGateway, HttpSimilarityGateway, HttpSocialSearchGateway,
    HttpWebSearchGateway, RetryConfig,
};
use crate::pipeline::coordinator::CoordinatorDeps;
use crate::pipeline::Coordinator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Pipeline coordinator
    pub coordinator: Arc<Coordinator>,
    /// Shared per-dependency call state, for diagnostics
    pub gateway_states: Arc<Vec<Arc<GatewayState>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        coordinator: Arc<Coordinator>,
        gateway_states: Vec<Arc<GatewayState>>,
    ) -> Self {
        Self {
            db,
            event_bus,
            coordinator,
            gateway_states: Arc::new(gateway_states),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build the HTTP gateway clients from configuration.
///
/// One shared `GatewayState` (rate limiter + circuit breaker + call record)
/// is created per dependency and injected into its client; the states are
/// also returned for the health endpoint.
pub fn build_gateways(config: &TomlConfig) -> (CoordinatorDeps, Vec<Arc<GatewayState>>) {
    let timeout = Duration::from_secs(config.pipeline.gateway_timeout_secs);
    let retry = RetryConfig {
        max_retries: config.pipeline.max_retries,
        ..RetryConfig::default()
    };

    let inference_state = Arc::new(GatewayState::new(
        "inference",
        config.inference.gateway.requests_per_minute,
        retry.clone(),
    ));
    let web_state = Arc::new(GatewayState::new(
        "web_search",
        config.web_search.requests_per_minute,
        retry.clone(),
    ));
    let social_state = Arc::new(GatewayState::new(
        "social_search",
        config.social_search.requests_per_minute,
        retry.clone(),
    ));
    let similarity_state = Arc::new(GatewayState::new(
        "similarity",
        config.similarity.gateway.requests_per_minute,
        retry,
    ));

    let deps = CoordinatorDeps {
        inference: Arc::new(HttpInferenceGateway::new(
            config.inference.gateway.base_url.clone(),
            config.inference.gateway.api_key.clone(),
            config.inference.model.clone(),
            timeout,
            Arc::clone(&inference_state),
        )),
        web: Arc::new(HttpWebSearchGateway::new(
            config.web_search.base_url.clone(),
            config.web_search.api_key.clone(),
            timeout,
            Arc::clone(&web_state),
        )),
        social: Arc::new(HttpSocialSearchGateway::new(
            config.social_search.base_url.clone(),
            config.social_search.api_key.clone(),
            timeout,
            Arc::clone(&social_state),
        )),
        similarity: Arc::new(HttpSimilarityGateway::new(
            config.similarity.gateway.base_url.clone(),
            config.similarity.gateway.api_key.clone(),
            timeout,
            Arc::clone(&similarity_state),
        )),
    };

    (
        deps,
        vec![inference_state, web_state, social_state, similarity_state],
    )
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::analysis_routes())
        .route("/analysis/events", get(api::analysis_event_stream))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
