//! External service gateways
//!
//! One module per dependency (inference, web search, social search,
//! similarity store). Shared plumbing lives here: typed gateway errors,
//! bounded retry with exponential backoff and jitter, a circuit breaker,
//! and the process-wide per-service call state (rate limiter + call
//! record). One `GatewayState` exists per dependency and is shared by every
//! execution; it is injected at construction so tests can swap it.

pub mod inference;
pub mod similarity;
pub mod social_search;
pub mod web_search;

pub use inference::{HttpInferenceGateway, InferenceProvider};
pub use similarity::{HttpSimilarityGateway, SimilarityProvider};
pub use social_search::{HttpSocialSearchGateway, SocialSearchProvider};
pub use web_search::{HttpWebSearchGateway, WebSearchProvider};

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use rand::Rng;
use serde::Serialize;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Typed gateway errors surfaced to stage adapters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("{service} rate limit exhausted")]
    RateLimited { service: String },

    #[error("{service} request timed out")]
    Timeout { service: String },

    #[error("{service} unreachable: {detail}")]
    Unreachable { service: String, detail: String },

    #[error("{service} circuit open, call short-circuited")]
    CircuitOpen { service: String },

    #[error("invalid response from {service}: {detail}")]
    InvalidResponse { service: String, detail: String },
}

impl GatewayError {
    /// Transient errors are worth another attempt; malformed responses and
    /// open circuits are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. }
                | GatewayError::Timeout { .. }
                | GatewayError::Unreachable { .. }
        )
    }
}

/// Caller class drives rate-limit acquisition policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageClass {
    /// Result is not skippable: wait bounded for a permit, then retry
    Core,
    /// Result is skippable: signal fallback immediately when capacity is
    /// exhausted instead of queuing
    Enrichment,
}

/// Retry behavior for one gateway
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial call
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Cap on the computed backoff delay
    pub max_delay: Duration,
    /// Random 0..jitter_fraction of the delay is added
    pub jitter_fraction: f64,
    /// Bound on waiting for a rate-limit permit (core callers only)
    pub max_permit_wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            jitter_fraction: 0.25,
            max_permit_wait: Duration::from_secs(5),
        }
    }
}

/// Delay for attempt `n` (0-indexed): exponential backoff plus jitter
pub fn compute_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = config.base_delay.as_millis() as u64;
    let capped_ms = base_ms
        .saturating_mul(exp)
        .min(config.max_delay.as_millis() as u64);

    let jitter_max_ms = (capped_ms as f64 * config.jitter_fraction) as u64;
    let jitter_ms = if jitter_max_ms > 0 {
        rand::thread_rng().gen_range(0..=jitter_max_ms)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter_ms)
}

/// Circuit breaker state shared across executions
///
/// After `threshold` consecutive failures the breaker opens for `cooldown`;
/// while open, calls short-circuit immediately. The first call after the
/// cooldown is a half-open trial: success closes the breaker, failure
/// reopens it.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Whether a call may proceed right now
    pub fn allow(&self) -> bool {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        if let Some(open_until) = state.open_until {
            if Instant::now() < open_until {
                return false;
            }
            // Cooldown elapsed: permit a half-open trial
            state.open_until = None;
        }
        true
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    pub fn record_failure(&self, service: &str) {
        let mut state = self.state.lock().expect("breaker lock poisoned");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            tracing::warn!(
                service,
                consecutive_failures = state.consecutive_failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    fn snapshot(&self) -> (u32, Option<u64>) {
        let state = self.state.lock().expect("breaker lock poisoned");
        let remaining = state.open_until.and_then(|t| {
            let now = Instant::now();
            (t > now).then(|| (t - now).as_millis() as u64)
        });
        (state.consecutive_failures, remaining)
    }
}

/// Read-only view of one service's shared call state (diagnostics)
#[derive(Debug, Clone, Serialize)]
pub struct GatewayCallRecord {
    pub service: String,
    pub calls_attempted: u64,
    pub last_call_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    /// Remaining circuit-breaker cooldown, if open
    pub open_for_ms: Option<u64>,
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Process-wide shared state for one external dependency
///
/// Holds the token-bucket limiter, circuit breaker, and call record. Shared
/// by all executions; updated atomically on every call attempt.
pub struct GatewayState {
    service: String,
    limiter: DirectLimiter,
    breaker: CircuitBreaker,
    retry: RetryConfig,
    calls_attempted: AtomicU64,
    last_call_at: Mutex<Option<DateTime<Utc>>>,
}

impl GatewayState {
    pub fn new(service: impl Into<String>, requests_per_minute: u32, retry: RetryConfig) -> Self {
        let quota = Quota::per_minute(
            NonZeroU32::new(requests_per_minute.max(1)).expect("clamped to nonzero"),
        );
        Self {
            service: service.into(),
            limiter: RateLimiter::direct(quota),
            breaker: CircuitBreaker::new(5, Duration::from_secs(30)),
            retry,
            calls_attempted: AtomicU64::new(0),
            last_call_at: Mutex::new(None),
        }
    }

    /// Override the default circuit breaker policy
    pub fn with_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Diagnostics snapshot for the health endpoint
    pub fn call_record(&self) -> GatewayCallRecord {
        let (consecutive_failures, open_for_ms) = self.breaker.snapshot();
        GatewayCallRecord {
            service: self.service.clone(),
            calls_attempted: self.calls_attempted.load(Ordering::Relaxed),
            last_call_at: *self.last_call_at.lock().expect("call record lock poisoned"),
            consecutive_failures,
            open_for_ms,
        }
    }

    fn rate_limited(&self) -> GatewayError {
        GatewayError::RateLimited {
            service: self.service.clone(),
        }
    }

    fn note_attempt(&self) {
        self.calls_attempted.fetch_add(1, Ordering::Relaxed);
        *self.last_call_at.lock().expect("call record lock poisoned") = Some(Utc::now());
    }

    /// Execute one gateway operation under rate limiting, retry, and the
    /// circuit breaker.
    ///
    /// `attempt_op` performs a single attempt and classifies its own
    /// transport/status errors into `GatewayError`.
    pub async fn call<T, F, Fut>(
        &self,
        class: StageClass,
        mut attempt_op: F,
    ) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let mut last_err = None;

        for attempt in 0..=self.retry.max_retries {
            if !self.breaker.allow() {
                return Err(GatewayError::CircuitOpen {
                    service: self.service.clone(),
                });
            }

            // Acquire a rate-limit permit per caller class
            let final_attempt = attempt == self.retry.max_retries;
            match class {
                StageClass::Enrichment => {
                    if self.limiter.check().is_err() {
                        // Skippable caller: signal fallback immediately
                        return Err(self.rate_limited());
                    }
                }
                StageClass::Core => {
                    let waited =
                        tokio::time::timeout(self.retry.max_permit_wait, self.limiter.until_ready())
                            .await;
                    if waited.is_err() {
                        if final_attempt {
                            return Err(self.rate_limited());
                        }
                        last_err = Some(self.rate_limited());
                        tokio::time::sleep(compute_delay(&self.retry, attempt)).await;
                        continue;
                    }
                }
            }

            self.note_attempt();

            match attempt_op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    if attempt > 0 {
                        tracing::debug!(
                            service = %self.service,
                            attempt,
                            "Gateway call succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    self.breaker.record_failure(&self.service);

                    if !err.is_retryable() || final_attempt {
                        return Err(err);
                    }
                    // A rate-limited enrichment caller falls back rather
                    // than queuing behind the bucket
                    if class == StageClass::Enrichment
                        && matches!(err, GatewayError::RateLimited { .. })
                    {
                        return Err(err);
                    }

                    let delay = compute_delay(&self.retry, attempt);
                    tracing::warn!(
                        service = %self.service,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Gateway call failed, backing off"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| self.rate_limited()))
    }
}

/// Map a reqwest transport error to a typed gateway error
pub fn classify_transport_error(service: &str, err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout {
            service: service.to_string(),
        }
    } else {
        GatewayError::Unreachable {
            service: service.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Map a non-success HTTP status to a typed gateway error
pub fn classify_status(service: &str, status: reqwest::StatusCode) -> GatewayError {
    if status.as_u16() == 429 {
        GatewayError::RateLimited {
            service: service.to_string(),
        }
    } else if status.is_server_error() {
        GatewayError::Unreachable {
            service: service.to_string(),
            detail: format!("HTTP {}", status),
        }
    } else {
        GatewayError::InvalidResponse {
            service: service.to_string(),
            detail: format!("HTTP {}", status),
        }
    }
}

/// Build a reqwest client with the standard timeouts and user agent
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .user_agent(docsight_common::config::get_user_agent())
        .build()
        .expect("Failed to build HTTP client")
}
