use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::middleware::AuthenticatedClient;
use crate::api_keys::types::key_prefix;
use crate::error::ApiError;
use crate::AppState;

/// Counter maps larger than this are swept for expired windows on insert.
const PRUNE_THRESHOLD: usize = 10_000;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Time until the caller's window resets. Zero when allowed.
    pub retry_after: Duration,
}

impl RateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            retry_after: Duration::ZERO,
        }
    }

    /// `retry_after` rounded up to whole seconds, never below one.
    pub fn retry_after_secs(&self) -> u64 {
        let secs = self.retry_after.as_secs() + u64::from(self.retry_after.subsec_nanos() > 0);
        secs.max(1)
    }
}

/// Request budget per `(client IP, API key)` pair.
pub trait RateLimit: Send + Sync {
    /// Count one request and decide whether it may proceed. Unknown pairs
    /// start with a fresh budget.
    fn check(&self, client_ip: &str, api_key: &str) -> RateDecision;
}

/// Fixed-window rate limiter.
///
/// Each `(client IP, API key)` pair gets `max_requests` per `window`. When
/// exceeded, requests are rejected until the window resets. Counters are
/// updated under a single mutex so concurrent requests for the same pair
/// never lose increments.
#[derive(Clone)]
pub struct FixedWindowLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    counters: Mutex<HashMap<ClientKey, WindowCounter>>,
    max_requests: u64,
    window: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClientKey {
    ip: String,
    api_key: String,
}

struct WindowCounter {
    count: u64,
    window_start: Instant,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window` per pair.
    pub fn new(max_requests: u64, window: Duration) -> Self {
        Self {
            inner: Arc::new(LimiterInner {
                counters: Mutex::new(HashMap::new()),
                max_requests,
                window,
            }),
        }
    }

    fn check_at(&self, client_ip: &str, api_key: &str, now: Instant) -> RateDecision {
        let mut counters = self.inner.counters.lock().unwrap_or_else(|e| e.into_inner());

        if counters.len() >= PRUNE_THRESHOLD {
            let window = self.inner.window;
            counters.retain(|_, c| now.duration_since(c.window_start) < window);
        }

        let key = ClientKey {
            ip: client_ip.to_string(),
            api_key: api_key.to_string(),
        };
        let counter = counters.entry(key).or_insert(WindowCounter {
            count: 0,
            window_start: now,
        });

        // Reset window if expired
        if now.duration_since(counter.window_start) >= self.inner.window {
            counter.count = 0;
            counter.window_start = now;
        }

        counter.count += 1;
        if counter.count <= self.inner.max_requests {
            return RateDecision::allow();
        }

        let elapsed = now.duration_since(counter.window_start);
        RateDecision {
            allowed: false,
            retry_after: self.inner.window.saturating_sub(elapsed),
        }
    }

    #[cfg(test)]
    fn tracked_pairs(&self) -> usize {
        self.inner.counters.lock().unwrap().len()
    }
}

impl RateLimit for FixedWindowLimiter {
    fn check(&self, client_ip: &str, api_key: &str) -> RateDecision {
        self.check_at(client_ip, api_key, Instant::now())
    }
}

/// Axum middleware that enforces per-client rate limits.
///
/// Must be layered inside the API-key middleware so that
/// [`AuthenticatedClient`] is present in request extensions.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(client) = req.extensions().get::<AuthenticatedClient>().cloned() else {
        return next.run(req).await;
    };

    let decision = state.limiter.check(&client.client_ip, &client.api_key);
    if !decision.allowed {
        log::warn!(
            "AUDIT DENIED key={} ip={} path={} reason=rate_limited",
            key_prefix(&client.api_key),
            client.client_ip,
            req.uri().path()
        );
        return ApiError::TooManyRequests {
            retry_after: decision.retry_after_secs(),
        }
        .into_response();
    }

    next.run(req).await
}
