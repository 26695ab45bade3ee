//! Request timeout and a global token-bucket rate limit.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::config::ResilienceConfig;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Stand-in for "no timeout" so the layer stack keeps one type.
pub const TIMEOUT_DISABLED: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Single global bucket, not keyed by client.
#[derive(Debug)]
pub struct TokenBucket {
    // (last refill, tokens)
    state: Mutex<(Instant, f32)>,
    rate_per_sec: f32,
    burst_size: f32,
}

impl TokenBucket {
    pub fn new(rate_per_sec: f32, burst_size: f32) -> Self {
        Self {
            state: Mutex::new((Instant::now(), burst_size)),
            rate_per_sec,
            burst_size,
        }
    }

    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self::new(config.requests_per_second, config.burst_size)
    }

    /// Take one token if available.
    pub fn check(&self) -> bool {
        self.check_at(Instant::now())
    }

    fn check_at(&self, now: Instant) -> bool {
        // The tuple is always consistent, so a poisoned lock is still usable
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let (last, tokens) = *guard;
        let elapsed = now.saturating_duration_since(last).as_secs_f32();
        let refilled = (tokens + elapsed * self.rate_per_sec).min(self.burst_size);

        if refilled >= 1.0 {
            *guard = (now, refilled - 1.0);
            true
        } else {
            *guard = (now, refilled);
            false
        }
    }
}

pub fn timeout_for(config: &ResilienceConfig) -> Duration {
    if config.timeout_disabled {
        TIMEOUT_DISABLED
    } else {
        REQUEST_TIMEOUT
    }
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if state.config.resilience.rate_limit_enabled && !state.rate_limiter.check() {
        tracing::debug!(name: "rate_limit.rejected", path = %req.uri().path(), "Rate limited");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(next.run(req).await)
}

/// WebSocket upgrades are exempt: the connection outlives any request timeout.
pub async fn timeout_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let is_upgrade = req.headers().contains_key(axum::http::header::UPGRADE);
    if is_upgrade {
        return next.run(req).await;
    }
    let duration = timeout_for(&state.config.resilience);
    match tokio::time::timeout(duration, next.run(req)).await {
        Ok(res) => res,
        Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_bucket() {
        let bucket = TokenBucket::new(2.0, 5.0);
        let start = Instant::now();

        for _ in 0..5 {
            assert!(bucket.check_at(start));
        }
        assert!(!bucket.check_at(start));

        // 0.6s at 2/s refills 1.2 tokens
        let later = start + Duration::from_millis(600);
        assert!(bucket.check_at(later));
        assert!(!bucket.check_at(later));
    }

    #[test]
    fn test_refill_caps_at_burst() {
        let bucket = TokenBucket::new(100.0, 2.0);
        let start = Instant::now();
        let much_later = start + Duration::from_secs(60);
        assert!(bucket.check_at(much_later));
        assert!(bucket.check_at(much_later));
        assert!(!bucket.check_at(much_later));
    }

    #[test]
    fn test_timeout_for() {
        let mut config = crate::config::AppConfig::defaults().unwrap().resilience;
        assert_eq!(timeout_for(&config), REQUEST_TIMEOUT);
        config.timeout_disabled = true;
        assert_eq!(timeout_for(&config), TIMEOUT_DISABLED);
    }
}
