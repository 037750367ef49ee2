//! Per-client request limiting.
//!
//! A fixed window per client address: the first request opens a window of
//! `window_secs`, and at most `max_requests` are served until it closes.
//! Over-limit requests get `429` with a `Retry-After` header.

use crate::error::ApiError;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Windows kept before expired ones are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum requests per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u32,
    /// Key clients by the first `X-Forwarded-For` hop instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_window_secs() -> u32 {
    900
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(max_requests: u32, window_secs: u32) -> Self {
        Self {
            enabled: true,
            max_requests,
            window_secs,
            trust_forwarded_for: false,
        }
    }

    /// # Errors
    ///
    /// Returns a description of the problem when an enabled limit has a zero
    /// budget or window.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.enabled && self.max_requests == 0 {
            return Err("max_requests must be positive");
        }
        if self.enabled && self.window_secs == 0 {
            return Err("window_secs must be positive");
        }
        Ok(())
    }

    fn window(&self) -> Duration {
        Duration::seconds(i64::from(self.window_secs))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(default_max_requests(), default_window_secs())
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    Allowed { remaining: u32 },
    Exceeded { retry_after: Duration },
}

impl RateLimitResult {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug, Clone)]
struct WindowState {
    count: u32,
    window_start: DateTime<Utc>,
}

/// Shared fixed-window counters keyed by client.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Counts a request from `key` and reports whether it may proceed.
    pub fn check_and_increment(&self, key: &str) -> RateLimitResult {
        self.check_and_increment_at(key, Utc::now())
    }

    fn check_and_increment_at(&self, key: &str, now: DateTime<Utc>) -> RateLimitResult {
        let window = self.config.window();
        let mut windows = self.lock();

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, state| now - state.window_start < window);
        }

        let state = windows.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            window_start: now,
        });
        if now - state.window_start >= window {
            state.window_start = now;
            state.count = 0;
        }

        if state.count >= self.config.max_requests {
            return RateLimitResult::Exceeded {
                retry_after: state.window_start + window - now,
            };
        }
        state.count += 1;
        RateLimitResult::Allowed {
            remaining: self.config.max_requests - state.count,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, WindowState>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Identifies the client behind a request.
    fn client_key(&self, request: &Request) -> String {
        if self.config.trust_forwarded_for
            && let Some(forwarded) = request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        {
            return forwarded.to_string();
        }
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
    }
}

/// Middleware rejecting clients over their budget.
pub async fn limit_requests(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !limiter.config.enabled {
        return Ok(next.run(request).await);
    }

    let key = limiter.client_key(&request);
    match limiter.check_and_increment(&key) {
        RateLimitResult::Allowed { .. } => Ok(next.run(request).await),
        RateLimitResult::Exceeded { retry_after } => {
            debug!(client = %key, "rate limit exceeded");
            let secs = u64::try_from(retry_after.num_seconds()).unwrap_or(0);
            Err(ApiError::TooManyRequests {
                message: "Too many requests, please try again later.".to_string(),
                retry_after_secs: secs.max(1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn allows_up_to_limit_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig::new(3, 60));
        let now = Utc::now();

        for expected in [2, 1, 0] {
            assert_eq!(
                limiter.check_and_increment_at("a", now),
                RateLimitResult::Allowed {
                    remaining: expected
                }
            );
        }
        assert_eq!(
            limiter.check_and_increment_at("a", now + Duration::seconds(10)),
            RateLimitResult::Exceeded {
                retry_after: Duration::seconds(50)
            }
        );
    }

    #[test]
    fn window_reopens_after_it_elapses() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        let now = Utc::now();

        assert!(limiter.check_and_increment_at("a", now).is_allowed());
        assert!(!limiter.check_and_increment_at("a", now).is_allowed());
        assert!(
            limiter
                .check_and_increment_at("a", now + Duration::seconds(60))
                .is_allowed()
        );
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(RateLimitConfig::new(1, 60));
        assert!(limiter.check_and_increment("a").is_allowed());
        assert!(!limiter.check_and_increment("a").is_allowed());
        assert!(limiter.check_and_increment("b").is_allowed());
    }

    #[test]
    fn forwarded_for_is_used_only_when_trusted() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().expect("header"));
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        let direct = RateLimiter::new(RateLimitConfig::new(1, 60));
        assert_eq!(direct.client_key(&request), "10.0.0.1");

        let mut trusting = RateLimitConfig::new(1, 60);
        trusting.trust_forwarded_for = true;
        assert_eq!(
            RateLimiter::new(trusting).client_key(&request),
            "203.0.113.9"
        );
    }

    #[test]
    fn defaults_are_one_hundred_per_quarter_hour() {
        let config: RateLimitConfig = serde_json::from_str("{}").expect("deserialize");
        assert!(config.enabled);
        assert_eq!(config.max_requests, 100);
        assert_eq!(config.window_secs, 900);
        assert!(config.validate().is_ok());
        assert!(RateLimitConfig::new(0, 60).validate().is_err());
    }
}
