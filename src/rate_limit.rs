//! Rate limiting for the credential endpoints.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password
//! guessing and signup spam.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::api::ApiError;
use crate::auth::extract_client_ip;
use crate::cli::IpExtractor;
use crate::server_config::RateLimitSettings;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Bucket key for requests whose address could not be determined.
const UNKNOWN_CLIENT: &str = "unknown";

fn per_minute(limit: u32) -> Arc<IpLimiter> {
    let limit = NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::keyed(Quota::per_minute(limit)))
}

/// Rate limiters for the credential endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login (default 10 requests per minute)
    pub login: Arc<IpLimiter>,
    /// Per-IP limiter for registration (default 3 requests per minute)
    pub register: Arc<IpLimiter>,
}

impl RateLimitConfig {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            login: per_minute(settings.login_per_minute),
            register: per_minute(settings.register_per_minute),
        }
    }
}

/// State for one rate-limited route.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<IpLimiter>,
    pub ip_extractor: Option<IpExtractor>,
    pub message: &'static str,
}

impl RateLimitState {
    pub fn login(config: &RateLimitConfig, ip_extractor: Option<IpExtractor>) -> Self {
        Self {
            limiter: config.login.clone(),
            ip_extractor,
            message: "Too many login attempts. Please wait before trying again.",
        }
    }

    pub fn register(config: &RateLimitConfig, ip_extractor: Option<IpExtractor>) -> Self {
        Self {
            limiter: config.register.clone(),
            ip_extractor,
            message: "Too many signup attempts. Please wait before trying again.",
        }
    }
}

/// Middleware rejecting requests over the per-IP quota with 429.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = extract_client_ip(&request, state.ip_extractor.as_ref())
        .unwrap_or_else(|_| UNKNOWN_CLIENT.to_string());

    match state.limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            ApiError::too_many_requests(state.message).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_per_key() {
        let config = RateLimitConfig::new(&RateLimitSettings {
            login_per_minute: 2,
            register_per_minute: 1,
        });

        let a = "10.0.0.1".to_string();
        let b = "10.0.0.2".to_string();
        assert!(config.login.check_key(&a).is_ok());
        assert!(config.login.check_key(&a).is_ok());
        assert!(config.login.check_key(&a).is_err());
        assert!(config.login.check_key(&b).is_ok());

        assert!(config.register.check_key(&a).is_ok());
        assert!(config.register.check_key(&a).is_err());
    }

    #[test]
    fn test_zero_limit_still_allows_one() {
        let config = RateLimitConfig::new(&RateLimitSettings {
            login_per_minute: 0,
            register_per_minute: 0,
        });
        assert!(config.login.check_key(&"x".to_string()).is_ok());
    }
}
