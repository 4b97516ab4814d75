//! Server settings resolved once at startup.
//!
//! A `ServerSettings` value is built from the command line and handed to
//! every component that needs it. Nothing reads configuration from globals.

use std::time::Duration;

use thiserror::Error;

use crate::cli::IpExtractor;
use crate::jwt::{ACCESS_TOKEN_DURATION_SECS, REFRESH_TOKEN_DURATION_SECS};
use crate::session::RotationPolicy;

/// Default interval between session cleanup runs.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Per-IP request budgets for the unauthenticated endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSettings {
    pub login_per_minute: u32,
    pub register_per_minute: u32,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            login_per_minute: 10,
            register_per_minute: 3,
        }
    }
}

impl RateLimitSettings {
    /// Limits high enough to never trigger in tests.
    pub fn unlimited() -> Self {
        Self {
            login_per_minute: 100_000,
            register_per_minute: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Access token lifetime in seconds
    pub access_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_ttl: u64,
    pub rotation: RotationPolicy,
    /// Take the client IP from a proxy header instead of the socket
    pub ip_extractor: Option<IpExtractor>,
    pub cleanup_interval: Duration,
    pub rate_limits: RateLimitSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            access_ttl: ACCESS_TOKEN_DURATION_SECS,
            refresh_ttl: REFRESH_TOKEN_DURATION_SECS,
            rotation: RotationPolicy::default(),
            ip_extractor: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            rate_limits: RateLimitSettings::default(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("access token lifetime must be positive")]
    ZeroAccessTtl,
    #[error("access token lifetime ({access}s) must be shorter than refresh token lifetime ({refresh}s)")]
    AccessNotShorter { access: u64, refresh: u64 },
    #[error("rate limits must be positive")]
    ZeroRateLimit,
    #[error("cleanup interval must be positive")]
    ZeroCleanupInterval,
}

impl ServerSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.access_ttl == 0 {
            return Err(SettingsError::ZeroAccessTtl);
        }
        if self.access_ttl >= self.refresh_ttl {
            return Err(SettingsError::AccessNotShorter {
                access: self.access_ttl,
                refresh: self.refresh_ttl,
            });
        }
        if self.rate_limits.login_per_minute == 0 || self.rate_limits.register_per_minute == 0 {
            return Err(SettingsError::ZeroRateLimit);
        }
        if self.cleanup_interval.is_zero() {
            return Err(SettingsError::ZeroCleanupInterval);
        }
        Ok(())
    }
}
