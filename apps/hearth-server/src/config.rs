//! Server configuration for the invite service.
//!
//! Supports configuration via environment variables:
//!
//! ```bash
//! # Required: server key the invite tokens are hashed with (hex, >= 32 bytes)
//! HEARTH_INVITE_KEY=4f1c...
//!
//! # Invite lifecycle
//! HEARTH_INVITE_TTL_HOURS=48   # at most 8760
//! HEARTH_RETENTION_DAYS=7       # at most 3650
//! HEARTH_PURGE_DAYS=30          # at most 3650
//! HEARTH_LOCK_TIMEOUT_MS=3000
//! HEARTH_EXPOSE_CAPACITY_REACHED=false
//!
//! # Validation attempt limits (per caller)
//! HEARTH_RATE_LIMIT_ATTEMPTS=20
//! HEARTH_RATE_LIMIT_WINDOW_SECS=60
//!
//! # Maintenance sweep
//! HEARTH_CLEANUP_INTERVAL_SECS=3600
//! ```

use std::env;
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use hearth_crypto::{InviteKey, KeyError};
use hearth_invites::InviteConfig;
use hearth_limits::RateLimitConfig;
use thiserror::Error;
use zeroize::Zeroizing;

/// Server configuration
pub struct ServerConfig {
    pub invite_key: InviteKey,
    pub invite: InviteConfig,
    pub rate_limit: RateLimitConfig,
    /// Period of the background cleanup sweep
    pub cleanup_interval: Duration,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("Invalid HEARTH_INVITE_KEY: {0}")]
    InvalidKey(#[from] KeyError),
}

fn parse_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value }),
        Err(_) => Ok(default),
    }
}

fn positive(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_var(var, default)?;
    if value == 0 {
        return Err(ConfigError::NotPositive(var));
    }
    Ok(value)
}

const MAX_TTL_HOURS: u64 = 24 * 365;
const MAX_RETENTION_DAYS: u64 = 3650;

/// Reject values above `max` and convert with `to_delta`.
fn bounded_delta(
    var: &'static str,
    value: u64,
    max: u64,
    to_delta: fn(i64) -> Option<TimeDelta>,
) -> Result<TimeDelta, ConfigError> {
    let invalid = || ConfigError::InvalidValue {
        var,
        value: value.to_string(),
    };
    if value > max {
        return Err(invalid());
    }
    i64::try_from(value)
        .ok()
        .and_then(to_delta)
        .ok_or_else(invalid)
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw_key = Zeroizing::new(
            env::var("HEARTH_INVITE_KEY")
                .map_err(|_| ConfigError::MissingEnvVar("HEARTH_INVITE_KEY".to_string()))?,
        );
        let invite_key = InviteKey::from_hex(&raw_key)?;

        let ttl_hours = positive("HEARTH_INVITE_TTL_HOURS", 48)?;
        let retention_days: u64 = parse_var("HEARTH_RETENTION_DAYS", 7)?;
        let purge_days: u64 = parse_var("HEARTH_PURGE_DAYS", 30)?;
        let lock_timeout_ms = positive("HEARTH_LOCK_TIMEOUT_MS", 3000)?;
        let expose_capacity_reached = env::var("HEARTH_EXPOSE_CAPACITY_REACHED")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let max_attempts = positive("HEARTH_RATE_LIMIT_ATTEMPTS", 20)?;
        let window_secs = positive("HEARTH_RATE_LIMIT_WINDOW_SECS", 60)?;
        let cleanup_secs = positive("HEARTH_CLEANUP_INTERVAL_SECS", 3600)?;

        let invite = InviteConfig {
            ttl: bounded_delta(
                "HEARTH_INVITE_TTL_HOURS",
                ttl_hours,
                MAX_TTL_HOURS,
                TimeDelta::try_hours,
            )?,
            retention: bounded_delta(
                "HEARTH_RETENTION_DAYS",
                retention_days,
                MAX_RETENTION_DAYS,
                TimeDelta::try_days,
            )?,
            purge_after: bounded_delta(
                "HEARTH_PURGE_DAYS",
                purge_days,
                MAX_RETENTION_DAYS,
                TimeDelta::try_days,
            )?,
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            expose_capacity_reached,
            ..InviteConfig::default()
        };

        Ok(Self {
            invite_key,
            invite,
            rate_limit: RateLimitConfig {
                max_attempts: u32::try_from(max_attempts).map_err(|_| {
                    ConfigError::InvalidValue {
                        var: "HEARTH_RATE_LIMIT_ATTEMPTS",
                        value: max_attempts.to_string(),
                    }
                })?,
                window: Duration::from_secs(window_secs),
            },
            cleanup_interval: Duration::from_secs(cleanup_secs),
        })
    }

    /// Defaults with a freshly generated key.
    #[cfg(test)]
    pub fn ephemeral() -> Self {
        Self {
            invite_key: InviteKey::generate(),
            invite: InviteConfig::default(),
            rate_limit: RateLimitConfig::default(),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}
