//! Circle service configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default LiveKit server URL.
pub const DEFAULT_LIVEKIT_URL: &str = "http://localhost:7880";

/// Default lifetime of a join credential in seconds.
pub const DEFAULT_LIVEKIT_TOKEN_TTL_SECONDS: u64 = 3600;

/// Default bound on waiting for a locked room row, in milliseconds.
pub const DEFAULT_ROOM_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default interval between keeper-absence scans in seconds.
pub const DEFAULT_KEEPER_ABSENCE_INTERVAL_SECONDS: u64 = 60;

/// Default minutes after scheduled start before a keeper counts as absent.
pub const DEFAULT_KEEPER_ABSENCE_GRACE_MINUTES: i64 = 5;

/// Default minutes after scheduled start after which sessions are no longer scanned.
pub const DEFAULT_KEEPER_ABSENCE_WINDOW_MINUTES: i64 = 60;

/// Default drain period on shutdown in seconds.
pub const DEFAULT_DRAIN_SECONDS: u64 = 30;

/// Circle service configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Shared HS256 secret for participant bearer tokens.
    pub jwt_secret: SecretString,

    /// JWT clock skew tolerance in seconds for token validation.
    pub jwt_clock_skew_seconds: i64,

    /// Base URL of the LiveKit server.
    pub livekit_url: String,

    pub livekit_api_key: String,

    pub livekit_api_secret: SecretString,

    /// Lifetime of issued join credentials.
    pub livekit_token_ttl_seconds: u64,

    /// `lock_timeout` applied inside every room transaction.
    pub room_lock_timeout_ms: u64,

    pub keeper_absence_interval_seconds: u64,

    pub keeper_absence_grace_minutes: i64,

    pub keeper_absence_window_minutes: i64,

    /// Seconds to keep serving in-flight requests after a shutdown signal.
    pub drain_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("bind_address", &self.bind_address)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_clock_skew_seconds", &self.jwt_clock_skew_seconds)
            .field("livekit_url", &self.livekit_url)
            .field("livekit_api_key", &self.livekit_api_key)
            .field("livekit_api_secret", &"[REDACTED]")
            .field("livekit_token_ttl_seconds", &self.livekit_token_ttl_seconds)
            .field("room_lock_timeout_ms", &self.room_lock_timeout_ms)
            .field(
                "keeper_absence_interval_seconds",
                &self.keeper_absence_interval_seconds,
            )
            .field(
                "keeper_absence_grace_minutes",
                &self.keeper_absence_grace_minutes,
            )
            .field(
                "keeper_absence_window_minutes",
                &self.keeper_absence_window_minutes,
            )
            .field("drain_seconds", &self.drain_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = required(vars, "DATABASE_URL")?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let jwt_secret = SecretString::from(required_secret(vars, "CIRCLE_JWT_SECRET")?);

        let jwt_clock_skew_seconds = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {}",
                    value
                )));
            }

            let max = i64::try_from(MAX_CLOCK_SKEW.as_secs()).unwrap_or(i64::MAX);
            if value > max {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    max, value
                )));
            }

            value
        } else {
            i64::try_from(DEFAULT_CLOCK_SKEW.as_secs()).unwrap_or(300)
        };

        let livekit_url = vars
            .get("LIVEKIT_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_LIVEKIT_URL.to_string());

        let livekit_api_key = required(vars, "LIVEKIT_API_KEY")?;
        let livekit_api_secret = SecretString::from(required_secret(vars, "LIVEKIT_API_SECRET")?);

        let livekit_token_ttl_seconds = positive(
            vars,
            "LIVEKIT_TOKEN_TTL_SECONDS",
            DEFAULT_LIVEKIT_TOKEN_TTL_SECONDS,
        )?;
        let room_lock_timeout_ms =
            positive(vars, "ROOM_LOCK_TIMEOUT_MS", DEFAULT_ROOM_LOCK_TIMEOUT_MS)?;
        let keeper_absence_interval_seconds = positive(
            vars,
            "KEEPER_ABSENCE_INTERVAL_SECONDS",
            DEFAULT_KEEPER_ABSENCE_INTERVAL_SECONDS,
        )?;
        let keeper_absence_grace_minutes = positive(
            vars,
            "KEEPER_ABSENCE_GRACE_MINUTES",
            DEFAULT_KEEPER_ABSENCE_GRACE_MINUTES,
        )?;
        let keeper_absence_window_minutes = positive(
            vars,
            "KEEPER_ABSENCE_WINDOW_MINUTES",
            DEFAULT_KEEPER_ABSENCE_WINDOW_MINUTES,
        )?;

        if keeper_absence_window_minutes <= keeper_absence_grace_minutes {
            return Err(ConfigError::InvalidValue {
                name: "KEEPER_ABSENCE_WINDOW_MINUTES".to_string(),
                reason: format!(
                    "must be greater than KEEPER_ABSENCE_GRACE_MINUTES ({}), got {}",
                    keeper_absence_grace_minutes, keeper_absence_window_minutes
                ),
            });
        }

        let drain_seconds = match vars.get("CIRCLE_DRAIN_SECONDS") {
            Some(value_str) => value_str.parse().map_err(|e| ConfigError::InvalidValue {
                name: "CIRCLE_DRAIN_SECONDS".to_string(),
                reason: format!("expected a non-negative integer, got '{}': {}", value_str, e),
            })?,
            None => DEFAULT_DRAIN_SECONDS,
        };

        Ok(Config {
            database_url,
            bind_address,
            jwt_secret,
            jwt_clock_skew_seconds,
            livekit_url,
            livekit_api_key,
            livekit_api_secret,
            livekit_token_ttl_seconds,
            room_lock_timeout_ms,
            keeper_absence_interval_seconds,
            keeper_absence_grace_minutes,
            keeper_absence_window_minutes,
            drain_seconds,
        })
    }

    /// Clock skew tolerance as a `Duration` for token validation.
    pub fn jwt_clock_skew(&self) -> Duration {
        Duration::from_secs(u64::try_from(self.jwt_clock_skew_seconds).unwrap_or(0))
    }
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Like `required`, but an empty value counts as missing.
fn required_secret(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    match vars.get(name) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ConfigError::MissingEnvVar(name.to_string())),
    }
}

/// Parse an optional numeric variable that must be greater than zero.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default + fmt::Display,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("expected a positive integer, got '{}': {}", value_str, e),
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: format!("must be greater than 0, got {}", value),
        });
    }

    Ok(value)
}
