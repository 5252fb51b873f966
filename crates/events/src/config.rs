//! Engine configuration loaded from environment variables.

use std::time::Duration;

use crate::retry::{
    RetryPolicy, DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY,
    DEFAULT_MULTIPLIER,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Settings shared by the API server and the sync worker.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    /// Capacity of the inbound transition queue.
    pub intake_capacity: usize,
    /// Age after which an unacknowledged `sent` push is expired.
    pub delivery_expiry: Duration,
    /// How often the worker runs the expiry and archive sweeps.
    pub sweep_interval: Duration,
    /// Age after which terminal sync rows are archived.
    pub sync_retention: Duration,
    /// Push gateway endpoint. `None` selects the log-only transport.
    pub push_gateway_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            intake_capacity: 1024,
            delivery_expiry: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            sync_retention: Duration::from_secs(30 * 24 * 3600),
            push_gateway_url: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `RETRY_MAX_ATTEMPTS`      | `3`     |
    /// | `RETRY_INITIAL_DELAY_MS`  | `1000`  |
    /// | `RETRY_MULTIPLIER`        | `2`     |
    /// | `RETRY_MAX_DELAY_MS`      | `8000`  |
    /// | `INTAKE_CHANNEL_CAPACITY` | `1024`  |
    /// | `DELIVERY_EXPIRY_SECS`    | `3600`  |
    /// | `SWEEP_INTERVAL_SECS`     | `60`    |
    /// | `SYNC_RETENTION_DAYS`     | `30`    |
    /// | `PUSH_GATEWAY_URL`        | unset   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let parse = |name: &'static str, default: u64| parse_u64(&lookup, name, default);

        let retry = RetryPolicy {
            max_attempts: parse("RETRY_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS.into())?
                .try_into()
                .map_err(|_| invalid(&lookup, "RETRY_MAX_ATTEMPTS", "u32"))?,
            initial_delay: Duration::from_millis(parse(
                "RETRY_INITIAL_DELAY_MS",
                DEFAULT_INITIAL_DELAY.as_millis() as u64,
            )?),
            multiplier: parse("RETRY_MULTIPLIER", DEFAULT_MULTIPLIER.into())?
                .try_into()
                .map_err(|_| invalid(&lookup, "RETRY_MULTIPLIER", "u32"))?,
            max_delay: Duration::from_millis(parse(
                "RETRY_MAX_DELAY_MS",
                DEFAULT_MAX_DELAY.as_millis() as u64,
            )?),
        };

        let intake_capacity = parse("INTAKE_CHANNEL_CAPACITY", 1024)?;
        if intake_capacity == 0 {
            return Err(invalid(&lookup, "INTAKE_CHANNEL_CAPACITY", "positive integer"));
        }

        let push_gateway_url = lookup("PUSH_GATEWAY_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            retry,
            intake_capacity: intake_capacity as usize,
            delivery_expiry: Duration::from_secs(parse("DELIVERY_EXPIRY_SECS", 3600)?),
            sweep_interval: Duration::from_secs(parse("SWEEP_INTERVAL_SECS", 60)?.max(1)),
            sync_retention: Duration::from_secs(parse("SYNC_RETENTION_DAYS", 30)? * 24 * 3600),
            push_gateway_url,
        })
    }
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| invalid(lookup, name, "u64")),
    }
}

fn invalid(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
) -> ConfigError {
    ConfigError::Invalid {
        name,
        expected,
        value: lookup(name).unwrap_or_default(),
    }
}
