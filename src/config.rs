//! Feed configuration
//!
//! Every setting has a default; the binary overrides them from
//! `ATTENDANCE_FEED_*` environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::types::{FeedError, FeedResult};

/// Default number of events kept in the rolling window
pub const WINDOW_CAPACITY: usize = 20;

/// Default synthetic load rate (events per second)
pub const DEFAULT_LOAD_RATE: u32 = 50;

/// How strictly inbound transport payloads are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// Accept any JSON object and fill in what is missing
    #[default]
    Permissive,
    /// Reject payloads that are not a complete, recognized event
    Strict,
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "permissive" => Ok(ValidationMode::Permissive),
            "strict" => Ok(ValidationMode::Strict),
            other => Err(format!("expected 'permissive' or 'strict', got '{}'", other)),
        }
    }
}

/// Reconnect backoff used by streaming transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay to use after `current`, doubling up to `max_delay`
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay)
    }
}

/// Configuration for [`crate::FeedService`] and the binary around it
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Transport endpoint to connect at startup
    pub endpoint: Option<String>,
    /// Rolling window size
    pub window_capacity: usize,
    /// Rate used when load is started without an explicit rate
    pub default_load_rate: u32,
    /// Start the synthetic generator at startup
    pub autostart_load: bool,
    /// Seed for the synthetic generator; OS entropy when unset
    pub load_seed: Option<u64>,
    pub validation: ValidationMode,
    /// Address the WebSocket bridge listens on
    pub bind_addr: String,
    /// Per-client snapshot buffer in the WebSocket bridge
    pub observer_buffer: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            window_capacity: WINDOW_CAPACITY,
            default_load_rate: DEFAULT_LOAD_RATE,
            autostart_load: false,
            load_seed: None,
            validation: ValidationMode::Permissive,
            bind_addr: "127.0.0.1:3100".to_string(),
            observer_buffer: 256,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl FeedConfig {
    pub const ENDPOINT_VAR: &'static str = "ATTENDANCE_FEED_URL";
    pub const WINDOW_VAR: &'static str = "ATTENDANCE_FEED_WINDOW";
    pub const LOAD_RATE_VAR: &'static str = "ATTENDANCE_FEED_LOAD_RATE";
    pub const AUTOSTART_VAR: &'static str = "ATTENDANCE_FEED_AUTOSTART";
    pub const SEED_VAR: &'static str = "ATTENDANCE_FEED_SEED";
    pub const VALIDATION_VAR: &'static str = "ATTENDANCE_FEED_VALIDATION";
    pub const BIND_VAR: &'static str = "ATTENDANCE_FEED_BIND";
    pub const OBSERVER_BUFFER_VAR: &'static str = "ATTENDANCE_FEED_OBSERVER_BUFFER";
    pub const RECONNECT_VAR: &'static str = "ATTENDANCE_FEED_RECONNECT_MS";
    pub const RECONNECT_MAX_VAR: &'static str = "ATTENDANCE_FEED_RECONNECT_MAX_MS";

    /// Load configuration from the process environment
    pub fn from_env() -> FeedResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> FeedResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(endpoint) = get(Self::ENDPOINT_VAR) {
            config.endpoint = Some(endpoint);
        }
        if let Some(raw) = get(Self::WINDOW_VAR) {
            config.window_capacity = parse_value(Self::WINDOW_VAR, &raw)?;
            if config.window_capacity == 0 {
                return Err(config_error(Self::WINDOW_VAR, "window capacity must be at least 1"));
            }
        }
        if let Some(raw) = get(Self::LOAD_RATE_VAR) {
            config.default_load_rate = parse_value(Self::LOAD_RATE_VAR, &raw)?;
        }
        if let Some(raw) = get(Self::AUTOSTART_VAR) {
            config.autostart_load = parse_flag(Self::AUTOSTART_VAR, &raw)?;
        }
        if let Some(raw) = get(Self::SEED_VAR) {
            config.load_seed = Some(parse_value(Self::SEED_VAR, &raw)?);
        }
        if let Some(raw) = get(Self::VALIDATION_VAR) {
            config.validation = raw
                .parse()
                .map_err(|e: String| config_error(Self::VALIDATION_VAR, &e))?;
        }
        if let Some(bind) = get(Self::BIND_VAR) {
            config.bind_addr = bind;
        }
        if let Some(raw) = get(Self::OBSERVER_BUFFER_VAR) {
            config.observer_buffer = parse_value::<usize>(Self::OBSERVER_BUFFER_VAR, &raw)?.max(1);
        }
        if let Some(raw) = get(Self::RECONNECT_VAR) {
            config.reconnect.initial_delay =
                Duration::from_millis(parse_value(Self::RECONNECT_VAR, &raw)?);
        }
        if let Some(raw) = get(Self::RECONNECT_MAX_VAR) {
            config.reconnect.max_delay =
                Duration::from_millis(parse_value(Self::RECONNECT_MAX_VAR, &raw)?);
        }
        if config.reconnect.max_delay < config.reconnect.initial_delay {
            config.reconnect.max_delay = config.reconnect.initial_delay;
        }

        Ok(config)
    }

    /// Builder-style setter for the endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Builder-style setter for the generator seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.load_seed = Some(seed);
        self
    }

    /// Builder-style setter for the validation mode
    pub fn with_validation(mut self, validation: ValidationMode) -> Self {
        self.validation = validation;
        self
    }
}

fn parse_value<T>(key: &str, raw: &str) -> FeedResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| config_error(key, &e.to_string()))
}

fn parse_flag(key: &str, raw: &str) -> FeedResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(config_error(key, &format!("expected a boolean, got '{}'", other))),
    }
}

fn config_error(key: &str, message: &str) -> FeedError {
    FeedError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = FeedConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.endpoint, None);
        assert_eq!(config.window_capacity, WINDOW_CAPACITY);
        assert_eq!(config.default_load_rate, DEFAULT_LOAD_RATE);
        assert!(!config.autostart_load);
        assert_eq!(config.validation, ValidationMode::Permissive);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let config = FeedConfig::from_lookup(lookup(&[
            ("ATTENDANCE_FEED_URL", "http://localhost:3000/events"),
            ("ATTENDANCE_FEED_WINDOW", "5"),
            ("ATTENDANCE_FEED_LOAD_RATE", "200"),
            ("ATTENDANCE_FEED_AUTOSTART", "yes"),
            ("ATTENDANCE_FEED_SEED", "42"),
            ("ATTENDANCE_FEED_VALIDATION", "Strict"),
            ("ATTENDANCE_FEED_RECONNECT_MS", "100"),
        ]))
        .unwrap();

        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:3000/events"));
        assert_eq!(config.window_capacity, 5);
        assert_eq!(config.default_load_rate, 200);
        assert!(config.autostart_load);
        assert_eq!(config.load_seed, Some(42));
        assert_eq!(config.validation, ValidationMode::Strict);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = FeedConfig::from_lookup(lookup(&[("ATTENDANCE_FEED_LOAD_RATE", "fast")]))
            .unwrap_err();
        assert!(matches!(err, FeedError::Config { ref key, .. } if key == "ATTENDANCE_FEED_LOAD_RATE"));

        let err = FeedConfig::from_lookup(lookup(&[("ATTENDANCE_FEED_WINDOW", "0")])).unwrap_err();
        assert!(matches!(err, FeedError::Config { .. }));
    }

    #[test]
    fn test_reconnect_backoff_is_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_millis(1000),
        };
        let second = policy.next_delay(policy.initial_delay);
        assert_eq!(second, Duration::from_millis(800));
        assert_eq!(policy.next_delay(second), Duration::from_millis(1000));
    }
}
