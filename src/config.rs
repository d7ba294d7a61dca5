use std::time::Duration;

use config::{Config, ConfigError};
use serde::Deserialize;

use crate::retry::RetryPolicy;

/// Deployment knobs. Read from `hold_settlement.toml` (optional), then from
/// `HOLDS_*` environment variables, e.g. `HOLDS_HOLD_DEADLINE_MS=500` or
/// `HOLDS_RETRY__MAX_ATTEMPTS=5`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// How long a hold waits for a presentment before it is voided.
    pub hold_deadline_ms: u64,
    /// Per-attempt bound for ledger calls made by the authorization saga.
    pub activity_timeout_ms: u64,
    /// Per-attempt bound for balance lookups and presentment signalling.
    pub query_timeout_ms: u64,
    pub retry: RetryConfig,
    pub ledger: u32,
    pub code: u16,
    pub reconcile_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hold_deadline_ms: 100_000,
            activity_timeout_ms: 10_000,
            query_timeout_ms: 5_000,
            retry: RetryConfig::default(),
            ledger: 1,
            code: 1,
            reconcile_on_start: true,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            max_delay_ms: 1_000,
            jitter_pct: 0.2,
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("hold_settlement").required(false))
            .add_source(
                config::Environment::with_prefix("HOLDS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_deadline_ms == 0 {
            return Err(ConfigError::Message(
                "hold_deadline_ms must be positive".to_string(),
            ));
        }
        if self.activity_timeout_ms == 0 || self.query_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "activity timeouts must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn hold_deadline(&self) -> Duration {
        Duration::from_millis(self.hold_deadline_ms)
    }

    pub fn activity_timeout(&self) -> Duration {
        Duration::from_millis(self.activity_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            self.retry.base_delay_ms,
            self.retry.max_delay_ms,
            self.retry.jitter_pct,
        )
    }
}
