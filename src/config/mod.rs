//! # Configuration Management
//!
//! Typed configuration for the indexing coordinator, loaded from YAML with
//! environment overrides.
//!
//! ## Layering
//!
//! 1. Built-in defaults (every section is `#[serde(default)]`)
//! 2. `config/indexing.yaml`
//! 3. `config/indexing.<environment>.yaml`
//! 4. `INDEXING__<SECTION>__<FIELD>` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use indexing_coordinator::config::ConfigManager;
//!
//! let manager = ConfigManager::load().expect("configuration");
//! let timeout = manager.config().locks.execution_lock_timeout();
//! println!("execution locks expire after {timeout:?}");
//! ```

mod loader;

pub use loader::ConfigManager;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration value for '{field}': {reason}")]
    Invalid { field: String, reason: String },
}

impl ConfigurationError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigurationError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub locks: LocksConfig,
    pub queues: QueuesConfig,
    pub retry: RetryConfig,
    pub batch: BatchConfig,
    pub metrics: MetricsConfig,
}

impl IndexingConfig {
    /// Defaults with short timeouts for tests
    pub fn for_testing() -> Self {
        Self {
            locks: LocksConfig {
                execution_lock_timeout_seconds: 5,
                scheduling_lock_timeout_seconds: 1,
                ..LocksConfig::default()
            },
            queues: QueuesConfig {
                fallback_hierarchy_countdown_seconds: 0,
                ..QueuesConfig::default()
            },
            retry: RetryConfig {
                base_delay_ms: 1,
                max_delay_ms: 10,
                jitter: false,
                ..RetryConfig::default()
            },
            batch: BatchConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.locks.execution_lock_prefix.is_empty() {
            return Err(ConfigurationError::invalid(
                "locks.execution_lock_prefix",
                "must not be empty",
            ));
        }
        if self.locks.scheduling_lock_prefix.is_empty() {
            return Err(ConfigurationError::invalid(
                "locks.scheduling_lock_prefix",
                "must not be empty",
            ));
        }
        if self.locks.execution_lock_prefix == self.locks.scheduling_lock_prefix {
            return Err(ConfigurationError::invalid(
                "locks.scheduling_lock_prefix",
                "must differ from locks.execution_lock_prefix",
            ));
        }
        if self.locks.execution_lock_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid(
                "locks.execution_lock_timeout_seconds",
                "must be greater than zero",
            ));
        }
        if self.locks.scheduling_lock_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid(
                "locks.scheduling_lock_timeout_seconds",
                "must be greater than zero",
            ));
        }
        if self.queues.indexing_queue.is_empty() {
            return Err(ConfigurationError::invalid(
                "queues.indexing_queue",
                "must not be empty",
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::invalid(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::invalid(
                "retry.backoff_multiplier",
                format!("must be >= 1.0, got {}", self.retry.backoff_multiplier),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigurationError::invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.batch.chunk_size == 0 {
            return Err(ConfigurationError::invalid(
                "batch.chunk_size",
                "must be greater than zero",
            ));
        }
        if self.batch.max_batch_size == 0 {
            return Err(ConfigurationError::invalid(
                "batch.max_batch_size",
                "must be greater than zero",
            ));
        }
        if self.metrics.counter_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid(
                "metrics.counter_ttl_seconds",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Lock naming and expiry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocksConfig {
    pub execution_lock_prefix: String,
    pub scheduling_lock_prefix: String,
    /// Upper bound on how long an execution lock outlives a crashed worker
    pub execution_lock_timeout_seconds: u64,
    pub scheduling_lock_timeout_seconds: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            execution_lock_prefix: constants::DEFAULT_EXECUTION_LOCK_PREFIX.to_string(),
            scheduling_lock_prefix: constants::DEFAULT_SCHEDULING_LOCK_PREFIX.to_string(),
            execution_lock_timeout_seconds: constants::DEFAULT_EXECUTION_LOCK_TIMEOUT_SECONDS,
            scheduling_lock_timeout_seconds: constants::DEFAULT_SCHEDULING_LOCK_TIMEOUT_SECONDS,
        }
    }
}

impl LocksConfig {
    pub fn execution_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_lock_timeout_seconds)
    }

    pub fn scheduling_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.scheduling_lock_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub indexing_queue: String,
    /// Delay applied to the hierarchy task on the fallback path
    pub fallback_hierarchy_countdown_seconds: u64,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            indexing_queue: constants::DEFAULT_INDEXING_QUEUE.to_string(),
            fallback_hierarchy_countdown_seconds:
                constants::DEFAULT_FALLBACK_HIERARCHY_COUNTDOWN_SECONDS,
        }
    }
}

impl QueuesConfig {
    pub fn fallback_hierarchy_countdown(&self) -> Duration {
        Duration::from_secs(self.fallback_hierarchy_countdown_seconds)
    }
}

/// Retry behaviour of the task layer
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub max_batch_size: usize,
    pub fail_fast: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            max_batch_size: constants::DEFAULT_MAX_BATCH_SIZE,
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub counter_ttl_seconds: u64,
    pub summary_interval_seconds: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            counter_ttl_seconds: constants::DEFAULT_COUNTER_TTL_SECONDS,
            summary_interval_seconds: constants::DEFAULT_SUMMARY_INTERVAL_SECONDS,
        }
    }
}

impl MetricsConfig {
    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_seconds)
    }
}
