//! # Indexing Metrics
//!
//! Process-wide counters and running averages for indexing, deindexing,
//! retries and lock-release continuations.
//!
//! Counters are best effort: concurrent writers may interleave, and each key
//! expires after a time-to-live so a long-lived process does not accumulate
//! stale history. Snapshots rebuild the per-error-type breakdown by reading
//! the known `index_failure_<type>` sub-keys.

pub mod reporter;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::MetricsConfig;
use crate::constants::metric_keys;
use crate::error::ErrorType;
use crate::locking::LockReleaseOutcome;

pub use reporter::spawn_summary_reporter;

/// Highest attempt number given its own `retry_count_<n>` key in snapshots
const MAX_TRACKED_RETRY_ATTEMPT: u32 = 10;

#[derive(Debug, Clone)]
struct CounterEntry {
    value: u64,
    expires_at: Instant,
}

#[derive(Debug, Clone)]
struct AverageEntry {
    count: u64,
    mean_ms: f64,
    max_ms: f64,
    expires_at: Instant,
}

/// Running average as exposed in snapshots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageSnapshot {
    pub count: u64,
    pub mean_ms: f64,
    pub max_ms: f64,
}

/// Point-in-time view of the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub collected_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub index_success: u64,
    pub index_failure: u64,
    pub deindex_success: u64,
    pub deindex_failure: u64,
    /// Sum of the four primary counters
    pub total_operations: u64,
    pub retry_count: u64,
    pub success_rate: f64,
    pub error_types: BTreeMap<String, u64>,
    pub retries_by_attempt: BTreeMap<u32, u64>,
    pub lock_releases: BTreeMap<String, u64>,
    pub averages: BTreeMap<String, AverageSnapshot>,
}

impl MetricsSnapshot {
    pub fn summary_line(&self) -> String {
        format!(
            "ops={} index={}/{} deindex={}/{} retries={} success_rate={:.1}%",
            self.total_operations,
            self.index_success,
            self.index_failure,
            self.deindex_success,
            self.deindex_failure,
            self.retry_count,
            self.success_rate * 100.0
        )
    }
}

/// Metrics collector shared through an `Arc`
#[derive(Debug)]
pub struct IndexingMetrics {
    counters: DashMap<String, CounterEntry>,
    averages: DashMap<String, AverageEntry>,
    ttl: Duration,
    started_at: Instant,
}

impl Default for IndexingMetrics {
    fn default() -> Self {
        Self::from_config(&MetricsConfig::default())
    }
}

impl IndexingMetrics {
    pub fn new(ttl: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            averages: DashMap::new(),
            ttl,
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &MetricsConfig) -> Self {
        Self::new(Duration::from_secs(config.counter_ttl_seconds))
    }

    pub fn increment(&self, key: &str) {
        self.increment_by(key, 1);
    }

    /// Add to a counter, restarting it from zero if it had expired
    pub fn increment_by(&self, key: &str, amount: u64) {
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert(CounterEntry {
                value: 0,
                expires_at,
            });
        let counter = &mut *entry;
        if counter.expires_at <= now {
            counter.value = 0;
        }
        counter.value = counter.value.saturating_add(amount);
        counter.expires_at = expires_at;
    }

    /// Current value, zero when missing or expired
    pub fn counter(&self, key: &str) -> u64 {
        let now = Instant::now();
        self.counters
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value)
            .unwrap_or(0)
    }

    pub fn record_duration(&self, operation: &str, duration: Duration) {
        let now = Instant::now();
        let expires_at = now + self.ttl;
        let sample_ms = duration.as_secs_f64() * 1000.0;
        let mut entry = self
            .averages
            .entry(operation.to_string())
            .or_insert(AverageEntry {
                count: 0,
                mean_ms: 0.0,
                max_ms: 0.0,
                expires_at,
            });
        let average = &mut *entry;
        if average.expires_at <= now {
            average.count = 0;
            average.mean_ms = 0.0;
            average.max_ms = 0.0;
        }
        average.count += 1;
        average.mean_ms += (sample_ms - average.mean_ms) / average.count as f64;
        average.max_ms = average.max_ms.max(sample_ms);
        average.expires_at = expires_at;
    }

    pub fn average(&self, operation: &str) -> Option<AverageSnapshot> {
        let now = Instant::now();
        self.averages
            .get(operation)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| AverageSnapshot {
                count: entry.count,
                mean_ms: entry.mean_ms,
                max_ms: entry.max_ms,
            })
    }

    pub fn record_index_success(&self, duration: Duration) {
        self.increment(metric_keys::INDEX_SUCCESS);
        self.record_duration(metric_keys::INDEX_DURATION, duration);
    }

    pub fn record_index_failure(&self, error_type: ErrorType, duration: Duration) {
        self.increment(metric_keys::INDEX_FAILURE);
        self.increment(&Self::failure_key(error_type));
        self.record_duration(metric_keys::INDEX_DURATION, duration);
    }

    pub fn record_deindex_success(&self, duration: Duration) {
        self.increment(metric_keys::DEINDEX_SUCCESS);
        self.record_duration(metric_keys::DEINDEX_DURATION, duration);
    }

    pub fn record_deindex_failure(&self, duration: Duration) {
        self.increment(metric_keys::DEINDEX_FAILURE);
        self.record_duration(metric_keys::DEINDEX_DURATION, duration);
    }

    /// Record that attempt `attempt` failed and is being retried
    pub fn record_retry(&self, attempt: u32) {
        self.increment(metric_keys::RETRY_COUNT);
        self.increment(&format!("{}_{attempt}", metric_keys::RETRY_COUNT));
    }

    pub fn record_lock_release(&self, outcome: LockReleaseOutcome) {
        self.increment(&Self::lock_release_key(outcome));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let index_success = self.counter(metric_keys::INDEX_SUCCESS);
        let index_failure = self.counter(metric_keys::INDEX_FAILURE);
        let deindex_success = self.counter(metric_keys::DEINDEX_SUCCESS);
        let deindex_failure = self.counter(metric_keys::DEINDEX_FAILURE);
        let total_operations = index_success + index_failure + deindex_success + deindex_failure;

        let success_rate = if total_operations > 0 {
            (index_success + deindex_success) as f64 / total_operations as f64
        } else {
            0.0
        };

        let error_types = ErrorType::ALL
            .iter()
            .filter_map(|error_type| {
                let count = self.counter(&Self::failure_key(*error_type));
                (count > 0).then(|| (error_type.as_str().to_string(), count))
            })
            .collect();

        let retries_by_attempt = (1..=MAX_TRACKED_RETRY_ATTEMPT)
            .filter_map(|attempt| {
                let key = format!("{}_{attempt}", metric_keys::RETRY_COUNT);
                let count = self.counter(&key);
                (count > 0).then_some((attempt, count))
            })
            .collect();

        let lock_releases = LockReleaseOutcome::ALL
            .iter()
            .filter_map(|outcome| {
                let count = self.counter(&Self::lock_release_key(*outcome));
                (count > 0).then(|| (outcome.as_str().to_string(), count))
            })
            .collect();

        let averages = [metric_keys::INDEX_DURATION, metric_keys::DEINDEX_DURATION]
            .iter()
            .filter_map(|op| self.average(op).map(|avg| (op.to_string(), avg)))
            .collect();

        MetricsSnapshot {
            collected_at: Utc::now(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            index_success,
            index_failure,
            deindex_success,
            deindex_failure,
            total_operations,
            retry_count: self.counter(metric_keys::RETRY_COUNT),
            success_rate,
            error_types,
            retries_by_attempt,
            lock_releases,
            averages,
        }
    }

    /// Drop expired counters and averages, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.counters.len() + self.averages.len();
        self.counters.retain(|_, entry| entry.expires_at > now);
        self.averages.retain(|_, entry| entry.expires_at > now);
        before - (self.counters.len() + self.averages.len())
    }

    pub fn reset(&self) {
        self.counters.clear();
        self.averages.clear();
    }

    fn failure_key(error_type: ErrorType) -> String {
        format!("{}_{}", metric_keys::INDEX_FAILURE, error_type.as_str())
    }

    fn lock_release_key(outcome: LockReleaseOutcome) -> String {
        format!("{}_{}", metric_keys::LOCK_RELEASE, outcome.as_str())
    }
}
