//! # Structured Logging Module
//!
//! Environment-aware structured logging. Development and test get a
//! human-readable console layer at debug level; production gets JSON at
//! info level. `RUST_LOG` always wins when set.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::locking::LockName;
use crate::models::WorkItemId;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if environment == "production" {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A subscriber may already be installed by the embedding application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current environment from INDEXING_ENV or APP_ENV
pub fn get_environment() -> String {
    std::env::var("INDEXING_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        _ => "debug",
    }
}

/// Log structured data for index and deindex operations
pub fn log_index_operation(
    operation: &str,
    item_id: WorkItemId,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        item_id = item_id.value(),
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 INDEX_OPERATION"
    );
}

/// Log structured data for lock acquire/release
pub fn log_lock_operation(operation: &str, lock_name: &LockName, status: &str) {
    tracing::debug!(
        operation = %operation,
        lock_name = %lock_name,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "🔒 LOCK_OPERATION"
    );
}
