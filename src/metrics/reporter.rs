use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use super::IndexingMetrics;

/// Periodically purge expired keys and log a summary. Abort the handle to stop.
pub fn spawn_summary_reporter(metrics: Arc<IndexingMetrics>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let purged = metrics.purge_expired();
            let snapshot = metrics.snapshot();

            info!(
                total_operations = snapshot.total_operations,
                index_success = snapshot.index_success,
                index_failure = snapshot.index_failure,
                deindex_success = snapshot.deindex_success,
                deindex_failure = snapshot.deindex_failure,
                retry_count = snapshot.retry_count,
                purged_keys = purged,
                summary = %snapshot.summary_line(),
                "📊 Indexing metrics summary"
            );
        }
    })
}
