//! In-process [`TaskQueue`] backed by tokio tasks.
//!
//! Used for tests and single-node deployments. Closing the queue makes every
//! schedule call fail with [`QueueError::BrokerUnavailable`], which is how the
//! coordinator's fallback paths get exercised without a real broker.
//!
//! Finished handles are pruned on every schedule call and only the most
//! recent run reports are retained, so bookkeeping stays bounded in a
//! long-running process.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::executor::{ChainExecutor, ChainRunReport, TaskRunOutcome};
use super::{ChainHandle, IndexingChain, QueueError, TaskHandle, TaskQueue, TaskSignature};

/// Run reports kept per kind when no capacity is given
pub const DEFAULT_REPORT_CAPACITY: usize = 256;

/// Record of a direct task that ran on the local queue
#[derive(Debug, Clone)]
pub struct CompletedTask {
    pub task_id: String,
    pub task: TaskSignature,
    pub outcome: Result<TaskRunOutcome, crate::error::IndexingError>,
}

#[derive(Debug)]
pub struct LocalTaskQueue {
    executor: Arc<ChainExecutor>,
    closed: AtomicBool,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    chain_reports: Arc<Mutex<VecDeque<ChainRunReport>>>,
    completed_tasks: Arc<Mutex<VecDeque<CompletedTask>>>,
    report_capacity: usize,
}

fn push_bounded<T>(reports: &Mutex<VecDeque<T>>, capacity: usize, report: T) {
    let mut reports = reports.lock();
    if capacity == 0 {
        return;
    }
    while reports.len() >= capacity {
        reports.pop_front();
    }
    reports.push_back(report);
}

impl LocalTaskQueue {
    pub fn new(executor: Arc<ChainExecutor>) -> Self {
        Self::with_report_capacity(executor, DEFAULT_REPORT_CAPACITY)
    }

    /// Keep at most `capacity` chain reports and completed tasks; 0 keeps none
    pub fn with_report_capacity(executor: Arc<ChainExecutor>, capacity: usize) -> Self {
        Self {
            executor,
            closed: AtomicBool::new(false),
            in_flight: Mutex::new(Vec::new()),
            chain_reports: Arc::new(Mutex::new(VecDeque::new())),
            completed_tasks: Arc::new(Mutex::new(VecDeque::new())),
            report_capacity: capacity,
        }
    }

    /// Simulate a broker outage
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn reopen(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for every task scheduled so far, including delayed ones
    pub async fn drain(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock());
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Local task terminated abnormally");
                }
            }
        }
    }

    /// Most recent chain reports, oldest first
    pub fn chain_reports(&self) -> Vec<ChainRunReport> {
        self.chain_reports.lock().iter().cloned().collect()
    }

    pub fn completed_tasks(&self) -> Vec<CompletedTask> {
        self.completed_tasks.lock().iter().cloned().collect()
    }

    /// Handles not yet pruned; finished ones linger until the next schedule call
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn ensure_open(&self) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::BrokerUnavailable(
                "local task queue is closed".to_string(),
            ));
        }
        Ok(())
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|pending| !pending.is_finished());
        in_flight.push(handle);
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn schedule(
        &self,
        task: TaskSignature,
        queue: &str,
        countdown: Option<Duration>,
    ) -> Result<TaskHandle, QueueError> {
        self.ensure_open()?;

        let task_id = Uuid::new_v4().to_string();
        debug!(task_id = %task_id, task = task.task_name(), queue = queue, countdown = ?countdown, "Scheduling local task");

        let executor = self.executor.clone();
        let completed = self.completed_tasks.clone();
        let capacity = self.report_capacity;
        let id = task_id.clone();
        self.track(tokio::spawn(async move {
            if let Some(delay) = countdown {
                tokio::time::sleep(delay).await;
            }
            let outcome = executor.run_task(&task).await;
            if let Err(e) = &outcome {
                warn!(task_id = %id, task = task.task_name(), error = %e, "Local task failed");
            }
            push_bounded(
                &completed,
                capacity,
                CompletedTask {
                    task_id: id,
                    task,
                    outcome,
                },
            );
        }));

        Ok(TaskHandle {
            task_id,
            task_name: task.task_name().to_string(),
            countdown,
            scheduled_at: Utc::now(),
        })
    }

    async fn schedule_chain(
        &self,
        chain: IndexingChain,
        queue: &str,
    ) -> Result<ChainHandle, QueueError> {
        self.ensure_open()?;

        let id = Uuid::new_v4().to_string();
        let step_count = chain.steps().len();
        debug!(chain_id = %id, item_id = %chain.item_id(), steps = step_count, queue = queue, "Scheduling local chain");

        let executor = self.executor.clone();
        let reports = self.chain_reports.clone();
        let capacity = self.report_capacity;
        self.track(tokio::spawn(async move {
            let report = executor.run_chain(&chain).await;
            push_bounded(&reports, capacity, report);
        }));

        Ok(ChainHandle {
            id,
            step_count,
            scheduled_at: Utc::now(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
