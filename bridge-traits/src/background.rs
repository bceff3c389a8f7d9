//! Deferred Job Scheduling
//!
//! One-shot, cancellable jobs used for idle-session closes and close retries.
//! Hosts map this onto whatever wake-up facility the platform offers.

use futures::future::BoxFuture;
use std::fmt;
use std::time::Duration;

use crate::error::Result;

/// Work executed when a deferred task fires.
pub type DeferredJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Build a [`DeferredJob`] from an async closure.
pub fn deferred_job<F, Fut>(f: F) -> DeferredJob
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// Scheduled task identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for its delay to elapse
    Scheduled,
    /// Job is executing
    Running,
    /// Job finished
    Completed,
    /// Cancelled before it ran
    Cancelled,
}

/// Background executor trait
///
/// Scheduling a task id that is already pending replaces the pending job, so
/// callers can re-arm a timer by scheduling it again.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::background::{deferred_job, BackgroundExecutor};
/// use std::time::Duration;
///
/// async fn arm(executor: &dyn BackgroundExecutor) -> Result<()> {
///     executor
///         .schedule_once(
///             "session-inactivity",
///             Duration::from_secs(600),
///             deferred_job(|| async { tracing::info!("idle") }),
///         )
///         .await?;
///     Ok(())
/// }
/// ```
#[async_trait::async_trait]
pub trait BackgroundExecutor: Send + Sync {
    /// Run `job` once after `delay`.
    async fn schedule_once(&self, task_id: &str, delay: Duration, job: DeferredJob)
        -> Result<TaskId>;

    /// Cancel a pending task. Cancelling an unknown id is not an error.
    async fn cancel_task(&self, task_id: &TaskId) -> Result<()>;

    /// Get status of a task, `None` when the id is unknown
    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>>;

    /// List all pending tasks
    async fn list_tasks(&self) -> Result<Vec<TaskId>>;
}
