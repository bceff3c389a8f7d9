//! Background Task Execution Implementation

use async_trait::async_trait;
use bridge_traits::{
    background::{BackgroundExecutor, DeferredJob, TaskId, TaskStatus},
    error::Result,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

/// Tokio-based background executor for desktop.
///
/// Each scheduled job runs on its own spawned task that sleeps for the
/// requested delay unless it is cancelled first.
pub struct TokioBackgroundExecutor {
    tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
}

struct TaskInfo {
    status: TaskStatus,
    /// Distinguishes re-armed tasks that share an id.
    generation: u64,
    handle: Option<JoinHandle<()>>,
    cancel: Option<oneshot::Sender<()>>,
}

impl TokioBackgroundExecutor {
    /// Create a new background executor.
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn set_status(
        tasks: &RwLock<HashMap<TaskId, TaskInfo>>,
        id: &TaskId,
        generation: u64,
        status: TaskStatus,
    ) {
        let mut tasks = tasks.write().await;
        if let Some(info) = tasks.get_mut(id) {
            if info.generation == generation {
                info.status = status;
                if status == TaskStatus::Running {
                    info.cancel = None;
                }
            }
        }
    }

    async fn run_one_time_task(
        tasks: Arc<RwLock<HashMap<TaskId, TaskInfo>>>,
        id: TaskId,
        generation: u64,
        delay: Duration,
        job: DeferredJob,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let delay_sleep = sleep(delay);
        tokio::pin!(delay_sleep);
        tokio::select! {
            _ = &mut cancel_rx => {
                Self::set_status(&tasks, &id, generation, TaskStatus::Cancelled).await;
                return;
            }
            _ = delay_sleep.as_mut() => {}
        }

        Self::set_status(&tasks, &id, generation, TaskStatus::Running).await;
        debug!(task_id = %id, "Running deferred task");

        job().await;

        Self::set_status(&tasks, &id, generation, TaskStatus::Completed).await;
    }
}

impl Default for TokioBackgroundExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackgroundExecutor for TokioBackgroundExecutor {
    async fn schedule_once(
        &self,
        task_id: &str,
        delay: Duration,
        job: DeferredJob,
    ) -> Result<TaskId> {
        let id = TaskId::new(task_id);

        debug!(
            task_id = task_id,
            delay_ms = delay.as_millis() as u64,
            "Scheduling one-time task"
        );

        let (cancel_tx, cancel_rx) = oneshot::channel();

        let mut tasks = self.tasks.write().await;
        let generation = match tasks.remove(&id) {
            Some(mut previous) => {
                if previous.status == TaskStatus::Scheduled {
                    debug!(task_id = task_id, "Replacing pending task");
                    if let Some(cancel) = previous.cancel.take() {
                        let _ = cancel.send(());
                    }
                }
                previous.generation + 1
            }
            None => 0,
        };

        let handle = tokio::spawn(Self::run_one_time_task(
            Arc::clone(&self.tasks),
            id.clone(),
            generation,
            delay,
            job,
            cancel_rx,
        ));

        tasks.insert(
            id.clone(),
            TaskInfo {
                status: TaskStatus::Scheduled,
                generation,
                handle: Some(handle),
                cancel: Some(cancel_tx),
            },
        );

        Ok(id)
    }

    async fn cancel_task(&self, task_id: &TaskId) -> Result<()> {
        let mut tasks = self.tasks.write().await;
        let Some(info) = tasks.get_mut(task_id) else {
            return Ok(());
        };

        if info.status == TaskStatus::Scheduled {
            debug!(task_id = %task_id, "Cancelling task");
            if let Some(cancel) = info.cancel.take() {
                let _ = cancel.send(());
            }
            if let Some(handle) = info.handle.take() {
                handle.abort();
            }
            info.status = TaskStatus::Cancelled;
        }

        Ok(())
    }

    async fn get_task_status(&self, task_id: &TaskId) -> Result<Option<TaskStatus>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).map(|info| info.status))
    }

    async fn list_tasks(&self) -> Result<Vec<TaskId>> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .iter()
            .filter(|(_, info)| info.status == TaskStatus::Scheduled)
            .map(|(id, _)| id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::background::deferred_job;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_job(counter: &Arc<AtomicUsize>) -> DeferredJob {
        let counter = Arc::clone(counter);
        deferred_job(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_schedule_once_executes() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let task_id = executor
            .schedule_once("once", Duration::from_millis(20), counting_job(&counter))
            .await
            .unwrap();

        sleep(Duration::from_millis(120)).await;

        assert_eq!(
            executor.get_task_status(&task_id).await.unwrap(),
            Some(TaskStatus::Completed)
        );
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(executor.list_tasks().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let executor = TokioBackgroundExecutor::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let task_id = executor
            .schedule_once("cancel", Duration::from_millis(40), counting_job(&counter))
            .await
            .unwrap();
        executor.cancel_task(&task_id).await.unwrap();

        sleep(Duration::from_millis(120)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(
            executor.get_task_status(&task_id).await.unwrap(),
            Some(TaskStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_cancel_unknown_task_is_ok() {
        let executor = TokioBackgroundExecutor::new();
        executor.cancel_task(&TaskId::new("missing")).await.unwrap();
        assert!(executor
            .get_task_status(&TaskId::new("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rescheduling_replaces_pending_job() {
        let executor = TokioBackgroundExecutor::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        executor
            .schedule_once("idle", Duration::from_millis(30), counting_job(&first))
            .await
            .unwrap();
        executor
            .schedule_once("idle", Duration::from_millis(60), counting_job(&second))
            .await
            .unwrap();

        sleep(Duration::from_millis(150)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }
}
