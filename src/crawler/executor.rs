//! Task execution
//!
//! The session hands long-running work (queue seeding, crawl passes) to a
//! [`TaskExecutor`]. `execute_on_one` runs a task once; `execute_on_all` runs
//! one instance per participating node. [`LocalTaskExecutor`] is the single
//! node case: every task runs as a tokio task of this process.

use crate::{Result, TidemarkError};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A boxed unit of work
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Builds one instance of a task per node
pub type TaskFactory = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Boxes a future into a [`TaskFuture`]
pub fn boxed<F>(future: F) -> TaskFuture
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    Box::pin(future)
}

/// Options of a task run on every node
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    /// Display name used in logs, defaults to the task id
    pub name: Option<String>,
}

impl TaskOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Runs crawl tasks
pub trait TaskExecutor: Send + Sync {
    /// Runs a task on a single node
    fn execute_on_one(&self, task_id: &str, task: TaskFuture) -> TaskHandle;

    /// Runs one instance of a task on every node
    fn execute_on_all(&self, task_id: &str, factory: TaskFactory, options: TaskOptions)
        -> TaskHandle;
}

/// Handle to running task instances
#[derive(Debug)]
pub struct TaskHandle {
    task_id: String,
    handles: Vec<JoinHandle<Result<()>>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Returns true once every instance completed
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Waits for every instance
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Every instance succeeded
    /// * `Err(TidemarkError)` - The first instance error, or `Task` if an
    ///   instance panicked or was cancelled
    pub async fn join(self) -> Result<()> {
        let mut first_error = None;
        for handle in self.handles {
            let outcome = handle.await.map_err(|e| TidemarkError::Task {
                task_id: self.task_id.clone(),
                message: e.to_string(),
            });
            if let Err(e) | Ok(Err(e)) = outcome {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Waits for every instance, at most `timeout`
    ///
    /// On timeout the instances are aborted and a `Task` error is returned.
    pub async fn join_timeout(self, timeout: Duration) -> Result<()> {
        let task_id = self.task_id.clone();
        let aborts: Vec<_> = self.handles.iter().map(JoinHandle::abort_handle).collect();
        match tokio::time::timeout(timeout, self.join()).await {
            Ok(result) => result,
            Err(_) => {
                for abort in aborts {
                    abort.abort();
                }
                Err(TidemarkError::Task {
                    task_id,
                    message: format!("did not complete within {:?}", timeout),
                })
            }
        }
    }
}

/// Runs tasks on the current tokio runtime
///
/// This process is the only node, so `execute_on_all` runs a single
/// instance.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTaskExecutor;

impl LocalTaskExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl TaskExecutor for LocalTaskExecutor {
    fn execute_on_one(&self, task_id: &str, task: TaskFuture) -> TaskHandle {
        tracing::debug!("Running task \"{}\"", task_id);
        TaskHandle {
            task_id: task_id.to_string(),
            handles: vec![tokio::spawn(task)],
        }
    }

    fn execute_on_all(
        &self,
        task_id: &str,
        factory: TaskFactory,
        options: TaskOptions,
    ) -> TaskHandle {
        tracing::debug!(
            "Running task \"{}\" on all nodes",
            options.name.as_deref().unwrap_or(task_id)
        );
        TaskHandle {
            task_id: task_id.to_string(),
            handles: vec![tokio::spawn(factory())],
        }
    }
}
