//! Background task registry
//!
//! Every long-running task is spawned through [`BackgroundTasks`] so that it
//! shares one cancellation token, has its panics logged, and is awaited on
//! shutdown.

use futures::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Runs once at startup and is expected to finish
    Warmup,
    /// Long-lived worker
    Worker,
    /// Timer-driven job
    Periodic,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Warmup => write!(f, "Warmup"),
            TaskKind::Worker => write!(f, "Worker"),
            TaskKind::Periodic => write!(f, "Periodic"),
        }
    }
}

struct RegisteredTask {
    name: &'static str,
    kind: TaskKind,
    handle: JoinHandle<()>,
}

/// Owns the background tasks and their shutdown token
///
/// ```ignore
/// let mut tasks = BackgroundTasks::new();
/// let token = tasks.shutdown_token();
/// tasks.spawn("sync_scheduler", TaskKind::Periodic, scheduler.run(token));
/// // ...
/// tasks.shutdown().await;
/// ```
pub struct BackgroundTasks {
    tasks: Vec<RegisteredTask>,
    shutdown: CancellationToken,
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that tasks watch for the shutdown signal
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn a task, logging a panic or an unexpected early exit
    pub fn spawn<F>(&mut self, name: &'static str, kind: TaskKind, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let wrapped = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(()) => {
                    if kind != TaskKind::Warmup && !shutdown.is_cancelled() {
                        tracing::warn!(task = %name, kind = %kind, "Background task exited before shutdown");
                    }
                }
                Err(panic) => {
                    tracing::error!(
                        task = %name,
                        kind = %kind,
                        panic = %panic_message(panic.as_ref()),
                        "Background task panicked"
                    );
                }
            }
        };

        let handle = tokio::spawn(wrapped);
        tracing::debug!(task = %name, kind = %kind, "Registered background task");
        self.tasks.push(RegisteredTask { name, kind, handle });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn count_by_kind(&self, kind: TaskKind) -> usize {
        self.tasks.iter().filter(|t| t.kind == kind).count()
    }

    pub fn log_summary(&self) {
        tracing::info!(
            total = self.tasks.len(),
            workers = self.count_by_kind(TaskKind::Worker),
            periodic = self.count_by_kind(TaskKind::Periodic),
            warmup = self.count_by_kind(TaskKind::Warmup),
            "Background tasks registered"
        );
    }

    /// Number of non-warmup tasks that have already finished
    pub fn check_health(&self) -> usize {
        let failed: Vec<_> = self
            .tasks
            .iter()
            .filter(|t| t.kind != TaskKind::Warmup && t.handle.is_finished())
            .collect();
        for task in &failed {
            tracing::error!(task = %task.name, kind = %task.kind, "Background task is no longer running");
        }
        failed.len()
    }

    /// Cancel every task and wait for all of them to finish
    pub async fn shutdown(self) {
        tracing::info!(count = self.tasks.len(), "Shutting down background tasks");
        self.shutdown.cancel();

        for task in self.tasks {
            match task.handle.await {
                Ok(()) => tracing::debug!(task = %task.name, "Task stopped"),
                Err(e) if e.is_cancelled() => tracing::debug!(task = %task.name, "Task cancelled"),
                Err(e) => tracing::error!(task = %task.name, error = ?e, "Task join failed"),
            }
        }

        tracing::info!("All background tasks stopped");
    }
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn test_shutdown_cancels_workers() {
        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();
        tasks.spawn("waiter", TaskKind::Worker, async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });
        tasks.spawn("warmup", TaskKind::Warmup, async {});

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks.count_by_kind(TaskKind::Worker), 1);
        tasks.shutdown().await;
        assert!(stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_panicking_task_is_contained() {
        let mut tasks = BackgroundTasks::new();
        tasks.spawn("boom", TaskKind::Periodic, async {
            panic!("boom");
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(tasks.check_health(), 1);
        tasks.shutdown().await;
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
    }
}
