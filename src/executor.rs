//! Background execution of revalidation tasks.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::error::CacheError;
use crate::utils::{block_on, panic_message};

/// A detached unit of background work.
pub type BackgroundTask = BoxFuture<'static, Result<(), CacheError>>;

/// Observer for failures of background tasks.
pub type FailureHook = Arc<dyn Fn(CacheError) + Send + Sync>;

/// Fire-and-forget runner for background tasks.
///
/// Implementations must not block the caller on `task` and must pass any error
/// the task returns, or a panic it raises, to `on_failure`.
pub trait Executor: Send + Sync {
    /// A name for tracing.
    fn name(&self) -> &'static str;

    /// Run `task` in the background.
    fn execute(&self, task: BackgroundTask, on_failure: FailureHook);
}

/// Runs tasks on a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Spawn onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        TokioExecutor { handle }
    }

    /// Spawn onto the runtime the caller is running in, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn name(&self) -> &'static str {
        "tokio"
    }

    fn execute(&self, task: BackgroundTask, on_failure: FailureHook) {
        self.handle.spawn(async move {
            match AssertUnwindSafe(task).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => on_failure(err),
                Err(payload) => {
                    on_failure(CacheError::background_panic("tokio", panic_message(&*payload)))
                }
            }
        });
    }
}

/// Runs each task to completion on its own OS thread.
///
/// Each thread drives its task on a private current-thread tokio runtime, so
/// factories may use tokio timers even when the cache lives outside a runtime.
#[derive(Debug, Clone, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn execute(&self, task: BackgroundTask, on_failure: FailureHook) {
        let spawned = std::thread::Builder::new()
            .name("swr-revalidate".to_string())
            .spawn(move || match catch_unwind(AssertUnwindSafe(|| block_on(task))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => on_failure(err),
                Err(payload) => {
                    on_failure(CacheError::background_panic("thread", panic_message(&*payload)))
                }
            });

        if let Err(err) = spawned {
            tracing::error!(error = %err, "failed to spawn background revalidation thread");
        }
    }
}

/// Tokio if a runtime is current, otherwise one thread per task.
pub fn default_executor() -> Arc<dyn Executor> {
    match TokioExecutor::current() {
        Some(executor) => Arc::new(executor),
        None => Arc::new(ThreadExecutor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FactoryError;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn recording_hook() -> (FailureHook, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let hook: FailureHook = Arc::new(move |err: CacheError| {
            seen_clone.lock().unwrap().push(err.to_string());
        });
        (hook, seen)
    }

    async fn explode() -> Result<(), CacheError> {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_tokio_executor_runs_task() {
        let executor = TokioExecutor::current().unwrap();
        let (tx, rx) = oneshot::channel();
        let (hook, seen) = recording_hook();

        executor.execute(
            Box::pin(async move {
                let _ = tx.send(42);
                Ok(())
            }),
            hook,
        );

        assert_eq!(rx.await.unwrap(), 42);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tokio_executor_reports_failure() {
        let executor = TokioExecutor::current().unwrap();
        let (hook, seen) = recording_hook();

        executor.execute(
            Box::pin(async {
                Err(CacheError::background_refresh(
                    "k",
                    FactoryError::msg("oh noes"),
                ))
            }),
            hook,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].ends_with("oh noes"));
    }

    #[test]
    fn test_thread_executor_reports_failure() {
        let (hook, seen) = recording_hook();
        let (tx, rx) = std::sync::mpsc::channel();
        let hook: FailureHook = Arc::new(move |err: CacheError| {
            hook(err);
            let _ = tx.send(());
        });

        ThreadExecutor.execute(
            Box::pin(async { Err(CacheError::operation("test", "k", "boom")) }),
            hook,
        );

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_thread_executor_drives_tokio_timers() {
        let (hook, seen) = recording_hook();
        let (tx, rx) = std::sync::mpsc::channel();

        ThreadExecutor.execute(
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let _ = tx.send(42);
                Ok(())
            }),
            hook,
        );

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_thread_executor_reports_panic() {
        let (tx, rx) = std::sync::mpsc::channel();
        let hook: FailureHook = Arc::new(move |err: CacheError| {
            let _ = tx.send(err.to_string());
        });

        ThreadExecutor.execute(Box::pin(explode()), hook);

        let message = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(message, "background task on 'thread' panicked: boom");
    }

    #[tokio::test]
    async fn test_tokio_executor_reports_panic() {
        let executor = TokioExecutor::current().unwrap();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let hook: FailureHook = Arc::new(move |err: CacheError| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(err.to_string());
            }
        });

        executor.execute(Box::pin(explode()), hook);

        assert_eq!(
            rx.await.unwrap(),
            "background task on 'tokio' panicked: boom"
        );
    }

    #[test]
    fn test_default_executor_without_runtime() {
        assert_eq!(default_executor().name(), "thread");
    }

    #[tokio::test]
    async fn test_default_executor_with_runtime() {
        assert_eq!(default_executor().name(), "tokio");
    }
}
