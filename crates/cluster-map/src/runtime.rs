//! Async runtime helpers
//!
//! Thin wrappers around tokio used by the cluster manager: task spawning with an
//! optional profiling scope, off-loading CPU heavy work to the blocking pool, and
//! closure based lock access so guards never escape.

use crate::{ClusterError, Result};

// Re-export the lock so callers sharing state with the manager use the same primitive.
// tokio's RwLock is fair: waiters are served in request order.
pub use tokio::sync::RwLock;

/// Spawn an async task on the current tokio runtime.
pub fn spawn<F>(future: F) -> tokio::task::JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    #[cfg(feature = "profiling")]
    {
        tokio::spawn(async move {
            profiling::scope!(
                "runtime::spawn",
                format!("task_type={}", std::any::type_name::<F>()).as_str()
            );
            future.await
        })
    }
    #[cfg(not(feature = "profiling"))]
    {
        tokio::spawn(future)
    }
}

/// Run a CPU bound closure on the blocking pool and wait for it.
///
/// A panic inside the closure is reported as [`ClusterError::TaskFailed`].
pub async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|error| ClusterError::TaskFailed(error.to_string()))
}

/// Acquire a read lock and run a closure while holding it.
pub async fn with_read<T, R, F>(lock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&T) -> R + Send,
    R: Send,
{
    let guard = lock.read().await;
    f(&*guard)
}

/// Acquire a write lock and run a closure while holding it.
pub async fn with_write<T, R, F>(lock: &RwLock<T>, f: F) -> R
where
    F: FnOnce(&mut T) -> R + Send,
    R: Send,
{
    let mut guard = lock.write().await;
    f(&mut *guard)
}
