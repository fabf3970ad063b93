//! Bounded-parallel fan-out shared by traverse, sync, GC, and shard (§5).
//!
//! Mirrors the original's `errgroup.Group` + `semaphore.Weighted` pair: a
//! task that acquires a permit is spawned onto a [`JoinSet`]; one that
//! can't is run inline on the caller. The `JoinSet` collapses on the first
//! `Err`, the Rust analogue of `errgroup`'s "first error cancels the
//! derived context" behavior.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::{GlfsError, Result};

/// A semaphore sized to the number of hardware threads, the typical bound
/// named in §5's "Scheduling model".
pub fn default_semaphore() -> Arc<Semaphore> {
    let permits = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    Arc::new(Semaphore::new(permits))
}

/// Run every task in `tasks`, spawning as many concurrently as `sem` has
/// permits for and running the rest inline. Returns the first error
/// encountered; remaining spawned tasks are dropped (their `JoinHandle`s
/// are aborted when the `JoinSet` itself is dropped). Checked against
/// `cancel` before each task is launched and after the fan-out completes,
/// so a cancellation observed mid-traversal stops scheduling further
/// siblings without aborting ones already in flight (§5 "Cancellation and
/// timeouts": partial mutations from cancelled work are harmless leaks).
pub async fn run_bounded<F, Fut>(sem: &Arc<Semaphore>, cancel: &CancellationToken, tasks: Vec<F>) -> Result<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let mut joins: JoinSet<Result<()>> = JoinSet::new();
    for task in tasks {
        if cancel.is_cancelled() {
            return Err(GlfsError::Cancelled);
        }
        match Arc::clone(sem).try_acquire_owned() {
            Ok(permit) => {
                joins.spawn(async move {
                    let _permit = permit;
                    task().await
                });
            }
            Err(_) => task().await?,
        }
    }
    while let Some(joined) = joins.join_next().await {
        match joined {
            Ok(result) => result?,
            Err(join_err) => {
                return Err(GlfsError::BadConfiguration(format!(
                    "task panicked during bounded fan-out: {join_err}"
                )));
            }
        }
    }
    if cancel.is_cancelled() {
        return Err(GlfsError::Cancelled);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn all_tasks_run_exactly_once() {
        let sem = Arc::new(Semaphore::new(2));
        let cancel = CancellationToken::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let counter = Arc::clone(&counter);
                move || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }
            })
            .collect();
        run_bounded(&sem, &cancel, tasks).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }

    #[tokio::test]
    async fn first_error_propagates() {
        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        let tasks = vec![|| async { Err(GlfsError::BadConfiguration("boom".into())) }];
        let err = run_bounded(&sem, &cancel, tasks).await.unwrap_err();
        assert!(matches!(err, GlfsError::BadConfiguration(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_any_task_runs() {
        let sem = Arc::new(Semaphore::new(4));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        let tasks = vec![move || {
            let counter = Arc::clone(&counter2);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }];
        let err = run_bounded(&sem, &cancel, tasks).await.unwrap_err();
        assert!(matches!(err, GlfsError::Cancelled));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
