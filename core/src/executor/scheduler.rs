use std::future::Future;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::Semaphore;

/// Run one batch of tasks concurrently, at most `max_concurrency` at a time,
/// and join on all of them.
///
/// Futures are polled on the calling task, so they may borrow from the caller
/// (the execution context in particular). Results come back in completion
/// order, keyed by task id.
///
/// # Arguments
///
/// * `task_ids` - Ids of the tasks to run in this batch
/// * `max_concurrency` - Maximum number of concurrent tasks
/// * `executor_fn` - Async function running a single task
pub async fn execute_batch_parallel<F, Fut, R>(
    task_ids: &[String],
    max_concurrency: usize,
    executor_fn: F,
) -> Vec<(String, R)>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = R>,
{
    let sem = Semaphore::new(max_concurrency.max(1));
    let mut futs: FuturesUnordered<_> = FuturesUnordered::new();

    for id in task_ids {
        let task_id = id.clone();
        let sem = &sem;
        let fut = executor_fn(task_id.clone());

        futs.push(async move {
            // The semaphore is never closed, so acquire only fails if it were.
            let _permit = sem.acquire().await.ok();
            (task_id, fut.await)
        });
    }

    let mut results = Vec::with_capacity(task_ids.len());
    while let Some(res) = futs.next().await {
        results.push(res);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let ids: Vec<String> = (0..6).map(|i| format!("t{i}")).collect();

        let results = execute_batch_parallel(&ids, 2, |id| {
            let running = &running;
            let peak = &peak;
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                id.len()
            }
        })
        .await;

        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
