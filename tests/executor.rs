//! Executor workers, fault containment and pool placement.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;

use minirpc::{Executor, ExecutorPool};

#[tokio::test]
async fn runs_submitted_tasks() {
    let executor = Executor::start(2);
    let result = executor.execute_with_future(async { 40 + 2 }).await.expect("task result");
    assert_eq!(result, 42);
    executor.stop().await;
}

#[tokio::test]
async fn single_worker_runs_tasks_in_submission_order() {
    let executor = Executor::start(1);
    let log = Arc::new(Mutex::new(Vec::new()));
    for i in 0..10 {
        let log = Arc::clone(&log);
        executor.execute(async move {
            log.lock().expect("log lock").push(i);
        });
    }
    // Queued last, so by the time it runs the others have finished.
    executor.execute_with_future(async {}).await.expect("drain marker");
    assert_eq!(*log.lock().expect("log lock"), (0..10).collect::<Vec<_>>());
    executor.stop().await;
}

#[tokio::test]
async fn worker_survives_a_panicking_task() {
    let executor = Executor::start(1);
    executor.execute(async {
        panic!("boom");
    });
    let result = timeout(Duration::from_secs(5), executor.execute_with_future(async { 7 }))
        .await
        .expect("worker must keep draining")
        .expect("task result");
    assert_eq!(result, 7);
    executor.stop().await;
}

#[tokio::test]
async fn panicking_task_propagates_failure_through_its_future() {
    let executor = Executor::start(1);
    let pending = executor.execute_with_future(async {
        panic!("boom");
    });
    assert!(pending.await.is_err());
    executor.stop().await;
}

#[tokio::test]
async fn counter_tracks_many_concurrent_tasks() {
    let executor = Executor::start(4);
    let count = Arc::new(AtomicUsize::new(0));
    let pendings: Vec<_> = (0..64)
        .map(|_| {
            let count = Arc::clone(&count);
            executor.execute_with_future(async move {
                count.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for pending in pendings {
        pending.await.expect("task result");
    }
    assert_eq!(count.load(Ordering::SeqCst), 64);
    executor.stop().await;
}

#[tokio::test]
async fn spawned_task_does_not_occupy_a_queue_worker() {
    let executor = Executor::start(1);
    let (release, held) = tokio::sync::oneshot::channel::<()>();
    executor.spawn(async move {
        let _ = held.await;
    });
    // The single queue worker stays free while the spawned task waits.
    let result = timeout(Duration::from_secs(5), executor.execute_with_future(async { 9 }))
        .await
        .expect("queue must keep draining")
        .expect("task result");
    assert_eq!(result, 9);
    let _ = release.send(());
    executor.stop().await;
}

#[tokio::test]
async fn spawned_tasks_run_concurrently_with_each_other() {
    let executor = Executor::start(1);
    let barrier = Arc::new(tokio::sync::Barrier::new(8));
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    for _ in 0..8 {
        let barrier = Arc::clone(&barrier);
        let done = done_tx.clone();
        executor.spawn(async move {
            barrier.wait().await;
            let _ = done.send(());
        });
    }
    // The barrier only releases if all eight tasks are in flight at once.
    for _ in 0..8 {
        timeout(Duration::from_secs(5), done_rx.recv())
            .await
            .expect("all spawned tasks must reach the barrier")
            .expect("done channel");
    }
    executor.stop().await;
}

#[tokio::test]
async fn round_robin_placement_cycles() {
    let pool = ExecutorPool::start(2, 1);
    let first = pool.next() as *const Executor;
    let second = pool.next() as *const Executor;
    let third = pool.next() as *const Executor;
    assert!(!std::ptr::eq(first, second));
    assert!(std::ptr::eq(first, third));
    pool.stop().await;
}

#[tokio::test]
async fn keyed_placement_is_sticky() {
    let pool = ExecutorPool::start(4, 1);
    let first = pool.for_key(&"conn-1") as *const Executor;
    let again = pool.for_key(&"conn-1") as *const Executor;
    assert!(std::ptr::eq(first, again));
    pool.stop().await;
}

#[tokio::test]
async fn zero_worker_executor_runs_on_the_caller() {
    let executor = Executor::start(0);
    let pending = executor.execute_with_future(async { 5 });
    let value = tokio::select! {
        _ = executor.run() => panic!("run must not return before stop"),
        result = pending => result.expect("task result"),
    };
    assert_eq!(value, 5);
    executor.stop().await;
}

#[tokio::test]
async fn stopped_executor_rejects_new_tasks() {
    let executor = Executor::start(1);
    executor.stop().await;
    let pending = executor.execute_with_future(async { 1 });
    assert!(pending.await.is_err(), "a stopped executor must not run tasks");
}
