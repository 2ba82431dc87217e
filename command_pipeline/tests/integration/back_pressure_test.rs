//! # Back-Pressure Tests
//!
//! The suspend-strategy admission scenario (immediate grant, FIFO queue,
//! rejection past the outstanding cap) and the semaphore's quantified
//! bounds under concurrent load.

use std::time::Duration;

use command_pipeline::infrastructure::runtime::{
    BackPressureConfig, BackPressureSemaphore, BackPressureStrategy,
};

fn suspend_config(max_concurrency: usize, max_outstanding: usize) -> BackPressureConfig {
    BackPressureConfig {
        max_concurrency,
        max_outstanding,
        max_queue_memory: 64 * 1024,
        strategy: BackPressureStrategy::Suspend,
    }
}

/// maxConcurrency=1, maxOutstanding=2, suspend strategy.
#[tokio::test]
async fn test_suspend_scenario_grant_queue_reject_fifo() {
    let semaphore = BackPressureSemaphore::new(suspend_config(1, 2)).unwrap();

    // 1st: immediate grant.
    let first = semaphore.acquire(0).await.unwrap();
    assert_eq!(semaphore.snapshot().in_use, 1);

    // 2nd: queues.
    let sem = semaphore.clone();
    let second = tokio::spawn(async move { sem.acquire(0).await });
    while semaphore.snapshot().queued == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    // 3rd: past maxOutstanding, rejected.
    let err = semaphore.acquire(0).await.unwrap_err();
    assert_eq!(err.kind(), "backPressure.rejected");

    // Releasing the 1st admits the 2nd in FIFO order.
    first.release();
    let second_token = second.await.unwrap().unwrap();
    assert_eq!(semaphore.snapshot().in_use, 1);
    second_token.release();
}

/// in_use never exceeds maxConcurrency and
/// in_use + queued never exceeds maxOutstanding, under concurrent churn.
#[tokio::test]
async fn test_concurrency_bounds_hold_under_load() {
    let semaphore = BackPressureSemaphore::new(suspend_config(3, 6)).unwrap();

    let mut workers = Vec::new();
    for _ in 0..12 {
        let sem = semaphore.clone();
        workers.push(tokio::spawn(async move {
            for _ in 0..20 {
                if let Ok(token) = sem.acquire(0).await {
                    let snapshot = sem.snapshot();
                    assert!(snapshot.in_use <= 3, "in_use {} over cap", snapshot.in_use);
                    assert!(
                        snapshot.in_use + snapshot.queued <= 6,
                        "outstanding {} over cap",
                        snapshot.in_use + snapshot.queued
                    );
                    tokio::task::yield_now().await;
                    token.release();
                }
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let snapshot = semaphore.snapshot();
    assert_eq!(snapshot.in_use, 0);
    assert_eq!(snapshot.queued, 0);
    assert!(snapshot.peak_in_use <= 3);
    assert!(snapshot.total_admitted > 0);
}

/// Tokens are unique credits: a released slot can be re-granted, but two
/// live tokens never share it.
#[tokio::test]
async fn test_tokens_are_unique_credits() {
    let semaphore = BackPressureSemaphore::new(suspend_config(2, 4)).unwrap();

    let a = semaphore.acquire(0).await.unwrap();
    let b = semaphore.acquire(0).await.unwrap();
    assert_eq!(semaphore.snapshot().in_use, 2);
    assert!(semaphore.try_acquire().is_none());

    drop(a);
    let c = semaphore.try_acquire().unwrap();
    assert_eq!(semaphore.snapshot().in_use, 2);

    drop(b);
    drop(c);
    assert_eq!(semaphore.snapshot().in_use, 0);
}

/// Wait histogram records suspended acquires once they are granted.
#[tokio::test]
async fn test_wait_histogram_records_queued_acquires() {
    let semaphore = BackPressureSemaphore::new(suspend_config(1, 4)).unwrap();
    let first = semaphore.acquire(0).await.unwrap();

    let sem = semaphore.clone();
    let waiter = tokio::spawn(async move { sem.acquire(0).await });
    while semaphore.snapshot().queued == 0 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    first.release();
    waiter.await.unwrap().unwrap();
    assert_eq!(semaphore.wait_histogram().count(), 1);
}
