//! Behaviour of the facade that the sync engine depends on.

use core_async::sync::{broadcast, CancellationToken, Mutex, Notify};
use core_async::time::{self, Duration, Instant, MissedTickBehavior};
use core_async::{runtime, task};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[core_async::test]
async fn test_run_until_cancelled_abandons_pending_future() {
    let token = CancellationToken::new();
    let canceller = token.clone();

    let worker = task::spawn(async move {
        token
            .run_until_cancelled(std::future::pending::<u32>())
            .await
    });
    time::sleep(Duration::from_millis(10)).await;
    canceller.cancel();

    let result = time::timeout(Duration::from_secs(1), worker).await.unwrap();
    assert_eq!(result.unwrap(), None);
}

#[core_async::test]
async fn test_run_until_cancelled_returns_output() {
    let token = CancellationToken::new();
    let output = token.run_until_cancelled(async { 500u32 }).await;
    assert_eq!(output, Some(500));
}

#[core_async::test]
async fn test_cancelled_sleep_returns_early() {
    let token = CancellationToken::new();
    token.cancel();

    let start = Instant::now();
    let slept = token
        .run_until_cancelled(time::sleep(Duration::from_secs(10)))
        .await;

    assert!(slept.is_none());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[core_async::test]
async fn test_timeout_bounds_remote_call() {
    let slow = time::timeout(Duration::from_millis(10), time::sleep(Duration::from_secs(5))).await;
    assert!(slow.is_err());

    let fast = time::timeout(Duration::from_secs(1), async { "page" }).await;
    assert_eq!(fast.unwrap(), "page");
}

#[core_async::test]
async fn test_interval_first_tick_is_immediate() {
    let mut ticker = time::interval(Duration::from_millis(20));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let start = Instant::now();
    ticker.tick().await;
    assert!(start.elapsed() < Duration::from_millis(20));

    ticker.tick().await;
    assert!(start.elapsed() >= Duration::from_millis(15));
}

#[core_async::test]
async fn test_notify_stores_permit_before_waiter() {
    let notify = Notify::new();
    notify.notify_one();

    time::timeout(Duration::from_secs(1), notify.notified())
        .await
        .unwrap();
}

#[core_async::test]
async fn test_broadcast_reports_lag() {
    let (tx, mut rx) = broadcast::channel(2);
    for i in 0..4u32 {
        tx.send(i).unwrap();
    }

    assert!(matches!(
        rx.recv().await,
        Err(broadcast::error::RecvError::Lagged(2))
    ));
    assert_eq!(rx.recv().await.unwrap(), 2);
}

#[core_async::test]
async fn test_aborted_task_stops_ticking() {
    let ticks = Arc::new(AtomicU32::new(0));
    let counter = ticks.clone();

    let handle = task::spawn(async move {
        let mut ticker = time::interval(Duration::from_millis(5));
        loop {
            ticker.tick().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    time::sleep(Duration::from_millis(30)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let seen = ticks.load(Ordering::SeqCst);
    time::sleep(Duration::from_millis(30)).await;
    assert_eq!(ticks.load(Ordering::SeqCst), seen);
}

#[core_async::test]
async fn test_mutex_serializes_tasks() {
    let total = Arc::new(Mutex::new(0u32));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let total = total.clone();
        handles.push(task::spawn(async move {
            *total.lock().await += 1;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*total.lock().await, 8);
}

#[test]
fn test_block_on_outside_runtime() {
    let value = runtime::block_on(async {
        time::sleep(Duration::from_millis(1)).await;
        11
    });
    assert_eq!(value, 11);
}

#[test]
fn test_unix_timestamp_is_recent() {
    // 2020-01-01
    assert!(time::unix_timestamp() > 1_577_836_800);
}
