use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use mhttp::ratelimit::{LeakyBucket, spawn_leak_driver};
use tokio::sync::watch;

#[test]
fn test_fill_up_to_capacity() {
    let bucket = LeakyBucket::new(3, 1);

    assert!(bucket.fill(1));
    assert!(bucket.fill(2));
    assert!(!bucket.fill(1));
    assert_eq!(bucket.current(), 3);
}

#[test]
fn test_rejected_fill_leaves_level_untouched() {
    let bucket = LeakyBucket::new(5, 1);

    assert!(bucket.fill(4));
    assert!(!bucket.fill(2));
    assert_eq!(bucket.current(), 4);
    assert!(bucket.fill(1));
}

#[test]
fn test_fill_overflow_is_rejected() {
    let bucket = LeakyBucket::new(u32::MAX, 1);

    assert!(bucket.fill(u32::MAX));
    assert!(!bucket.fill(1));
}

#[test]
fn test_leak_drains_to_zero_after_enough_time() {
    let bucket = LeakyBucket::new(10, 2);
    assert!(bucket.fill(10));

    let now = Instant::now();
    bucket.leak_at(now + Duration::from_secs(5));

    assert_eq!(bucket.current(), 0);
}

#[test]
fn test_leak_is_proportional_to_elapsed_time() {
    let bucket = LeakyBucket::new(100, 10);
    assert!(bucket.fill(100));

    let now = Instant::now();
    bucket.leak_at(now + Duration::from_secs(2));

    // At least two seconds worth, never more than what was filled
    let current = bucket.current();
    assert!(current <= 80, "current = {current}");
    assert!(current >= 70, "current = {current}");
}

#[test]
fn test_leak_never_increases_level() {
    let bucket = LeakyBucket::new(10, 3);
    assert!(bucket.fill(10));

    let start = Instant::now();
    let mut previous = bucket.current();
    for step in 1..=40 {
        bucket.leak_at(start + Duration::from_millis(step * 150));
        let current = bucket.current();
        assert!(current <= previous);
        previous = current;
    }
    assert_eq!(previous, 0);
}

#[test]
fn test_leak_on_empty_bucket_does_not_bank_credit() {
    let bucket = LeakyBucket::new(5, 1);
    let start = Instant::now();

    // Idle for a long time with nothing to drain
    bucket.leak_at(start + Duration::from_secs(60));
    assert!(bucket.fill(5));

    // Only a fraction of a unit has accrued since the idle leak
    bucket.leak_at(start + Duration::from_millis(60_500));
    assert_eq!(bucket.current(), 5);
}

#[test]
fn test_zero_rate_never_drains() {
    let bucket = LeakyBucket::new(2, 0);
    assert!(bucket.fill(2));

    bucket.leak_at(Instant::now() + Duration::from_secs(3600));
    assert_eq!(bucket.current(), 2);
}

#[test]
fn test_concurrent_fills_never_exceed_capacity() {
    let bucket = Arc::new(LeakyBucket::new(50, 1));
    let admitted = AtomicU32::new(0);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..100 {
                    if bucket.fill(1) {
                        admitted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::Relaxed), 50);
    assert_eq!(bucket.current(), 50);
}

#[tokio::test]
async fn test_leak_driver_drains_and_stops_on_shutdown() {
    let bucket = Arc::new(LeakyBucket::new(4, 1000));
    assert!(bucket.fill(4));

    let (tx, rx) = watch::channel(false);
    let driver = spawn_leak_driver(vec![Arc::clone(&bucket)], Duration::from_millis(10), rx);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(bucket.current(), 0);

    tx.send_replace(true);
    tokio::time::timeout(Duration::from_secs(1), driver)
        .await
        .expect("driver should stop")
        .unwrap();
}
