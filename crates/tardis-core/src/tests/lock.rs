use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::lock::DatafileLocks;

#[test]
fn second_holder_is_refused_until_release() {
    let locks = DatafileLocks::new();
    let guard = locks.acquire(7);
    assert!(locks.is_held(7));
    assert!(locks.try_acquire(7).is_none());
    assert!(locks.try_acquire(8).is_some());
    assert!(locks.acquire_timeout(7, Duration::from_millis(20)).is_none());
    drop(guard);
    assert!(!locks.is_held(7));
    assert!(locks.try_acquire(7).is_some());
}

#[test]
fn failed_try_acquire_does_not_release_holder() {
    let locks = DatafileLocks::new();
    let _guard = locks.acquire(1);
    assert!(locks.try_acquire(1).is_none());
    assert!(locks.is_held(1));
}

#[test]
fn waiters_run_one_at_a_time() {
    let locks = Arc::new(DatafileLocks::new());
    let inside = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (locks, inside, max_seen) = (locks.clone(), inside.clone(), max_seen.clone());
            std::thread::spawn(move || {
                let _guard = locks.acquire(42);
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                inside.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert!(!locks.is_held(42));
}
