//! Tests for the counting permit primitive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use handoff::CountingSignal;

#[test]
fn try_acquire_consumes_one_permit_at_a_time() {
    let gate = CountingSignal::new(2);
    assert_eq!(gate.permits(), 2);
    assert!(gate.try_acquire());
    assert!(gate.try_acquire());
    assert!(!gate.try_acquire());
    assert_eq!(gate.permits(), 0);
}

#[test]
fn release_wakes_blocked_acquirers() {
    let gate = Arc::new(CountingSignal::new(0));
    let through = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let gate = Arc::clone(&gate);
            let through = Arc::clone(&through);
            thread::spawn(move || {
                gate.acquire();
                through.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    // release in two batches so some workers are already parked for the
    // second one
    gate.release(2);
    thread::sleep(Duration::from_millis(50));
    gate.release(2);

    for worker in workers {
        worker.join().unwrap();
    }
    assert_eq!(through.load(Ordering::SeqCst), 4);
    assert_eq!(gate.permits(), 0);
}

#[test]
fn acquire_timeout_expires_without_a_permit() {
    let gate = CountingSignal::new(0);
    assert!(!gate.acquire_timeout(Duration::from_millis(50)));

    gate.release(1);
    assert!(gate.acquire_timeout(Duration::from_millis(50)));
    assert_eq!(gate.permits(), 0);
}
