//! A counting permit primitive, allowing threads to block until another
//! thread hands out permits.
//!
//! The primary type in this module is the [`CountingSignal`] struct. See the
//! documentation on that type for further information.
//!
//! [`CountingSignal`]: struct.CountingSignal.html

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;

/// A synchronization primitive that lets threads block until permits are
/// released by another thread.
///
/// A `CountingSignal` is a counting semaphore: it holds a number of permits,
/// [`acquire`] takes one (blocking while there are none), and [`release`]
/// adds some and wakes the blocked threads to compete for them. There is no
/// upper bound on the permit count and no fairness guarantee on which waiter
/// gets a permit first; every waiter is woken on each release and the losers
/// simply block again.
///
/// Waiting threads park themselves after pushing their handle onto a
/// lock-free queue, and the handle is pushed *before* every check of the
/// permit count. A release that lands between the push and the check is
/// therefore observed by the check, and a release that lands after the check
/// finds the handle in the queue, so a wakeup cannot fall between the
/// cracks.
///
/// [`acquire`]: #method.acquire
/// [`release`]: #method.release
///
/// # Example
///
/// A signal that starts with no permits works as a start gate, keeping every
/// worker parked until all of them have been spawned:
///
/// ```
/// use handoff::CountingSignal;
/// use std::sync::Arc;
/// use std::thread;
///
/// let gate = Arc::new(CountingSignal::new(0));
///
/// let workers: Vec<_> = (0..4)
///     .map(|i| {
///         let gate = Arc::clone(&gate);
///         thread::spawn(move || {
///             gate.acquire();
///             println!("worker {} is through the gate", i);
///         })
///     })
///     .collect();
///
/// gate.release(4);
///
/// for worker in workers {
///     worker.join().unwrap();
/// }
/// ```
pub struct CountingSignal {
    permits: AtomicUsize,
    waiting: SegQueue<thread::Thread>,
}

impl CountingSignal {
    /// Creates a new `CountingSignal` holding the given number of permits.
    pub fn new(permits: usize) -> CountingSignal {
        CountingSignal {
            permits: AtomicUsize::new(permits),
            waiting: SegQueue::new(),
        }
    }

    /// Returns the current permit count.
    pub fn permits(&self) -> usize {
        self.permits.load(Ordering::SeqCst)
    }

    /// Takes one permit if any are available, without blocking. Returns
    /// whether a permit was taken.
    pub fn try_acquire(&self) -> bool {
        let mut current = self.permits();
        loop {
            if current == 0 {
                return false;
            }
            match self.permits.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(last) => current = last,
            }
        }
    }

    /// Takes one permit, blocking until one is available.
    pub fn acquire(&self) {
        loop {
            // push-then-check on every pass; see the type docs for why the
            // order matters. Stale handles left behind by a successful
            // acquire only cost a spurious unpark somewhere.
            self.waiting.push(thread::current());
            if self.try_acquire() {
                return;
            }
            thread::park();
        }
    }

    /// Takes one permit, blocking for roughly no longer than `timeout` for
    /// one to become available. Returns whether a permit was taken.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        use std::time::Instant;

        let begin = Instant::now();
        loop {
            self.waiting.push(thread::current());
            if self.try_acquire() {
                return true;
            }
            let elapsed = begin.elapsed();
            if elapsed >= timeout {
                return false;
            }
            thread::park_timeout(timeout - elapsed);
        }
    }

    /// Adds the given number of permits and wakes every waiting thread to
    /// compete for them.
    pub fn release(&self, count: usize) {
        self.permits.fetch_add(count, Ordering::SeqCst);
        // unconditionally drain the queue; threads that lose the race will
        // re-queue themselves and park again
        while let Some(thread) = self.waiting.pop() {
            thread.unpark();
        }
    }
}
