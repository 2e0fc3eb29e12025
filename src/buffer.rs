//! The bounded handoff buffer, a monitor coordinating unit-wise producers or
//! consumers on one side with a bulk drain or refill on the other.
//!
//! The primary type in this module is the [`HandoffBuffer`] struct. See the
//! documentation on that type for further information.
//!
//! [`HandoffBuffer`]: struct.HandoffBuffer.html

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;

use crate::util;

/// Monitor state. Every field is only read or written while holding the
/// buffer's mutex.
struct Shared {
    /// Units currently held, always within `0..=capacity`.
    level: usize,
    /// Permits for unit-wise producers. A producer may only increment `level`
    /// by consuming one of these, so `level` can never pass `capacity`, and
    /// producers stall while a drain is in progress.
    room: usize,
    /// Permits for unit-wise consumers, the mirror image of `room`.
    units: usize,
    /// Armed when `level` reaches `capacity`; disarmed by the drainer.
    drain_ready: bool,
    /// Armed when `level` reaches zero; disarmed by the refiller.
    refill_ready: bool,
    closed: bool,
    /// Lifetime totals of units added and removed. `total_in - total_out`
    /// equals `level` at all times.
    total_in: u64,
    total_out: u64,
}

/// A bounded buffer that hands batches of single-unit work between a group of
/// threads on one side and a single thread on the other.
///
/// A `HandoffBuffer` keeps a unit counter (its *level*) between zero and a
/// fixed capacity, and cycles it through fill and drain phases forever. It
/// supports two mirrored arrangements, chosen by the constructor:
///
/// * [`empty`]: many producers call [`add_one`] to raise the level one unit
///   at a time. The producer that reaches capacity wakes a single consumer
///   blocked in [`drain_all`], which removes every unit and then lets the
///   producers resume. (A group of bees filling a honey pot, and a bear that
///   eats the lot once it is full.)
/// * [`full`]: many consumers call [`take_one`] to lower the level one unit
///   at a time. The consumer that empties the buffer wakes a single producer
///   blocked in [`wait_empty`], which restocks with a quantity of its own
///   choosing. (Baby birds emptying a dish of worms, and a parent that flies
///   off for more when a baby finds the dish empty.)
///
/// The lock and the permit counters live inside the monitor; callers only see
/// the high-level operations, so a missed wakeup or a double signal cannot be
/// introduced from outside. Two invariants hold in every reachable state: the
/// level stays within `0..=capacity`, and the room permits released after a
/// drain exactly match the permits consumed while filling.
///
/// The buffer has no termination of its own. Calling [`close`] wakes every
/// blocked thread and makes all further operations return
/// [`HandoffError::Closed`], which is how the simulations (and tests) stop
/// their worker loops.
///
/// [`empty`]: #method.empty
/// [`full`]: #method.full
/// [`add_one`]: #method.add_one
/// [`drain_all`]: #method.drain_all
/// [`take_one`]: #method.take_one
/// [`wait_empty`]: #method.wait_empty
/// [`close`]: #method.close
///
/// # Example
///
/// ```
/// use handoff::HandoffBuffer;
/// use std::sync::Arc;
/// use std::thread;
///
/// let pot = Arc::new(HandoffBuffer::empty(3));
///
/// let bees: Vec<_> = (0..3)
///     .map(|_| {
///         let pot = Arc::clone(&pot);
///         thread::spawn(move || {
///             pot.add_one().unwrap();
///         })
///     })
///     .collect();
///
/// // blocks until the third add fills the pot
/// let mut drain = pot.drain_all().unwrap();
/// while let Some(left) = drain.take_one() {
///     println!("{} portions left", left);
/// }
///
/// for bee in bees {
///     bee.join().unwrap();
/// }
/// ```
pub struct HandoffBuffer {
    capacity: usize,
    shared: Mutex<Shared>,
    /// Wait queue for the producing side: unit-wise adds out of room permits,
    /// and the refiller waiting for the empty trigger.
    producer_cv: Condvar,
    /// Wait queue for the consuming side: unit-wise takes out of unit
    /// permits, and the drainer waiting for the full trigger.
    consumer_cv: Condvar,
}

/// The result of adding a single unit to a [`HandoffBuffer`].
///
/// [`HandoffBuffer`]: struct.HandoffBuffer.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum FillOutcome {
    /// The unit went in without filling the buffer; carries the level after
    /// the add.
    Added(usize),
    /// This add brought the buffer to capacity and woke the drainer.
    Filled,
}

/// The result of removing a single unit from a [`HandoffBuffer`].
///
/// [`HandoffBuffer`]: struct.HandoffBuffer.html
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum TakeOutcome {
    /// A unit came out with more still left; carries the level after the
    /// take.
    Taken(usize),
    /// This take emptied the buffer and woke the refiller.
    Emptied,
}

/// The collection of errors that can be returned by [`HandoffBuffer`]
/// methods.
///
/// [`HandoffBuffer`]: struct.HandoffBuffer.html
#[derive(Debug, PartialEq, Eq, Copy, Clone, Error)]
pub enum HandoffError {
    /// Returned when the buffer has been closed; no further units will move
    /// through it.
    #[error("the handoff buffer is closed")]
    Closed,
}

impl HandoffBuffer {
    /// Creates a buffer that starts empty, with a full set of room permits.
    /// This is the arrangement for unit-wise producers paired with a bulk
    /// drain.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn empty(capacity: usize) -> HandoffBuffer {
        assert!(capacity > 0, "a handoff buffer needs a positive capacity");
        HandoffBuffer {
            capacity,
            shared: Mutex::new(Shared {
                level: 0,
                room: capacity,
                units: 0,
                drain_ready: false,
                refill_ready: false,
                closed: false,
                total_in: 0,
                total_out: 0,
            }),
            producer_cv: Condvar::new(),
            consumer_cv: Condvar::new(),
        }
    }

    /// Creates a buffer that starts at capacity, with a full set of unit
    /// permits. This is the arrangement for unit-wise consumers paired with a
    /// bulk refill.
    ///
    /// The initial stock counts toward the total reported by [`totals`].
    ///
    /// [`totals`]: #method.totals
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn full(capacity: usize) -> HandoffBuffer {
        assert!(capacity > 0, "a handoff buffer needs a positive capacity");
        HandoffBuffer {
            capacity,
            shared: Mutex::new(Shared {
                level: capacity,
                room: 0,
                units: capacity,
                drain_ready: false,
                refill_ready: false,
                closed: false,
                total_in: capacity as u64,
                total_out: 0,
            }),
            producer_cv: Condvar::new(),
            consumer_cv: Condvar::new(),
        }
    }

    /// Returns the buffer's capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the current level.
    ///
    /// This is a snapshot; by the time the caller looks at it, other threads
    /// may already have moved it. It is still always within `0..=capacity`.
    pub fn level(&self) -> usize {
        util::relock(self.shared.lock()).level
    }

    /// Returns the lifetime totals of units added and removed, in that
    /// order. The difference between the two always equals [`level`].
    ///
    /// [`level`]: #method.level
    pub fn totals(&self) -> (u64, u64) {
        let shared = util::relock(self.shared.lock());
        (shared.total_in, shared.total_out)
    }

    /// Returns whether [`close`] has been called.
    ///
    /// [`close`]: #method.close
    pub fn is_closed(&self) -> bool {
        util::relock(self.shared.lock()).closed
    }

    /// Closes the buffer, waking every blocked thread.
    ///
    /// All subsequent operations (and all operations currently blocked)
    /// return [`HandoffError::Closed`]. Closing an already-closed buffer is
    /// a no-op.
    pub fn close(&self) {
        let mut shared = util::relock(self.shared.lock());
        shared.closed = true;
        drop(shared);
        self.producer_cv.notify_all();
        self.consumer_cv.notify_all();
    }

    /// Adds one unit, blocking until there is room.
    ///
    /// The add that brings the buffer to capacity arms the drain trigger and
    /// wakes the consumer side exactly once for the cycle; every other add
    /// returns the new level. Room permits are not replenished until the
    /// drain completes, so producers stall while the drainer works even when
    /// the level has already dropped below capacity.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed, including
    /// when it is closed while this call is blocked.
    pub fn add_one(&self) -> Result<FillOutcome, HandoffError> {
        let mut shared = util::relock(self.shared.lock());
        while shared.room == 0 && !shared.closed {
            shared = util::relock(self.producer_cv.wait(shared));
        }
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        Ok(self.finish_add(shared))
    }

    /// Adds one unit if a room permit is immediately available.
    ///
    /// Returns `Ok(None)` instead of blocking when the buffer is full or a
    /// drain is in progress.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn try_add_one(&self) -> Result<Option<FillOutcome>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if shared.room == 0 {
            return Ok(None);
        }
        Ok(Some(self.finish_add(shared)))
    }

    /// Adds one unit, blocking for roughly no longer than `timeout` for
    /// room. Returns `Ok(None)` if the timeout elapsed first.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn add_one_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<FillOutcome>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        let (shared, _) = util::relock(self.producer_cv.wait_timeout_while(
            shared,
            timeout,
            |shared| shared.room == 0 && !shared.closed,
        ));
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if shared.room == 0 {
            return Ok(None);
        }
        Ok(Some(self.finish_add(shared)))
    }

    /// Blocks until a fill cycle completes, then begins the drain.
    ///
    /// The returned [`Drain`] removes units one at a time under the caller's
    /// pacing; once the last unit is out it releases one room permit for
    /// every permit the fill consumed. Dropping the guard with units still in
    /// the buffer finishes the drain first. The trigger is disarmed on
    /// return, so a second call blocks until producers fill the buffer
    /// again.
    ///
    /// [`Drain`]: struct.Drain.html
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed, including
    /// when it is closed while this call is blocked.
    pub fn drain_all(&self) -> Result<Drain<'_>, HandoffError> {
        let mut shared = util::relock(self.shared.lock());
        while !shared.drain_ready && !shared.closed {
            shared = util::relock(self.consumer_cv.wait(shared));
        }
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        shared.drain_ready = false;
        Ok(Drain {
            buffer: self,
            done: false,
        })
    }

    /// Like [`drain_all`], but gives up after roughly `timeout` and returns
    /// `Ok(None)` if no fill cycle completed in that window.
    ///
    /// [`drain_all`]: #method.drain_all
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn drain_all_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Drain<'_>>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        let (mut shared, _) = util::relock(self.consumer_cv.wait_timeout_while(
            shared,
            timeout,
            |shared| !shared.drain_ready && !shared.closed,
        ));
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if !shared.drain_ready {
            return Ok(None);
        }
        shared.drain_ready = false;
        Ok(Some(Drain {
            buffer: self,
            done: false,
        }))
    }

    /// Removes one unit, blocking until one is available.
    ///
    /// The take that empties the buffer arms the refill trigger and wakes the
    /// producer side exactly once for the cycle; every other take returns the
    /// new level.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed, including
    /// when it is closed while this call is blocked.
    pub fn take_one(&self) -> Result<TakeOutcome, HandoffError> {
        let mut shared = util::relock(self.shared.lock());
        while shared.units == 0 && !shared.closed {
            shared = util::relock(self.consumer_cv.wait(shared));
        }
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        Ok(self.finish_take(shared))
    }

    /// Removes one unit if a unit permit is immediately available.
    ///
    /// Returns `Ok(None)` instead of blocking when the buffer is empty.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn try_take_one(&self) -> Result<Option<TakeOutcome>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if shared.units == 0 {
            return Ok(None);
        }
        Ok(Some(self.finish_take(shared)))
    }

    /// Removes one unit, blocking for roughly no longer than `timeout` for
    /// one to become available. Returns `Ok(None)` if the timeout elapsed
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn take_one_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<TakeOutcome>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        let (shared, _) = util::relock(self.consumer_cv.wait_timeout_while(
            shared,
            timeout,
            |shared| shared.units == 0 && !shared.closed,
        ));
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if shared.units == 0 {
            return Ok(None);
        }
        Ok(Some(self.finish_take(shared)))
    }

    /// Blocks until a consumer empties the buffer, then begins the refill.
    ///
    /// The trigger is disarmed on return, so the restock quantity can be
    /// decided after waking (foraging takes time). Call [`Refill::put`] with
    /// the chosen amount; dropping the guard without putting anything re-arms
    /// the trigger so the next refiller is not lost.
    ///
    /// [`Refill::put`]: struct.Refill.html#method.put
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed, including
    /// when it is closed while this call is blocked.
    ///
    /// # Example
    ///
    /// ```
    /// use handoff::{HandoffBuffer, TakeOutcome};
    ///
    /// let dish = HandoffBuffer::full(2);
    ///
    /// assert_eq!(dish.take_one().unwrap(), TakeOutcome::Taken(1));
    /// assert_eq!(dish.take_one().unwrap(), TakeOutcome::Emptied);
    ///
    /// // the empty trigger is armed, so this does not block
    /// let refill = dish.wait_empty().unwrap();
    /// assert_eq!(refill.put(2), 2);
    /// assert_eq!(dish.level(), 2);
    /// ```
    pub fn wait_empty(&self) -> Result<Refill<'_>, HandoffError> {
        let mut shared = util::relock(self.shared.lock());
        while !shared.refill_ready && !shared.closed {
            shared = util::relock(self.producer_cv.wait(shared));
        }
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        shared.refill_ready = false;
        Ok(Refill {
            buffer: self,
            spent: false,
        })
    }

    /// Like [`wait_empty`], but gives up after roughly `timeout` and returns
    /// `Ok(None)` if the buffer did not empty in that window.
    ///
    /// [`wait_empty`]: #method.wait_empty
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn wait_empty_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<Refill<'_>>, HandoffError> {
        let shared = util::relock(self.shared.lock());
        let (mut shared, _) = util::relock(self.producer_cv.wait_timeout_while(
            shared,
            timeout,
            |shared| !shared.refill_ready && !shared.closed,
        ));
        if shared.closed {
            return Err(HandoffError::Closed);
        }
        if !shared.refill_ready {
            return Ok(None);
        }
        shared.refill_ready = false;
        Ok(Some(Refill {
            buffer: self,
            spent: false,
        }))
    }

    /// Waits for the buffer to empty, then restocks it with `count` units.
    /// Shorthand for [`wait_empty`] followed by [`Refill::put`]; see those
    /// for the blocking and clamping behavior. Returns the quantity actually
    /// added.
    ///
    /// [`wait_empty`]: #method.wait_empty
    /// [`Refill::put`]: struct.Refill.html#method.put
    ///
    /// # Errors
    ///
    /// Returns [`HandoffError::Closed`] if the buffer is closed.
    pub fn refill(&self, count: usize) -> Result<usize, HandoffError> {
        Ok(self.wait_empty()?.put(count))
    }

    /// Consumes a room permit and raises the level. Caller has already
    /// checked that a permit exists and the buffer is open.
    fn finish_add(&self, mut shared: MutexGuard<'_, Shared>) -> FillOutcome {
        shared.room -= 1;
        shared.level += 1;
        shared.total_in += 1;
        debug_assert!(shared.level <= self.capacity);
        if shared.level == self.capacity {
            shared.drain_ready = true;
            drop(shared);
            self.consumer_cv.notify_all();
            FillOutcome::Filled
        } else {
            FillOutcome::Added(shared.level)
        }
    }

    /// Consumes a unit permit and lowers the level. Caller has already
    /// checked that a permit exists and the buffer is open.
    fn finish_take(&self, mut shared: MutexGuard<'_, Shared>) -> TakeOutcome {
        shared.units -= 1;
        shared.level -= 1;
        shared.total_out += 1;
        if shared.level == 0 {
            shared.refill_ready = true;
            drop(shared);
            self.producer_cv.notify_all();
            TakeOutcome::Emptied
        } else {
            TakeOutcome::Taken(shared.level)
        }
    }
}

/// A drain in progress on a [`HandoffBuffer`].
///
/// Obtained from [`HandoffBuffer::drain_all`]. Each call to [`take_one`]
/// removes a single unit, with the lock released in between so the caller
/// can pace itself however it likes. Producers stay blocked for the whole
/// drain regardless, because their room permits only come back when the
/// buffer reaches zero.
///
/// If the guard is dropped before the buffer is empty, the remaining units
/// are discarded in one go so the cycle still ends at zero and the producers
/// still get their permits back.
///
/// [`HandoffBuffer`]: struct.HandoffBuffer.html
/// [`HandoffBuffer::drain_all`]: struct.HandoffBuffer.html#method.drain_all
/// [`take_one`]: #method.take_one
pub struct Drain<'a> {
    buffer: &'a HandoffBuffer,
    done: bool,
}

impl<'a> Drain<'a> {
    /// Removes one unit, returning the level afterward, or `None` once the
    /// buffer is empty.
    ///
    /// The take that reaches zero releases the full set of room permits and
    /// wakes the producers; after that this returns `None` forever.
    pub fn take_one(&mut self) -> Option<usize> {
        if self.done {
            return None;
        }
        let mut shared = util::relock(self.buffer.shared.lock());
        if shared.level == 0 {
            self.done = true;
            return None;
        }
        shared.level -= 1;
        shared.total_out += 1;
        let left = shared.level;
        if left == 0 {
            self.done = true;
            // one permit per unit the fill phase consumed
            shared.room += self.buffer.capacity;
            drop(shared);
            self.buffer.producer_cv.notify_all();
        }
        Some(left)
    }

    /// Returns how many units are left to take.
    pub fn remaining(&self) -> usize {
        if self.done {
            0
        } else {
            self.buffer.level()
        }
    }
}

impl<'a> Drop for Drain<'a> {
    fn drop(&mut self) {
        while self.take_one().is_some() {}
    }
}

/// A refill in progress on a [`HandoffBuffer`].
///
/// Obtained from [`HandoffBuffer::wait_empty`] once a consumer has emptied
/// the buffer. Call [`put`] with the restock quantity; until then the
/// consumers stay blocked, since their unit permits only appear with the new
/// stock.
///
/// [`HandoffBuffer`]: struct.HandoffBuffer.html
/// [`HandoffBuffer::wait_empty`]: struct.HandoffBuffer.html#method.wait_empty
/// [`put`]: #method.put
pub struct Refill<'a> {
    buffer: &'a HandoffBuffer,
    spent: bool,
}

impl<'a> Refill<'a> {
    /// Restocks the buffer with `count` units and releases that many unit
    /// permits, waking the consumers. Returns the quantity actually added.
    ///
    /// Quantities beyond what fits are clamped. A `count` of zero adds
    /// nothing and re-arms the empty trigger instead, so a refiller that
    /// came back empty-handed can simply try again.
    pub fn put(mut self, count: usize) -> usize {
        self.spent = true;
        let mut shared = util::relock(self.buffer.shared.lock());
        let quantity = count.min(self.buffer.capacity - shared.level);
        if quantity == 0 {
            shared.refill_ready = true;
            drop(shared);
            self.buffer.producer_cv.notify_all();
            return 0;
        }
        shared.level += quantity;
        shared.units += quantity;
        shared.total_in += quantity as u64;
        debug_assert!(shared.level <= self.buffer.capacity);
        drop(shared);
        self.buffer.consumer_cv.notify_all();
        quantity
    }
}

/// Dropping the guard without calling [`put`] re-arms the empty trigger, so
/// the wakeup that produced this guard is handed to the next refiller
/// instead of being lost.
///
/// [`put`]: #method.put
impl<'a> Drop for Refill<'a> {
    fn drop(&mut self) {
        if !self.spent {
            let mut shared = util::relock(self.buffer.shared.lock());
            shared.refill_ready = true;
            drop(shared);
            self.buffer.producer_cv.notify_all();
        }
    }
}
