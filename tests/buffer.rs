//! Deterministic and threaded tests for the bounded handoff buffer.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use handoff::{FillOutcome, HandoffBuffer, HandoffError, TakeOutcome};

const SHORT: Duration = Duration::from_millis(50);

#[test]
fn fill_cycle_walks_level_up_and_back() {
    let pot = HandoffBuffer::empty(7);

    for expected in 1..=6 {
        assert_eq!(
            pot.try_add_one().unwrap(),
            Some(FillOutcome::Added(expected))
        );
        assert_eq!(pot.level(), expected);
    }
    assert_eq!(pot.try_add_one().unwrap(), Some(FillOutcome::Filled));
    assert_eq!(pot.level(), 7);

    // room permits are exhausted until the drain completes
    assert_eq!(pot.try_add_one().unwrap(), None);

    let mut drain = pot.drain_all().unwrap();
    for expected in (0..7).rev() {
        assert_eq!(drain.take_one(), Some(expected));
    }
    assert_eq!(drain.take_one(), None);
    drop(drain);
    assert_eq!(pot.level(), 0);

    // exactly seven permits came back, so the next cycle plays out the same
    for expected in 1..=6 {
        assert_eq!(
            pot.try_add_one().unwrap(),
            Some(FillOutcome::Added(expected))
        );
    }
    assert_eq!(pot.try_add_one().unwrap(), Some(FillOutcome::Filled));
    assert_eq!(pot.try_add_one().unwrap(), None);
}

#[test]
fn one_drain_wake_per_fill_cycle() {
    let pot = HandoffBuffer::empty(2);
    pot.try_add_one().unwrap();
    assert_eq!(pot.try_add_one().unwrap(), Some(FillOutcome::Filled));

    let drain = pot.drain_all_timeout(SHORT).unwrap();
    assert!(drain.is_some());
    drop(drain); // dropping finishes the drain

    // no second wake until producers fill the buffer again
    assert!(pot.drain_all_timeout(SHORT).unwrap().is_none());
}

#[test]
fn variable_refill_releases_exactly_that_many_takes() {
    let dish = HandoffBuffer::full(7);

    for expected in (1..7).rev() {
        assert_eq!(
            dish.try_take_one().unwrap(),
            Some(TakeOutcome::Taken(expected))
        );
    }
    assert_eq!(dish.try_take_one().unwrap(), Some(TakeOutcome::Emptied));
    assert_eq!(dish.try_take_one().unwrap(), None);

    assert_eq!(dish.refill(4).unwrap(), 4);
    assert_eq!(dish.level(), 4);

    for expected in (1..4).rev() {
        assert_eq!(
            dish.try_take_one().unwrap(),
            Some(TakeOutcome::Taken(expected))
        );
    }
    assert_eq!(dish.try_take_one().unwrap(), Some(TakeOutcome::Emptied));

    // the fifth take has no permit behind it
    assert_eq!(dish.try_take_one().unwrap(), None);
}

#[test]
fn refill_is_clamped_to_capacity() {
    let dish = HandoffBuffer::full(3);
    while dish.try_take_one().unwrap().is_some() {}
    assert_eq!(dish.refill(10).unwrap(), 3);
    assert_eq!(dish.level(), 3);
}

#[test]
fn empty_handed_refill_rearms_the_trigger() {
    let dish = HandoffBuffer::full(1);
    assert_eq!(dish.try_take_one().unwrap(), Some(TakeOutcome::Emptied));

    assert_eq!(dish.refill(0).unwrap(), 0);

    // the chirp is still pending, so the retry does not block
    assert_eq!(dish.refill(1).unwrap(), 1);
    assert_eq!(dish.level(), 1);
}

#[test]
fn dropped_refill_guard_keeps_the_trigger_armed() {
    let dish = HandoffBuffer::full(1);
    dish.try_take_one().unwrap();

    drop(dish.wait_empty().unwrap());

    assert_eq!(dish.refill(1).unwrap(), 1);
}

#[test]
fn timed_operations_report_timeouts() {
    let pot = HandoffBuffer::empty(1);
    assert_eq!(pot.add_one_timeout(SHORT).unwrap(), Some(FillOutcome::Filled));
    assert_eq!(pot.add_one_timeout(SHORT).unwrap(), None);
    assert!(pot.drain_all_timeout(SHORT).unwrap().is_some());

    let dish = HandoffBuffer::full(1);
    assert!(dish.wait_empty_timeout(SHORT).unwrap().is_none());
    assert_eq!(
        dish.take_one_timeout(SHORT).unwrap(),
        Some(TakeOutcome::Emptied)
    );
    assert_eq!(dish.take_one_timeout(SHORT).unwrap(), None);
    let refill = dish.wait_empty_timeout(SHORT).unwrap();
    assert!(refill.is_some());
}

#[test]
fn capacity_one_alternates_without_deadlock() {
    let pot = Arc::new(HandoffBuffer::empty(1));

    let producer = {
        let pot = Arc::clone(&pot);
        thread::spawn(move || while pot.add_one().is_ok() {})
    };

    for _ in 0..100 {
        let mut drain = pot.drain_all().unwrap();
        while let Some(left) = drain.take_one() {
            assert_eq!(left, 0);
        }
    }

    pot.close();
    producer.join().unwrap();

    let (added, removed) = pot.totals();
    assert_eq!(added - removed, pot.level() as u64);
}

#[test]
fn level_stays_within_bounds_under_contention() {
    let pot = Arc::new(HandoffBuffer::empty(7));

    let producers: Vec<_> = (0..10)
        .map(|_| {
            let pot = Arc::clone(&pot);
            thread::spawn(move || while pot.add_one().is_ok() {})
        })
        .collect();

    let drainer = {
        let pot = Arc::clone(&pot);
        thread::spawn(move || {
            while let Ok(mut drain) = pot.drain_all() {
                while let Some(left) = drain.take_one() {
                    assert!(left < 7);
                }
            }
        })
    };

    for _ in 0..10_000 {
        assert!(pot.level() <= 7);
    }

    pot.close();
    for producer in producers {
        producer.join().unwrap();
    }
    drainer.join().unwrap();

    let (added, removed) = pot.totals();
    assert_eq!(added - removed, pot.level() as u64);
}

#[test]
fn every_producer_eventually_proceeds() {
    let pot = Arc::new(HandoffBuffer::empty(5));

    // 8 producers x 25 adds = 40 full cycles exactly, so both sides finish
    // on their own; a lost wakeup would hang the test instead
    let producers: Vec<_> = (0..8)
        .map(|_| {
            let pot = Arc::clone(&pot);
            thread::spawn(move || {
                for _ in 0..25 {
                    pot.add_one().unwrap();
                }
            })
        })
        .collect();

    let drainer = {
        let pot = Arc::clone(&pot);
        thread::spawn(move || {
            let mut drained = 0u64;
            while drained < 200 {
                let mut drain = pot.drain_all().unwrap();
                while drain.take_one().is_some() {
                    drained += 1;
                }
            }
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    drainer.join().unwrap();

    assert_eq!(pot.totals(), (200, 200));
    assert_eq!(pot.level(), 0);
}

#[test]
fn close_unblocks_blocked_operations() {
    let pot = Arc::new(HandoffBuffer::empty(1));
    pot.try_add_one().unwrap();

    let blocked_add = {
        let pot = Arc::clone(&pot);
        thread::spawn(move || pot.add_one())
    };
    let blocked_wait = {
        let pot = Arc::clone(&pot);
        thread::spawn(move || pot.wait_empty().map(|_| ()))
    };

    thread::sleep(SHORT);
    pot.close();

    assert_eq!(blocked_add.join().unwrap(), Err(HandoffError::Closed));
    assert_eq!(blocked_wait.join().unwrap(), Err(HandoffError::Closed));
    assert!(pot.is_closed());
    assert_eq!(pot.try_add_one(), Err(HandoffError::Closed));
    assert_eq!(pot.try_take_one(), Err(HandoffError::Closed));
}

#[test]
#[should_panic(expected = "positive capacity")]
fn zero_capacity_is_rejected() {
    let _ = HandoffBuffer::empty(0);
}
