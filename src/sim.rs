//! Long-running producer/consumer simulations built on the
//! [`HandoffBuffer`], with explicit shutdown.
//!
//! Two classic arrangements are provided, one per constructor on
//! [`Simulation`]:
//!
//! * [`Simulation::bees`]: a group of bees each dropping single portions of
//!   honey into a shared pot, and a bear that sleeps until the pot is full,
//!   eats everything, and goes back to sleep.
//! * [`Simulation::birds`]: a brood of baby birds eating worms out of a
//!   shared dish one at a time, and a parent that flies off for a fresh
//!   batch whenever a baby finds the dish empty.
//!
//! The workers run until [`Simulation::shutdown`] closes the buffer; the
//! binaries instead call [`Simulation::run`] and let the process be killed
//! externally. Progress is reported through `tracing` events, one per unit
//! moved and one per full or empty transition.
//!
//! [`HandoffBuffer`]: ../struct.HandoffBuffer.html
//! [`Simulation`]: struct.Simulation.html
//! [`Simulation::bees`]: struct.Simulation.html#method.bees
//! [`Simulation::birds`]: struct.Simulation.html#method.birds
//! [`Simulation::run`]: struct.Simulation.html#method.run
//! [`Simulation::shutdown`]: struct.Simulation.html#method.shutdown

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::buffer::{FillOutcome, HandoffBuffer, HandoffError, TakeOutcome};
use crate::signal::CountingSignal;

/// A running simulation: the shared buffer plus the worker threads attached
/// to it.
///
/// Workers are held behind a start gate until every thread has spawned, so
/// no unit moves before the full population exists. The handle owns the
/// workers; letting it drop without calling [`run`] or [`shutdown`] detaches
/// them.
///
/// [`run`]: #method.run
/// [`shutdown`]: #method.shutdown
pub struct Simulation {
    buffer: Arc<HandoffBuffer>,
    workers: Vec<JoinHandle<()>>,
}

impl Simulation {
    /// Starts the honey-pot simulation: `bees` producer threads and one
    /// bear, sharing an initially empty buffer of `capacity` portions.
    ///
    /// `pace` is slept between actions to keep the output readable; tests
    /// pass `Duration::ZERO`.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if any worker thread cannot be
    /// spawned. Workers spawned before the failure are shut down again
    /// before this returns.
    pub fn bees(bees: usize, capacity: usize, pace: Duration) -> io::Result<Simulation> {
        let buffer = Arc::new(HandoffBuffer::empty(capacity));
        let gate = Arc::new(CountingSignal::new(0));
        let mut workers = Vec::with_capacity(bees + 1);

        match spawn_bees(&buffer, &gate, bees, pace, &mut workers) {
            Ok(()) => {
                gate.release(workers.len());
                Ok(Simulation { buffer, workers })
            }
            Err(err) => {
                abort_startup(&buffer, &gate, workers);
                Err(err)
            }
        }
    }

    /// Starts the worm-dish simulation: `birds` consumer threads and one
    /// parent, sharing an initially full buffer of `capacity` worms.
    ///
    /// `forage` picks the restock quantity each time the dish empties; the
    /// binaries pass a random amount, tests a fixed one. Amounts beyond
    /// `capacity` are clamped by the buffer.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if any worker thread cannot be
    /// spawned. Workers spawned before the failure are shut down again
    /// before this returns.
    pub fn birds<F>(
        birds: usize,
        capacity: usize,
        pace: Duration,
        forage: F,
    ) -> io::Result<Simulation>
    where
        F: FnMut() -> usize + Send + 'static,
    {
        let buffer = Arc::new(HandoffBuffer::full(capacity));
        let gate = Arc::new(CountingSignal::new(0));
        let mut workers = Vec::with_capacity(birds + 1);

        match spawn_birds(&buffer, &gate, birds, pace, forage, &mut workers) {
            Ok(()) => {
                gate.release(workers.len());
                Ok(Simulation { buffer, workers })
            }
            Err(err) => {
                abort_startup(&buffer, &gate, workers);
                Err(err)
            }
        }
    }

    /// Returns the shared buffer, for inspecting the level and totals while
    /// the simulation runs.
    pub fn buffer(&self) -> &HandoffBuffer {
        &self.buffer
    }

    /// Joins the workers without closing the buffer. Since the workers only
    /// stop when the buffer closes, this blocks until the process is
    /// terminated externally.
    pub fn run(self) {
        join_all(self.workers);
    }

    /// Closes the buffer and joins every worker, then hands back the buffer
    /// so callers can inspect the final level and totals.
    pub fn shutdown(self) -> Arc<HandoffBuffer> {
        self.buffer.close();
        join_all(self.workers);
        self.buffer
    }
}

fn spawn_bees(
    buffer: &Arc<HandoffBuffer>,
    gate: &Arc<CountingSignal>,
    bees: usize,
    pace: Duration,
    workers: &mut Vec<JoinHandle<()>>,
) -> io::Result<()> {
    let pot = Arc::clone(buffer);
    workers.push(launch("bear".to_owned(), gate, move || {
        drain_loop(&pot, pace);
    })?);
    for id in 0..bees {
        let pot = Arc::clone(buffer);
        workers.push(launch(format!("bee-{}", id), gate, move || {
            fill_loop(id, &pot, pace);
        })?);
    }
    Ok(())
}

fn spawn_birds<F>(
    buffer: &Arc<HandoffBuffer>,
    gate: &Arc<CountingSignal>,
    birds: usize,
    pace: Duration,
    forage: F,
    workers: &mut Vec<JoinHandle<()>>,
) -> io::Result<()>
where
    F: FnMut() -> usize + Send + 'static,
{
    let dish = Arc::clone(buffer);
    workers.push(launch("parent".to_owned(), gate, move || {
        refill_loop(&dish, forage);
    })?);
    for id in 0..birds {
        let dish = Arc::clone(buffer);
        workers.push(launch(format!("bird-{}", id), gate, move || {
            take_loop(id, &dish, pace);
        })?);
    }
    Ok(())
}

/// Spawns a named worker that waits at the start gate before running.
fn launch<F>(name: String, gate: &Arc<CountingSignal>, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let gate = Arc::clone(gate);
    thread::Builder::new().name(name).spawn(move || {
        gate.acquire();
        body();
    })
}

/// Unwinds a partially spawned simulation: closes the buffer so the loops
/// exit, opens the gate so nobody stays parked in front of it, and joins
/// whatever was already running.
fn abort_startup(buffer: &HandoffBuffer, gate: &CountingSignal, workers: Vec<JoinHandle<()>>) {
    buffer.close();
    gate.release(workers.len());
    join_all(workers);
}

fn join_all(workers: Vec<JoinHandle<()>>) {
    for worker in workers {
        if worker.join().is_err() {
            error!("a worker panicked");
        }
    }
}

/// One bee: gather a portion, wait for room, drop it in the pot. The bee
/// that fills the pot has already woken the bear by the time `add_one`
/// returns.
fn fill_loop(id: usize, pot: &HandoffBuffer, pace: Duration) {
    loop {
        thread::sleep(pace);
        match pot.add_one() {
            Ok(FillOutcome::Filled) => {
                info!(bee = id, "filled the pot, the bear is waking up");
            }
            Ok(FillOutcome::Added(level)) => {
                info!(bee = id, level, "put a portion of honey in the pot");
                thread::sleep(pace);
            }
            Err(HandoffError::Closed) => break,
        }
    }
    debug!(bee = id, "stopping");
}

/// The bear: sleep until the pot fills, eat it all one portion at a time,
/// hand the bees their room back, sleep again.
fn drain_loop(pot: &HandoffBuffer, pace: Duration) {
    loop {
        let mut drain = match pot.drain_all() {
            Ok(drain) => drain,
            Err(HandoffError::Closed) => break,
        };
        info!("the bear wakes up");
        while let Some(left) = drain.take_one() {
            info!(left, "the bear eats a portion");
            thread::sleep(pace);
        }
        info!("the pot is empty, the bear goes back to sleep");
    }
    debug!("bear stopping");
}

/// One baby bird: wait for a worm, eat it, nap. The baby that empties the
/// dish has already chirped for the parent by the time `take_one` returns.
fn take_loop(id: usize, dish: &HandoffBuffer, pace: Duration) {
    loop {
        thread::sleep(pace);
        match dish.take_one() {
            Ok(TakeOutcome::Emptied) => {
                info!(bird = id, "ate the last worm, chirping for the parent");
            }
            Ok(TakeOutcome::Taken(left)) => {
                info!(bird = id, left, "ate a worm");
                thread::sleep(pace);
            }
            Err(HandoffError::Closed) => break,
        }
    }
    debug!(bird = id, "stopping");
}

/// The parent bird: wait for the chirp, forage, restock the dish.
fn refill_loop<F>(dish: &HandoffBuffer, mut forage: F)
where
    F: FnMut() -> usize,
{
    loop {
        let refill = match dish.wait_empty() {
            Ok(refill) => refill,
            Err(HandoffError::Closed) => break,
        };
        info!("the parent hears chirping and flies off to find worms");
        let found = forage();
        let put = refill.put(found);
        info!(worms = put, "the parent restocks the dish");
    }
    debug!("parent stopping");
}
