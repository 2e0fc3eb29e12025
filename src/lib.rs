//! A collection of producer/consumer coordination primitives that build on
//! the primitives available in the standard library.
//!
//! This library contains the following special-purpose synchronization
//! primitives:
//!
//! * [`HandoffBuffer`], a bounded counter monitor that cycles between a
//!   unit-wise fill (or take) phase and a bulk drain (or refill) phase,
//!   waking the other side exactly once per threshold crossing.
//! * [`CountingSignal`], a counting permit primitive that lets threads block
//!   until permits are released by another thread.
//!
//! The [`sim`] module builds two long-running simulations out of these: a
//! group of bees filling a honey pot for a bear, and a brood of baby birds
//! emptying a worm dish restocked by their parent. The `bees` and `birds`
//! binaries are thin command-line entry points over that module.
//!
//! [`HandoffBuffer`]: struct.HandoffBuffer.html
//! [`CountingSignal`]: struct.CountingSignal.html
//! [`sim`]: sim/index.html

#![deny(missing_docs)]

mod buffer;
mod signal;
pub mod sim;
mod util;

pub use crate::buffer::{Drain, FillOutcome, HandoffBuffer, HandoffError, Refill, TakeOutcome};
pub use crate::signal::CountingSignal;
