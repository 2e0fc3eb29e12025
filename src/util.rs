//! Some utility functions that don't need to be part of the public release.

use std::sync::LockResult;

//Unwrap a LockResult to get the guard even when poisoned.
//
//The monitor's critical sections keep their counters consistent at every
//point a panic could occur, so a poisoned guard is still safe to keep using,
//and propagating the poison would only wedge the other workers.
pub fn relock<T>(res: LockResult<T>) -> T {
    match res {
        Ok(guard) => guard,
        Err(poison) => poison.into_inner(),
    }
}
