//! The lock shared by the encoder and the in-memory store.
//!
//! `parking_lot::Mutex` with the `parking-lot` feature, otherwise the std
//! mutex, whose poisoning surfaces as `LockPoisoned` errors.

#[cfg(feature = "parking-lot")]
pub(crate) use parking_lot::{Mutex, MutexGuard};
#[cfg(not(feature = "parking-lot"))]
pub(crate) use std::sync::{Mutex, MutexGuard, PoisonError};
