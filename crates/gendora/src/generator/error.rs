use crate::id::SnowflakeId;

/// Reasons a single [`generate`](crate::IdEncoder::generate) call can fail.
///
/// None of these are retried internally. Each one fails the current call and
/// the caller must fail its request; it must never substitute a cached id or
/// a placeholder slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum GenerateError {
    /// No slot lease is currently held (never allocated, lost, or released).
    #[error("no slot is allocated to this instance")]
    SlotUnavailable,

    /// The slot source reported a value outside the 10-bit slot field.
    #[error("slot {slot} exceeds the maximum slot {max}", max = SnowflakeId::MAX_SLOT)]
    InvalidSlot { slot: u16 },

    /// The clock reads earlier than the last issued timestamp.
    #[error("clock moved backwards; refusing to generate id for {millis} milliseconds")]
    ClockMovedBackwards { millis: u64 },

    /// The clock reads earlier than the custom epoch.
    #[error("clock reads {now} ms since the Unix epoch, before the custom epoch")]
    ClockBeforeEpoch { now: u64 },

    /// The time since the custom epoch no longer fits in 41 bits.
    #[error("timestamp delta {delta} ms exceeds the maximum of {max} ms", max = SnowflakeId::MAX_TIMESTAMP)]
    TimestampRangeExceeded { delta: u64 },

    /// The encoder lock was poisoned by a panic in another thread.
    ///
    /// With the `parking-lot` feature the lock cannot poison and this variant
    /// does not exist.
    #[cfg(not(feature = "parking-lot"))]
    #[error("encoder lock poisoned")]
    LockPoisoned,
}

#[cfg(not(feature = "parking-lot"))]
use crate::sync::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for GenerateError {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
