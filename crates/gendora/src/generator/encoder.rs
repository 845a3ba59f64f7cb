use core::cmp::Ordering;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    generator::{GenerateError, IdGenerator, SlotSource},
    id::{Metadata, SnowflakeId, decode},
    sync::Mutex,
    time::{EPOCH_MILLIS, TimeSource},
};

/// The mutable part of an [`IdEncoder`]: the last timestamp used and the
/// sequence issued within it.
///
/// `last_timestamp` is in milliseconds since the Unix epoch. A zero value
/// means no id has been issued yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderState {
    /// Millisecond of the most recently issued id.
    pub last_timestamp: u64,
    /// Sequence of the most recently issued id within `last_timestamp`.
    pub sequence: u16,
}

/// A lock-based Snowflake encoder for one instance.
///
/// Every call to [`IdEncoder::generate`] runs under a single mutex guarding
/// [`EncoderState`], so concurrent request handlers are serialized and the
/// (timestamp, sequence) pair issued by this instance is strictly increasing.
///
/// The slot is read from a [`SlotSource`] on each call and the time from a
/// [`TimeSource`]; both are injected so the encoder can run against a leased
/// slot in production and against fixed values in tests.
///
/// ## Sequence exhaustion
///
/// When all 4096 sequence values of the current millisecond are used, the
/// encoder spins on the clock until it ticks past the last timestamp. Under
/// sustained load above 4096 ids/ms this is the backpressure mechanism and it
/// burns CPU until the clock advances.
///
/// # Example
///
/// ```
/// use gendora::{FixedSlot, IdEncoder, SystemClock};
///
/// let encoder = IdEncoder::new(FixedSlot(7), SystemClock);
/// let a = encoder.generate().unwrap();
/// let b = encoder.generate().unwrap();
/// assert!(a < b);
/// assert_eq!(encoder.decode(b.to_raw()).slot, 7);
/// ```
pub struct IdEncoder<S, T>
where
    S: SlotSource,
    T: TimeSource,
{
    pub(crate) state: Mutex<EncoderState>,
    pub(crate) slots: S,
    pub(crate) time: T,
}

impl<S, T> IdEncoder<S, T>
where
    S: SlotSource,
    T: TimeSource,
{
    /// Creates an encoder that has not issued any id yet.
    pub fn new(slots: S, time: T) -> Self {
        Self::from_state(EncoderState::default(), slots, time)
    }

    /// Creates an encoder resuming from an explicit state.
    ///
    /// Resuming with a `last_timestamp` ahead of the clock makes every call
    /// fail with [`GenerateError::ClockMovedBackwards`] until the clock
    /// catches up.
    pub fn from_state(state: EncoderState, slots: S, time: T) -> Self {
        Self {
            state: Mutex::new(state),
            slots,
            time,
        }
    }

    /// Generates the next id.
    ///
    /// # Errors
    ///
    /// - [`GenerateError::SlotUnavailable`] if no slot is held.
    /// - [`GenerateError::InvalidSlot`] if the slot source reports a value that
    ///   does not fit in 10 bits.
    /// - [`GenerateError::ClockMovedBackwards`] if the clock is behind the
    ///   last issued timestamp. The state is left untouched.
    /// - [`GenerateError::ClockBeforeEpoch`] or
    ///   [`GenerateError::TimestampRangeExceeded`] if the clock is outside the
    ///   41-bit window starting at [`EPOCH_MILLIS`].
    /// - [`GenerateError::LockPoisoned`] if the lock is poisoned (std mutex
    ///   only).
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn generate(&self) -> Result<SnowflakeId, GenerateError> {
        let mut state = {
            #[cfg(feature = "parking-lot")]
            {
                self.state.lock()
            }
            #[cfg(not(feature = "parking-lot"))]
            {
                self.state.lock()?
            }
        };

        let slot = self
            .slots
            .current_slot()
            .ok_or(GenerateError::SlotUnavailable)?;
        if slot > SnowflakeId::MAX_SLOT {
            return Err(GenerateError::InvalidSlot { slot });
        }

        let mut now = self.time.current_millis();
        let last = state.last_timestamp;
        let sequence = match now.cmp(&last) {
            Ordering::Equal => {
                if state.sequence < SnowflakeId::MAX_SEQUENCE {
                    state.sequence + 1
                } else {
                    now = self.cold_wait_next_millis(last);
                    0
                }
            }
            Ordering::Greater => 0,
            Ordering::Less => return Err(Self::cold_clock_behind(now, last)),
        };

        state.last_timestamp = now;
        state.sequence = sequence;

        let delta = now
            .checked_sub(EPOCH_MILLIS)
            .ok_or(GenerateError::ClockBeforeEpoch { now })?;
        if delta > SnowflakeId::MAX_TIMESTAMP {
            return Err(GenerateError::TimestampRangeExceeded { delta });
        }

        Ok(SnowflakeId::from_components(delta, slot, sequence))
    }

    /// Decodes any 64-bit value; see [`decode`].
    pub fn decode(&self, id: u64) -> Metadata {
        decode(id)
    }

    /// Returns a snapshot of the encoder state.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError::LockPoisoned`] if the lock is poisoned (std
    /// mutex only).
    pub fn state(&self) -> Result<EncoderState, GenerateError> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(*self.state.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(*self.state.lock()?)
        }
    }

    /// Returns the slot source this encoder reads from.
    pub fn slots(&self) -> &S {
        &self.slots
    }

    // Spins until the clock is strictly past `last`. Called with the state lock
    // held, which is what throttles every other caller as well.
    #[cold]
    #[inline(never)]
    fn cold_wait_next_millis(&self, last: u64) -> u64 {
        let mut now = self.time.current_millis();
        while now <= last {
            core::hint::spin_loop();
            now = self.time.current_millis();
        }
        now
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(now: u64, last: u64) -> GenerateError {
        let millis = last - now;
        #[cfg(feature = "tracing")]
        tracing::warn!(millis, "Clock moved backwards, refusing to generate id");
        GenerateError::ClockMovedBackwards { millis }
    }
}

impl<S, T> IdGenerator for IdEncoder<S, T>
where
    S: SlotSource + Send + Sync,
    T: TimeSource + Send + Sync,
{
    fn generate(&self) -> Result<SnowflakeId, GenerateError> {
        self.generate()
    }

    fn current_slot(&self) -> Option<u16> {
        self.slots.current_slot()
    }
}
