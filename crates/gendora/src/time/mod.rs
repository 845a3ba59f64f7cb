use std::{
    sync::Arc,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Custom epoch in milliseconds: Wednesday, October 1, 2025 00:00:00 UTC.
pub const EPOCH_MILLIS: u64 = 1_759_276_800_000;

/// [`EPOCH_MILLIS`] as a [`Duration`] since 1970-01-01 UTC.
pub const EPOCH: Duration = Duration::from_millis(EPOCH_MILLIS);

/// A source of wall-clock milliseconds.
///
/// The encoder reads the clock through this trait so tests can supply a
/// deterministic clock and simulate ticks, stalls and regressions.
///
/// Values are milliseconds since the **Unix** epoch; the encoder subtracts
/// [`EPOCH_MILLIS`] itself.
///
/// # Example
///
/// ```
/// use gendora::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1_759_276_800_042
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1_759_276_800_042);
/// ```
pub trait TimeSource {
    /// Returns the current time in milliseconds since the Unix epoch.
    fn current_millis(&self) -> u64;
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}

/// The operating system's wall clock.
///
/// This clock follows NTP adjustments and can move backwards; the encoder
/// refuses to issue ids while it is behind the last issued timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        // A clock set before 1970 reads as zero, which the encoder rejects as
        // being before the custom epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64)
    }
}

/// A wall-clock-aligned time source that never goes backwards.
///
/// The wall-clock time is sampled once at construction; afterwards the clock
/// advances by the elapsed monotonic time (`Instant`). External adjustments to
/// the system clock (NTP steps, manual changes) are therefore ignored for the
/// life of the process.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
    start_millis: u64,
}

impl MonotonicClock {
    /// Anchors a new clock to the current wall-clock time.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            start_millis: SystemClock.current_millis(),
        }
    }

    /// Anchors a new clock at an explicit Unix timestamp (ms).
    pub fn starting_at(start_millis: u64) -> Self {
        Self {
            start: Instant::now(),
            start_millis,
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn current_millis(&self) -> u64 {
        self.start_millis + self.start.elapsed().as_millis() as u64
    }
}
