use core::time::Duration;

use rand::Rng;

use crate::{id::SnowflakeId, slot::SlotError};

/// The order in which slot indices are probed during allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ProbeOrder {
    /// Probe `0, 1, 2, ...`. Deterministic, so instances pack into the low
    /// slots.
    #[default]
    Ascending,
    /// Probe from a random starting index and wrap around. Spreads concurrent
    /// starters across the range, so fewer claims collide.
    RandomStart,
}

impl ProbeOrder {
    /// Returns every index in `0..count` exactly once, in probe order.
    pub fn indices(self, count: u16) -> impl Iterator<Item = u16> {
        let start = match self {
            Self::Ascending => 0,
            Self::RandomStart if count > 0 => rand::rng().random_range(0..count),
            Self::RandomStart => 0,
        };
        (0..count).map(move |i| ((u32::from(start) + u32::from(i)) % u32::from(count)) as u16)
    }
}

/// Configuration for a [`SlotAllocator`](crate::SlotAllocator).
///
/// ```
/// use std::time::Duration;
/// use gendora::{AllocatorConfig, ProbeOrder};
///
/// let config = AllocatorConfig::new("orders")
///     .with_ttl(Duration::from_secs(60))
///     .with_heartbeat_interval(Duration::from_secs(10))
///     .with_probe_order(ProbeOrder::RandomStart);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.slot_key(7), "orders:slot:7");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocatorConfig {
    /// Key prefix shared by every instance that must not collide.
    pub namespace: String,
    /// Lifetime of a lease without renewal.
    pub ttl: Duration,
    /// Period of the renewal task. Must be shorter than `ttl`.
    pub heartbeat_interval: Duration,
    /// Order in which free slots are searched.
    pub probe_order: ProbeOrder,
    /// Claim a new slot from the heartbeat task after the lease is lost.
    pub reallocate_on_loss: bool,
    /// Number of slots probed, starting at 0. At most 1024.
    pub slot_count: u16,
    /// How long stopping the heartbeat waits for an in-flight renewal.
    pub shutdown_grace: Duration,
}

impl AllocatorConfig {
    /// Default lease lifetime: 5 minutes.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);
    /// Default renewal period: 30 seconds.
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
    /// Every slot the id layout can encode.
    pub const DEFAULT_SLOT_COUNT: u16 = SnowflakeId::MAX_SLOT + 1;
    /// Default wait for an in-flight renewal on shutdown.
    pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
    /// Longest accepted lease lifetime: one day.
    pub const MAX_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Creates a config with defaults for everything but the namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ttl: Self::DEFAULT_TTL,
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
            probe_order: ProbeOrder::Ascending,
            reallocate_on_loss: false,
            slot_count: Self::DEFAULT_SLOT_COUNT,
            shutdown_grace: Self::DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Sets the lease lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the renewal period.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the order free slots are searched in.
    pub fn with_probe_order(mut self, order: ProbeOrder) -> Self {
        self.probe_order = order;
        self
    }

    /// Lets the heartbeat claim a new slot after the lease is lost.
    pub fn with_reallocate_on_loss(mut self, enabled: bool) -> Self {
        self.reallocate_on_loss = enabled;
        self
    }

    /// Limits probing to slots `0..count`.
    pub fn with_slot_count(mut self, count: u16) -> Self {
        self.slot_count = count;
        self
    }

    /// Sets how long stopping the heartbeat waits before aborting it.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// The store key guarding `slot`: `<namespace>:slot:<index>`.
    pub fn slot_key(&self, slot: u16) -> String {
        format!("{}:slot:{slot}", self.namespace)
    }

    /// Checks that the values can drive a working lease.
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::InvalidConfig`] when the namespace is empty, the
    /// TTL is shorter than one second or longer than [`Self::MAX_TTL`], the
    /// heartbeat interval is zero or not shorter than the TTL, or the slot
    /// count is outside `1..=1024`.
    pub fn validate(&self) -> Result<(), SlotError> {
        let invalid = |reason: String| Err(SlotError::InvalidConfig { reason });
        if self.namespace.is_empty() {
            return invalid("namespace must not be empty".to_owned());
        }
        if self.ttl < Duration::from_secs(1) {
            return invalid(format!("ttl {:?} is shorter than one second", self.ttl));
        }
        if self.ttl > Self::MAX_TTL {
            return invalid(format!(
                "ttl {:?} is longer than {:?}",
                self.ttl,
                Self::MAX_TTL
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return invalid("heartbeat interval must be positive".to_owned());
        }
        if self.heartbeat_interval >= self.ttl {
            return invalid(format!(
                "heartbeat interval {:?} must be shorter than ttl {:?}",
                self.heartbeat_interval, self.ttl
            ));
        }
        if self.slot_count == 0 || self.slot_count > Self::DEFAULT_SLOT_COUNT {
            return invalid(format!(
                "slot count {} is outside 1..={}",
                self.slot_count,
                Self::DEFAULT_SLOT_COUNT
            ));
        }
        Ok(())
    }
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self::new("gendora")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AllocatorConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.slot_count, 1024);
        assert_eq!(config.probe_order, ProbeOrder::Ascending);
        assert!(!config.reallocate_on_loss);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn heartbeat_must_be_shorter_than_ttl() {
        let config = AllocatorConfig::default()
            .with_ttl(Duration::from_secs(10))
            .with_heartbeat_interval(Duration::from_secs(10));
        assert!(matches!(config.validate(), Err(SlotError::InvalidConfig { .. })));

        let config = config.with_heartbeat_interval(Duration::ZERO);
        assert!(matches!(config.validate(), Err(SlotError::InvalidConfig { .. })));
    }

    #[test]
    fn slot_count_is_bounded_by_the_layout() {
        let config = AllocatorConfig::default().with_slot_count(1025);
        assert!(config.validate().is_err());
        let config = config.with_slot_count(0);
        assert!(config.validate().is_err());
        let config = config.with_slot_count(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn ttl_is_bounded() {
        let config = AllocatorConfig::default().with_ttl(Duration::from_secs(u64::MAX));
        assert!(matches!(config.validate(), Err(SlotError::InvalidConfig { .. })));

        let config = config.with_ttl(AllocatorConfig::MAX_TTL);
        assert!(config.validate().is_ok());
        let config = config.with_ttl(AllocatorConfig::MAX_TTL + Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_namespace_is_rejected() {
        assert!(AllocatorConfig::new("").validate().is_err());
    }

    #[test]
    fn ascending_probe_starts_at_zero() {
        let order: Vec<_> = ProbeOrder::Ascending.indices(5).collect();
        assert_eq!(order, [0, 1, 2, 3, 4]);
    }

    #[test]
    fn random_start_visits_every_slot_once() {
        for _ in 0..32 {
            let order: Vec<_> = ProbeOrder::RandomStart.indices(1024).collect();
            assert_eq!(order.len(), 1024);
            let unique: HashSet<_> = order.iter().copied().collect();
            assert_eq!(unique.len(), 1024);
            // Contiguous modulo the range.
            for pair in order.windows(2) {
                assert_eq!(pair[1], (pair[0] + 1) % 1024);
            }
        }
    }

    #[test]
    fn empty_range_yields_nothing() {
        assert_eq!(ProbeOrder::RandomStart.indices(0).count(), 0);
    }

    #[test]
    fn slot_keys_are_namespaced() {
        assert_eq!(AllocatorConfig::new("ns").slot_key(1023), "ns:slot:1023");
    }
}
