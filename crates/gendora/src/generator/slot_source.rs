use std::sync::Arc;

/// Something that knows which slot this instance currently owns.
///
/// The encoder asks on **every** call rather than caching the answer, so a
/// lost or re-acquired lease is reflected in the very next id.
/// [`SlotAllocator`](crate::SlotAllocator) is the production implementation.
pub trait SlotSource {
    /// Returns the held slot, or `None` if no lease is currently held.
    fn current_slot(&self) -> Option<u16>;
}

impl<S: SlotSource + ?Sized> SlotSource for &S {
    fn current_slot(&self) -> Option<u16> {
        (**self).current_slot()
    }
}

impl<S: SlotSource + ?Sized> SlotSource for Arc<S> {
    fn current_slot(&self) -> Option<u16> {
        (**self).current_slot()
    }
}

/// A statically assigned slot.
///
/// Useful for single-instance deployments, benchmarks and tests. Deployments
/// running more than one instance must lease slots through a
/// [`SlotAllocator`](crate::SlotAllocator) instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSlot(pub u16);

impl SlotSource for FixedSlot {
    fn current_slot(&self) -> Option<u16> {
        Some(self.0)
    }
}
