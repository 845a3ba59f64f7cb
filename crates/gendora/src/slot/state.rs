use portable_atomic::{AtomicU32, Ordering};

/// Lifecycle of an instance's slot lease.
///
/// ```text
/// Unallocated --allocate--> Allocated --release--> Released (terminal)
///                               |
///                        renewal fails
///                               v
///                             Lost --allocate / reallocate_on_loss--> Allocated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No slot has been claimed yet.
    Unallocated,
    /// `slot` is leased and being renewed.
    Allocated { slot: u16 },
    /// The lease on `slot` could not be renewed; it must not be used.
    Lost { slot: u16 },
    /// The lease was given up on shutdown.
    Released,
}

impl SlotState {
    const TAG_SHIFT: u32 = 16;
    const SLOT_MASK: u32 = 0xFFFF;

    const UNALLOCATED: u32 = 0;
    const ALLOCATED: u32 = 1;
    const LOST: u32 = 2;
    const RELEASED: u32 = 3;

    /// Returns the slot usable for id generation, if any.
    pub const fn usable_slot(&self) -> Option<u16> {
        match self {
            Self::Allocated { slot } => Some(*slot),
            _ => None,
        }
    }

    const fn pack(self) -> u32 {
        match self {
            Self::Unallocated => Self::UNALLOCATED << Self::TAG_SHIFT,
            Self::Allocated { slot } => (Self::ALLOCATED << Self::TAG_SHIFT) | slot as u32,
            Self::Lost { slot } => (Self::LOST << Self::TAG_SHIFT) | slot as u32,
            Self::Released => Self::RELEASED << Self::TAG_SHIFT,
        }
    }

    const fn unpack(raw: u32) -> Self {
        let slot = (raw & Self::SLOT_MASK) as u16;
        match raw >> Self::TAG_SHIFT {
            Self::ALLOCATED => Self::Allocated { slot },
            Self::LOST => Self::Lost { slot },
            Self::RELEASED => Self::Released,
            _ => Self::Unallocated,
        }
    }
}

/// The allocator's state packed into one atomic word.
///
/// State and slot are written together, so readers on the id generation path
/// never observe a slot paired with a stale state.
#[derive(Debug)]
pub(crate) struct SlotCell(AtomicU32);

impl SlotCell {
    pub(crate) const fn new(state: SlotState) -> Self {
        Self(AtomicU32::new(state.pack()))
    }

    pub(crate) fn load(&self) -> SlotState {
        SlotState::unpack(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: SlotState) {
        self.0.store(state.pack(), Ordering::Release);
    }

    /// Moves from `current` to `new`; returns `false` if another transition
    /// happened first.
    pub(crate) fn transition(&self, current: SlotState, new: SlotState) -> bool {
        self.0
            .compare_exchange(current.pack(), new.pack(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
