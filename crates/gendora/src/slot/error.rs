use crate::store::StoreError;

/// Why a lease renewal failed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RenewalFailure {
    /// The slot key no longer exists (expired or deleted).
    #[error("lease key is missing")]
    Missing,

    /// Another instance owns the slot key now.
    #[error("lease is owned by {owner}")]
    OwnerMismatch { owner: String },

    /// The store failed during renewal.
    #[error(transparent)]
    Store(StoreError),
}

/// Failures of the slot lease lifecycle.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SlotError {
    /// Every slot in the probed range is held by another instance.
    ///
    /// Fatal at startup: the instance must not serve until an operator frees
    /// slots.
    #[error("no available slots found (all {slots} slots are occupied)")]
    Exhausted { slots: u16 },

    /// The lease could not be renewed; the allocator is now
    /// [`SlotState::Lost`](crate::SlotState::Lost).
    #[error("failed to renew lease on slot {slot}: {reason}")]
    RenewalFailed { slot: u16, reason: RenewalFailure },

    /// `allocate` was called while a slot is already held.
    #[error("slot {slot} is already allocated to this instance")]
    AlreadyAllocated { slot: u16 },

    /// The operation needs a held slot and there is none.
    #[error("no slot is allocated to this instance")]
    NotAllocated,

    /// The allocator was released and cannot be used again.
    #[error("slot allocator has been released")]
    Released,

    /// The allocator configuration is unusable.
    #[error("invalid allocator config: {reason}")]
    InvalidConfig { reason: String },

    /// The coordination store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
