use crate::{generator::GenerateError, slot::SlotError, store::StoreError};

/// A result type defaulting to the crate-wide [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `gendora` can produce.
///
/// Each component has its own error type; this enum unifies them for callers
/// that drive the whole lifecycle (allocate, generate, release) and want a
/// single error to propagate.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// ID generation failed for this call.
    #[error(transparent)]
    Generate(#[from] GenerateError),

    /// The slot lease could not be acquired, renewed or released.
    #[error(transparent)]
    Slot(#[from] SlotError),

    /// The coordination store failed outside of an allocator operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Returns `true` if this error means no slot lease is currently held.
    pub const fn is_slot_unavailable(&self) -> bool {
        matches!(self, Self::Generate(GenerateError::SlotUnavailable))
    }
}
