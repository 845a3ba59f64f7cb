/// Failures reported by a [`SlotStore`](crate::SlotStore) backend.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The store could not be reached.
    #[error("coordination store unreachable: {reason}")]
    Unavailable { reason: String },

    /// The store was reached but rejected or failed the command.
    #[error("coordination store command failed: {reason}")]
    Command { reason: String },

    /// An in-process store lock was poisoned.
    #[error("coordination store lock poisoned")]
    LockPoisoned,
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            Self::Unavailable {
                reason: err.to_string(),
            }
        } else {
            Self::Command {
                reason: err.to_string(),
            }
        }
    }
}
