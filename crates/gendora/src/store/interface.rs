use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;

use crate::store::StoreError;

/// The primitives a shared key-value store must offer to back slot leases.
///
/// Any store with an atomic set-if-absent and per-key expiry qualifies. All
/// methods take fully qualified keys; key naming belongs to the
/// [`SlotAllocator`](crate::SlotAllocator).
#[async_trait]
pub trait SlotStore: Send + Sync + 'static {
    /// Atomically sets `key` to `value` if it does not exist.
    ///
    /// Returns `true` if this call created the key.
    async fn claim_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Sets (or refreshes) the time-to-live of `key`.
    ///
    /// Returns `false` if the key does not exist.
    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Reads the value of `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Deletes `key`. Returns `true` if a key was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: SlotStore + ?Sized> SlotStore for Arc<S> {
    async fn claim_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        (**self).claim_if_absent(key, value).await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).set_expiry(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        (**self).delete(key).await
    }
}
