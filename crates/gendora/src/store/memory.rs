use core::time::Duration;
use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::time::Instant;

use crate::{
    store::{SlotStore, StoreError},
    sync::{Mutex, MutexGuard},
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// An in-process [`SlotStore`].
///
/// Keys expire lazily: an entry past its deadline is treated as absent and
/// dropped on the next access. Deadlines are measured with
/// [`tokio::time::Instant`], so a paused Tokio clock controls expiry in tests.
///
/// Clones share the same map, which lets several allocators in one process
/// contend for slots. Across processes this store offers no coordination at
/// all; use it for single-instance deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally sets `key` to `value` with no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the map lock is poisoned.
    pub fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: None,
            },
        );
        Ok(())
    }

    /// Returns the remaining time-to-live of `key`.
    ///
    /// `None` if the key is absent, expired or has no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the map lock is poisoned.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at - now))
    }

    /// Number of live keys.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the map lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries.len())
    }

    /// Returns `true` if no live keys are stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockPoisoned`] if the map lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|len| len == 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.entries.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            self.entries.lock().map_err(|_| StoreError::LockPoisoned)
        }
    }

    // Returns the live entry for `key`, evicting it first if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl SlotStore for MemoryStore {
    async fn claim_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: None,
            },
        );
        Ok(true)
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let Some(entry) = Self::live(&mut entries, key, now) else {
            return Ok(false);
        };
        let deadline = now.checked_add(ttl).ok_or_else(|| StoreError::Command {
            reason: format!("expiry {ttl:?} out of range"),
        })?;
        entry.expires_at = Some(deadline);
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let existed = Self::live(&mut entries, key, now).is_some();
        entries.remove(key);
        Ok(existed)
    }
}
