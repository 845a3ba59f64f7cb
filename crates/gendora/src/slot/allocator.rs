use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    generator::SlotSource,
    slot::{
        AllocatorConfig, OwnerId, RenewalFailure, SlotError, SlotState, heartbeat::Heartbeat,
        state::SlotCell,
    },
    store::SlotStore,
};

/// What [`SlotAllocator::release`] did with the slot key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The key was still ours and has been deleted.
    Released { slot: u16 },
    /// The key was left in place: it expired (`owner` is `None`) or another
    /// instance claimed the slot since.
    NotOwned { slot: u16, owner: Option<String> },
    /// No slot was ever held.
    NotHeld,
}

/// The shared part of an allocator, also driven by its heartbeat task.
pub(crate) struct Lease<S: SlotStore> {
    pub(crate) store: S,
    pub(crate) config: AllocatorConfig,
    pub(crate) owner: OwnerId,
    pub(crate) cell: SlotCell,
}

impl<S: SlotStore> Lease<S> {
    // Probes for a free slot: claim, then set the expiry on the first key we
    // created. Nothing is issued against indices after the winning one.
    async fn claim(&self) -> Result<u16, SlotError> {
        let config = &self.config;
        for slot in config.probe_order.indices(config.slot_count) {
            let key = config.slot_key(slot);
            if !self.store.claim_if_absent(&key, self.owner.as_str()).await? {
                continue;
            }
            match self.store.set_expiry(&key, config.ttl).await {
                Ok(true) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!(slot, %key, owner = %self.owner, "Claimed slot");
                    return Ok(slot);
                }
                Ok(false) => {}
                Err(err) => {
                    // A key without a TTL would hold the slot forever.
                    #[cfg(feature = "tracing")]
                    tracing::warn!(slot, %key, error = %err, "Setting expiry failed, dropping claim");
                    let _ = self.delete_if_owned(slot).await;
                    return Err(err.into());
                }
            }
            // Gone between the claim and the expiry; keep looking.
            #[cfg(feature = "tracing")]
            tracing::warn!(slot, %key, "Claimed key vanished before expiry was set");
        }
        Err(SlotError::Exhausted {
            slots: config.slot_count,
        })
    }

    async fn renew(&self, slot: u16) -> Result<(), RenewalFailure> {
        let key = self.config.slot_key(slot);
        match self.store.get(&key).await.map_err(RenewalFailure::Store)? {
            None => return Err(RenewalFailure::Missing),
            Some(owner) if owner != self.owner.as_str() => {
                return Err(RenewalFailure::OwnerMismatch { owner });
            }
            Some(_) => {}
        }
        let refreshed = self
            .store
            .set_expiry(&key, self.config.ttl)
            .await
            .map_err(RenewalFailure::Store)?;
        if refreshed {
            Ok(())
        } else {
            Err(RenewalFailure::Missing)
        }
    }

    /// Renews `slot`, moving to [`SlotState::Lost`] on any failure.
    pub(crate) async fn renew_slot(&self, slot: u16) -> Result<(), SlotError> {
        match self.renew(slot).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(slot, "Renewed slot lease");
                Ok(())
            }
            Err(reason) => {
                self.cell
                    .transition(SlotState::Allocated { slot }, SlotState::Lost { slot });
                #[cfg(feature = "tracing")]
                tracing::error!(slot, %reason, "Lease renewal failed, slot is no longer usable");
                Err(SlotError::RenewalFailed { slot, reason })
            }
        }
    }

    /// One heartbeat period: renew a held lease, then claim a new slot if the
    /// lease is lost and the config allows it.
    pub(crate) async fn tick(&self) {
        match self.cell.load() {
            SlotState::Allocated { slot } => {
                // Logged inside; the state change is what matters.
                let _ = self.renew_slot(slot).await;
            }
            SlotState::Lost { .. } => {}
            SlotState::Unallocated | SlotState::Released => return,
        }

        if !self.config.reallocate_on_loss {
            return;
        }
        let SlotState::Lost { slot: _lost } = self.cell.load() else {
            return;
        };
        match self.claim().await {
            Ok(slot) => {
                self.cell.store(SlotState::Allocated { slot });
                #[cfg(feature = "tracing")]
                tracing::warn!(lost = _lost, slot, "Re-allocated after losing lease");
            }
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::error!(lost = _lost, error = %_err, "Re-allocation failed, retrying next heartbeat");
            }
        }
    }

    async fn delete_if_owned(&self, slot: u16) -> Result<ReleaseOutcome, SlotError> {
        let key = self.config.slot_key(slot);
        match self.store.get(&key).await? {
            Some(owner) if owner == self.owner.as_str() => {
                self.store.delete(&key).await?;
                #[cfg(feature = "tracing")]
                tracing::info!(slot, %key, "Released slot");
                Ok(ReleaseOutcome::Released { slot })
            }
            owner => {
                #[cfg(feature = "tracing")]
                tracing::warn!(slot, %key, ?owner, "Slot no longer owned, leaving key in place");
                Ok(ReleaseOutcome::NotOwned { slot, owner })
            }
        }
    }
}

/// Leases one slot from a [`SlotStore`] and keeps it alive.
///
/// ```text
/// allocate()  ->  claim "<ns>:slot:<i>" for the first free i, set its TTL,
///                 start the heartbeat
/// heartbeat   ->  every interval: check the key is still ours, refresh TTL;
///                 on failure the slot becomes unusable (Lost)
/// release()   ->  stop the heartbeat, then delete the key only if still ours
/// ```
///
/// The allocator is the [`SlotSource`] of an
/// [`IdEncoder`](crate::IdEncoder): share it through an `Arc` and the encoder
/// sees a lost or released lease on its very next call.
///
/// Renewal runs on a Tokio task, so [`allocate`](Self::allocate) must be
/// called inside a Tokio runtime. Dropping the allocator cancels the task but
/// leaves the key to expire; call [`release`](Self::release) for a clean
/// shutdown.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use gendora::{AllocatorConfig, IdEncoder, MemoryStore, ReleaseOutcome, SlotAllocator, SystemClock};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> gendora::Result<()> {
/// let allocator = Arc::new(SlotAllocator::new(MemoryStore::new(), AllocatorConfig::new("docs")));
/// let slot = allocator.allocate().await?;
///
/// let encoder = IdEncoder::new(Arc::clone(&allocator), SystemClock);
/// let id = encoder.generate()?;
/// assert_eq!(id.slot(), slot);
///
/// assert_eq!(allocator.release().await?, ReleaseOutcome::Released { slot });
/// assert!(encoder.generate().is_err());
/// # Ok(())
/// # }
/// ```
pub struct SlotAllocator<S: SlotStore> {
    lease: Arc<Lease<S>>,
    heartbeat: tokio::sync::Mutex<Option<Heartbeat>>,
}

impl<S: SlotStore> SlotAllocator<S> {
    /// Creates an unallocated allocator with a freshly generated owner id.
    pub fn new(store: S, config: AllocatorConfig) -> Self {
        Self::with_owner(store, config, OwnerId::generate())
    }

    /// Creates an unallocated allocator with an explicit owner id.
    ///
    /// Two allocators sharing an owner id can release each other's slots;
    /// owner ids must be unique per running instance.
    pub fn with_owner(store: S, config: AllocatorConfig, owner: OwnerId) -> Self {
        Self {
            lease: Arc::new(Lease {
                store,
                config,
                owner,
                cell: SlotCell::new(SlotState::Unallocated),
            }),
            heartbeat: tokio::sync::Mutex::new(None),
        }
    }

    /// Claims the first free slot and starts renewing it.
    ///
    /// Also the explicit recovery path after [`SlotState::Lost`].
    ///
    /// # Errors
    ///
    /// - [`SlotError::InvalidConfig`] if the config does not validate.
    /// - [`SlotError::AlreadyAllocated`] if a slot is held.
    /// - [`SlotError::Released`] after [`release`](Self::release).
    /// - [`SlotError::Exhausted`] if every slot is taken.
    /// - [`SlotError::Store`] if the store fails while probing.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(namespace = %self.lease.config.namespace)))]
    pub async fn allocate(&self) -> Result<u16, SlotError> {
        self.lease.config.validate()?;
        let mut heartbeat = self.heartbeat.lock().await;
        match self.lease.cell.load() {
            SlotState::Allocated { slot } => return Err(SlotError::AlreadyAllocated { slot }),
            SlotState::Released => return Err(SlotError::Released),
            SlotState::Unallocated | SlotState::Lost { .. } => {}
        }

        if let Some(old) = heartbeat.take() {
            old.stop(self.lease.config.shutdown_grace).await;
        }
        // The old task may have re-allocated before it stopped.
        let slot = match self.lease.cell.load() {
            SlotState::Allocated { slot } => slot,
            _ => {
                let slot = self.lease.claim().await?;
                self.lease.cell.store(SlotState::Allocated { slot });
                slot
            }
        };

        *heartbeat = Some(Heartbeat::spawn(Arc::clone(&self.lease)));
        Ok(slot)
    }

    /// Renews the held lease once, outside the periodic schedule.
    ///
    /// # Errors
    ///
    /// - [`SlotError::RenewalFailed`] if the key is missing, owned by someone
    ///   else or the store fails. The allocator is then
    ///   [`SlotState::Lost`].
    /// - [`SlotError::NotAllocated`] if no usable slot is held.
    /// - [`SlotError::Released`] after [`release`](Self::release).
    pub async fn heartbeat(&self) -> Result<(), SlotError> {
        match self.lease.cell.load() {
            SlotState::Allocated { slot } => self.lease.renew_slot(slot).await,
            SlotState::Released => Err(SlotError::Released),
            SlotState::Unallocated | SlotState::Lost { .. } => Err(SlotError::NotAllocated),
        }
    }

    /// Stops the periodic renewal and waits for it to finish.
    ///
    /// The slot stays usable until its TTL runs out in the store.
    /// [`release`](Self::release) calls this itself.
    pub async fn stop_heartbeat(&self) {
        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            heartbeat.stop(self.lease.config.shutdown_grace).await;
        }
    }

    /// Gives the slot back.
    ///
    /// The heartbeat is stopped and awaited first. The allocator then becomes
    /// [`SlotState::Released`] and the key is deleted only if the store still
    /// records this instance as its owner. Calling `release` again returns
    /// [`ReleaseOutcome::NotHeld`].
    ///
    /// # Errors
    ///
    /// Returns [`SlotError::Store`] if the owner check or the delete fails;
    /// the allocator is released regardless and the key expires on its own.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self), fields(namespace = %self.lease.config.namespace)))]
    pub async fn release(&self) -> Result<ReleaseOutcome, SlotError> {
        let mut heartbeat = self.heartbeat.lock().await;
        if let Some(running) = heartbeat.take() {
            running.stop(self.lease.config.shutdown_grace).await;
        }

        let previous = self.lease.cell.load();
        self.lease.cell.store(SlotState::Released);
        match previous {
            SlotState::Allocated { slot } | SlotState::Lost { slot } => {
                self.lease.delete_if_owned(slot).await
            }
            SlotState::Unallocated | SlotState::Released => Ok(ReleaseOutcome::NotHeld),
        }
    }

    /// The slot usable for id generation right now, if any.
    pub fn current_slot(&self) -> Option<u16> {
        self.lease.cell.load().usable_slot()
    }

    /// The lifecycle state.
    pub fn state(&self) -> SlotState {
        self.lease.cell.load()
    }

    /// The owner id written to claimed keys.
    pub fn owner(&self) -> &OwnerId {
        &self.lease.owner
    }

    /// The configuration this allocator was built with.
    pub fn config(&self) -> &AllocatorConfig {
        &self.lease.config
    }

    /// The backing coordination store.
    pub fn store(&self) -> &S {
        &self.lease.store
    }
}

impl<S: SlotStore> SlotSource for SlotAllocator<S> {
    fn current_slot(&self) -> Option<u16> {
        self.lease.cell.load().usable_slot()
    }
}
