use core::time::Duration;
use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;

use crate::{
    AllocatorConfig, GenerateError, IdEncoder, MemoryStore, OwnerId, ProbeOrder, ReleaseOutcome,
    RenewalFailure, SlotAllocator, SlotError, SlotState, SlotStore, StoreError, SystemClock,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Claim(String),
    Expire(String),
    Get(String),
    Delete(String),
}

/// A [`MemoryStore`] that logs every call and can be switched to failing.
#[derive(Clone, Default)]
struct RecordingStore {
    inner: MemoryStore,
    ops: Arc<Mutex<Vec<Op>>>,
    failing: Arc<AtomicBool>,
    failing_expiry: Arc<AtomicBool>,
    vanish_before_expiry: Arc<Mutex<Option<String>>>,
}

impl RecordingStore {
    fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    fn clear(&self) {
        self.ops.lock().unwrap().clear();
    }

    fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn fail_expiry(&self, failing: bool) {
        self.failing_expiry.store(failing, Ordering::SeqCst);
    }

    // Deletes `key` right before the next expiry call on it.
    fn vanish_before_expiry(&self, key: &str) {
        *self.vanish_before_expiry.lock().unwrap() = Some(key.to_owned());
    }

    fn record(&self, op: Op) -> Result<(), StoreError> {
        self.ops.lock().unwrap().push(op);
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "connection refused".to_owned(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SlotStore for RecordingStore {
    async fn claim_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.record(Op::Claim(key.to_owned()))?;
        self.inner.claim_if_absent(key, value).await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.record(Op::Expire(key.to_owned()))?;
        if self.failing_expiry.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable {
                reason: "timeout".to_owned(),
            });
        }
        let vanish = {
            let mut pending = self.vanish_before_expiry.lock().unwrap();
            if pending.as_deref() == Some(key) {
                pending.take()
            } else {
                None
            }
        };
        if vanish.is_some() {
            self.inner.delete(key).await?;
        }
        self.inner.set_expiry(key, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.record(Op::Get(key.to_owned()))?;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.record(Op::Delete(key.to_owned()))?;
        self.inner.delete(key).await
    }
}

/// Claims and expiries succeed; every `get` hangs until dropped.
#[derive(Clone, Default)]
struct HangingStore {
    inner: MemoryStore,
    dropped: Arc<AtomicBool>,
}

struct SetOnDrop(Arc<AtomicBool>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SlotStore for HangingStore {
    async fn claim_if_absent(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        self.inner.claim_if_absent(key, value).await
    }

    async fn set_expiry(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.set_expiry(key, ttl).await
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        let _guard = SetOnDrop(Arc::clone(&self.dropped));
        std::future::pending().await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.delete(key).await
    }
}

const TTL: Duration = Duration::from_secs(10);
const INTERVAL: Duration = Duration::from_secs(3);

fn config() -> AllocatorConfig {
    AllocatorConfig::new("ns")
        .with_ttl(TTL)
        .with_heartbeat_interval(INTERVAL)
}

fn claim(key: &str) -> Op {
    Op::Claim(key.to_owned())
}

fn expire(key: &str) -> Op {
    Op::Expire(key.to_owned())
}

#[tokio::test]
async fn skips_pre_claimed_slots_and_stops_at_first_free() {
    let store = RecordingStore::default();
    store.inner.put("ns:slot:0", "other-a").unwrap();
    store.inner.put("ns:slot:1", "other-b").unwrap();

    let allocator = SlotAllocator::with_owner(store.clone(), config(), "me".into());
    assert_eq!(allocator.allocate().await.unwrap(), 2);
    assert_eq!(
        store.ops(),
        [
            claim("ns:slot:0"),
            claim("ns:slot:1"),
            claim("ns:slot:2"),
            expire("ns:slot:2"),
        ]
    );
    assert_eq!(allocator.state(), SlotState::Allocated { slot: 2 });
    assert_eq!(allocator.current_slot(), Some(2));
    assert_eq!(
        store.inner.get("ns:slot:2").await.unwrap().as_deref(),
        Some("me")
    );
}

#[tokio::test(start_paused = true)]
async fn claimed_key_gets_the_configured_ttl() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::new(store.clone(), config());
    let slot = allocator.allocate().await.unwrap();
    assert_eq!(store.ttl(&format!("ns:slot:{slot}")).unwrap(), Some(TTL));
    assert_eq!(
        store.get("ns:slot:0").await.unwrap().as_deref(),
        Some(allocator.owner().as_str())
    );
}

#[tokio::test]
async fn exhausted_range_is_fatal() {
    let store = RecordingStore::default();
    for slot in 0..3 {
        store.inner.put(&format!("ns:slot:{slot}"), "other").unwrap();
    }
    let allocator = SlotAllocator::new(store.clone(), config().with_slot_count(3));

    assert_eq!(
        allocator.allocate().await,
        Err(SlotError::Exhausted { slots: 3 })
    );
    assert_eq!(allocator.state(), SlotState::Unallocated);
    assert_eq!(allocator.current_slot(), None);
    assert!(!store.ops().iter().any(|op| matches!(op, Op::Expire(_))));
}

#[tokio::test]
async fn all_1024_slots_taken() {
    let store = MemoryStore::new();
    for slot in 0..1024 {
        store.put(&format!("ns:slot:{slot}"), "other").unwrap();
    }
    let allocator = SlotAllocator::new(store, config());
    assert_eq!(
        allocator.allocate().await,
        Err(SlotError::Exhausted { slots: 1024 })
    );
}

#[tokio::test(start_paused = true)]
async fn failed_expiry_drops_the_claimed_key() {
    let store = RecordingStore::default();
    store.fail_expiry(true);
    let allocator = SlotAllocator::with_owner(store.clone(), config(), "me".into());

    assert_eq!(
        allocator.allocate().await,
        Err(SlotError::Store(StoreError::Unavailable {
            reason: "timeout".to_owned(),
        }))
    );
    assert_eq!(allocator.state(), SlotState::Unallocated);
    assert_eq!(
        store.ops(),
        [
            claim("ns:slot:0"),
            expire("ns:slot:0"),
            Op::Get("ns:slot:0".to_owned()),
            Op::Delete("ns:slot:0".to_owned()),
        ]
    );
    assert!(store.inner.is_empty().unwrap());

    // Nothing left behind that could block the slot.
    tokio::time::sleep(TTL * 100).await;
    assert_eq!(store.inner.get("ns:slot:0").await.unwrap(), None);

    store.fail_expiry(false);
    assert_eq!(allocator.allocate().await, Ok(0));
}

#[tokio::test]
async fn key_vanishing_before_expiry_moves_on_to_the_next_slot() {
    let store = RecordingStore::default();
    store.vanish_before_expiry("ns:slot:0");
    let allocator = SlotAllocator::with_owner(store.clone(), config(), "me".into());

    assert_eq!(allocator.allocate().await, Ok(1));
    assert_eq!(
        store.ops(),
        [
            claim("ns:slot:0"),
            expire("ns:slot:0"),
            claim("ns:slot:1"),
            expire("ns:slot:1"),
        ]
    );
    assert_eq!(allocator.state(), SlotState::Allocated { slot: 1 });
    assert_eq!(store.inner.get("ns:slot:0").await.unwrap(), None);
    assert_eq!(
        store.inner.get("ns:slot:1").await.unwrap().as_deref(),
        Some("me")
    );
}

#[tokio::test]
async fn oversized_ttl_is_rejected_before_probing() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(
        store.clone(),
        config().with_ttl(Duration::from_secs(u64::MAX)),
    );
    assert!(matches!(
        allocator.allocate().await,
        Err(SlotError::InvalidConfig { .. })
    ));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn invalid_config_touches_no_keys() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config().with_heartbeat_interval(TTL));
    assert!(matches!(
        allocator.allocate().await,
        Err(SlotError::InvalidConfig { .. })
    ));
    assert!(store.ops().is_empty());
}

#[tokio::test]
async fn store_failure_during_probe_is_surfaced() {
    let store = RecordingStore::default();
    store.fail(true);
    let allocator = SlotAllocator::new(store, config());
    assert!(matches!(
        allocator.allocate().await,
        Err(SlotError::Store(StoreError::Unavailable { .. }))
    ));
    assert_eq!(allocator.state(), SlotState::Unallocated);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_keeps_the_lease_alive() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::with_owner(store.clone(), config(), "me".into());
    allocator.allocate().await.unwrap();

    tokio::time::sleep(TTL * 6).await;

    assert_eq!(allocator.state(), SlotState::Allocated { slot: 0 });
    assert_eq!(store.get("ns:slot:0").await.unwrap().as_deref(), Some("me"));
    assert!(store.ttl("ns:slot:0").unwrap().unwrap() > TTL - INTERVAL - Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn heartbeat_renews_through_the_store() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    store.clear();

    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;

    assert_eq!(
        store.ops(),
        [Op::Get("ns:slot:0".to_owned()), expire("ns:slot:0")]
    );
}

#[tokio::test(start_paused = true)]
async fn stopped_heartbeat_lets_the_lease_expire() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    allocator.stop_heartbeat().await;

    tokio::time::sleep(TTL + Duration::from_secs(1)).await;
    assert_eq!(store.get("ns:slot:0").await.unwrap(), None);

    // Still believed held until a renewal notices.
    assert_eq!(allocator.current_slot(), Some(0));
    assert_eq!(
        allocator.heartbeat().await,
        Err(SlotError::RenewalFailed {
            slot: 0,
            reason: RenewalFailure::Missing,
        })
    );
    assert_eq!(allocator.state(), SlotState::Lost { slot: 0 });
    assert_eq!(allocator.current_slot(), None);
}

#[tokio::test(start_paused = true)]
async fn owner_mismatch_marks_the_lease_lost() {
    let store = MemoryStore::new();
    let allocator = Arc::new(SlotAllocator::with_owner(store.clone(), config(), "me".into()));
    allocator.allocate().await.unwrap();
    let encoder = IdEncoder::new(Arc::clone(&allocator), SystemClock);
    assert!(encoder.generate().is_ok());

    store.put("ns:slot:0", "intruder").unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;

    assert_eq!(allocator.state(), SlotState::Lost { slot: 0 });
    assert_eq!(encoder.generate(), Err(GenerateError::SlotUnavailable));

    // No automatic recovery.
    tokio::time::sleep(TTL * 3).await;
    assert_eq!(allocator.state(), SlotState::Lost { slot: 0 });
    assert_eq!(
        store.get("ns:slot:0").await.unwrap().as_deref(),
        Some("intruder")
    );
}

#[tokio::test]
async fn store_error_during_renewal_marks_the_lease_lost() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();

    store.fail(true);
    let err = allocator.heartbeat().await.unwrap_err();
    assert!(matches!(
        err,
        SlotError::RenewalFailed {
            slot: 0,
            reason: RenewalFailure::Store(StoreError::Unavailable { .. }),
        }
    ));
    assert_eq!(allocator.state(), SlotState::Lost { slot: 0 });
    assert_eq!(allocator.heartbeat().await, Err(SlotError::NotAllocated));
}

#[tokio::test]
async fn deleted_key_is_detected_by_renewal() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    store.delete("ns:slot:0").await.unwrap();

    assert!(matches!(
        allocator.heartbeat().await,
        Err(SlotError::RenewalFailed {
            reason: RenewalFailure::Missing,
            ..
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn lost_lease_can_be_reallocated_explicitly() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    store.put("ns:slot:0", "intruder").unwrap();
    assert!(allocator.heartbeat().await.is_err());

    assert_eq!(allocator.allocate().await, Ok(1));
    assert_eq!(allocator.state(), SlotState::Allocated { slot: 1 });

    // The new lease is renewed by a fresh heartbeat.
    tokio::time::sleep(TTL * 2).await;
    assert_eq!(allocator.state(), SlotState::Allocated { slot: 1 });
}

#[tokio::test(start_paused = true)]
async fn reallocate_on_loss_claims_the_next_free_slot() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::with_owner(
        store.clone(),
        config().with_reallocate_on_loss(true),
        "me".into(),
    );
    allocator.allocate().await.unwrap();
    store.put("ns:slot:0", "intruder").unwrap();

    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;

    assert_eq!(allocator.state(), SlotState::Allocated { slot: 1 });
    assert_eq!(store.get("ns:slot:1").await.unwrap().as_deref(), Some("me"));
    assert_eq!(
        store.get("ns:slot:0").await.unwrap().as_deref(),
        Some("intruder")
    );
}

#[tokio::test(start_paused = true)]
async fn reallocate_on_loss_retries_until_a_slot_frees_up() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::with_owner(
        store.clone(),
        config().with_slot_count(3).with_reallocate_on_loss(true),
        "me".into(),
    );
    assert_eq!(allocator.allocate().await, Ok(0));
    store.put("ns:slot:1", "other-a").unwrap();
    store.put("ns:slot:2", "other-b").unwrap();
    store.put("ns:slot:0", "intruder").unwrap();

    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
    assert_eq!(allocator.state(), SlotState::Lost { slot: 0 });
    assert_eq!(allocator.current_slot(), None);

    store.delete("ns:slot:2").await.unwrap();
    tokio::time::sleep(INTERVAL).await;

    assert_eq!(allocator.state(), SlotState::Allocated { slot: 2 });
    assert_eq!(store.get("ns:slot:2").await.unwrap().as_deref(), Some("me"));
    assert!(store.ttl("ns:slot:2").unwrap().is_some());
}

#[tokio::test]
async fn release_deletes_own_key() {
    let store = RecordingStore::default();
    let allocator = Arc::new(SlotAllocator::new(store.clone(), config()));
    allocator.allocate().await.unwrap();
    let encoder = IdEncoder::new(Arc::clone(&allocator), SystemClock);
    store.clear();

    assert_eq!(
        allocator.release().await,
        Ok(ReleaseOutcome::Released { slot: 0 })
    );
    assert_eq!(
        store.ops(),
        [
            Op::Get("ns:slot:0".to_owned()),
            Op::Delete("ns:slot:0".to_owned())
        ]
    );
    assert!(store.inner.is_empty().unwrap());
    assert_eq!(allocator.state(), SlotState::Released);
    assert_eq!(encoder.generate(), Err(GenerateError::SlotUnavailable));
}

#[tokio::test]
async fn release_never_deletes_another_owners_key() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::with_owner(store.clone(), config(), "me".into());
    allocator.allocate().await.unwrap();
    store.inner.put("ns:slot:0", "other").unwrap();
    store.clear();

    assert_eq!(
        allocator.release().await,
        Ok(ReleaseOutcome::NotOwned {
            slot: 0,
            owner: Some("other".to_owned()),
        })
    );
    assert!(!store.ops().iter().any(|op| matches!(op, Op::Delete(_))));
    assert_eq!(
        store.inner.get("ns:slot:0").await.unwrap().as_deref(),
        Some("other")
    );
}

#[tokio::test(start_paused = true)]
async fn stale_instance_does_not_release_the_new_owner() {
    let store = MemoryStore::new();
    let stale = SlotAllocator::with_owner(store.clone(), config(), "stale".into());
    stale.allocate().await.unwrap();
    stale.stop_heartbeat().await;

    tokio::time::sleep(TTL + Duration::from_secs(1)).await;

    let fresh = SlotAllocator::with_owner(store.clone(), config(), "fresh".into());
    assert_eq!(fresh.allocate().await, Ok(0));

    assert_eq!(
        stale.release().await,
        Ok(ReleaseOutcome::NotOwned {
            slot: 0,
            owner: Some("fresh".to_owned()),
        })
    );
    assert_eq!(fresh.current_slot(), Some(0));
    assert_eq!(store.get("ns:slot:0").await.unwrap().as_deref(), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn no_renewal_after_release() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    allocator.release().await.unwrap();
    store.clear();

    tokio::time::sleep(TTL * 3).await;
    assert!(store.ops().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_allocator_stops_renewal() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config());
    allocator.allocate().await.unwrap();
    drop(allocator);
    store.clear();

    tokio::time::sleep(TTL * 3).await;
    assert!(store.ops().is_empty());
    assert!(store.inner.is_empty().unwrap());
}

#[tokio::test(start_paused = true)]
async fn abandoned_stop_aborts_a_hung_renewal() {
    let store = HangingStore::default();
    let allocator = SlotAllocator::new(
        store.clone(),
        config().with_shutdown_grace(Duration::from_secs(60)),
    );
    allocator.allocate().await.unwrap();

    // The first renewal is now stuck in `get`.
    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;
    assert!(!store.dropped.load(Ordering::SeqCst));

    let stopped = tokio::time::timeout(Duration::from_secs(1), allocator.stop_heartbeat()).await;
    assert!(stopped.is_err());

    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(store.dropped.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn hung_renewal_is_aborted_after_the_grace_period() {
    let store = HangingStore::default();
    let allocator = SlotAllocator::new(
        store.clone(),
        config().with_shutdown_grace(Duration::from_secs(1)),
    );
    allocator.allocate().await.unwrap();
    tokio::time::sleep(INTERVAL + Duration::from_millis(10)).await;

    allocator.stop_heartbeat().await;
    assert!(store.dropped.load(Ordering::SeqCst));
}

#[tokio::test]
async fn lifecycle_misuse_is_rejected() {
    let store = MemoryStore::new();
    let allocator = SlotAllocator::new(store, config());
    assert_eq!(allocator.heartbeat().await, Err(SlotError::NotAllocated));

    allocator.allocate().await.unwrap();
    assert_eq!(
        allocator.allocate().await,
        Err(SlotError::AlreadyAllocated { slot: 0 })
    );

    allocator.release().await.unwrap();
    assert_eq!(allocator.release().await, Ok(ReleaseOutcome::NotHeld));
    assert_eq!(allocator.allocate().await, Err(SlotError::Released));
    assert_eq!(allocator.heartbeat().await, Err(SlotError::Released));
}

#[tokio::test]
async fn release_before_allocate_holds_nothing() {
    let store = RecordingStore::default();
    let allocator = SlotAllocator::new(store.clone(), config());
    assert_eq!(allocator.release().await, Ok(ReleaseOutcome::NotHeld));
    assert!(store.ops().is_empty());
    assert_eq!(allocator.state(), SlotState::Released);
}

#[tokio::test]
async fn random_start_finds_the_only_free_slot() {
    for _ in 0..16 {
        let store = MemoryStore::new();
        for slot in (0..8).filter(|&slot| slot != 5) {
            store.put(&format!("ns:slot:{slot}"), "other").unwrap();
        }
        let allocator = SlotAllocator::new(
            store,
            config()
                .with_slot_count(8)
                .with_probe_order(ProbeOrder::RandomStart),
        );
        assert_eq!(allocator.allocate().await, Ok(5));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_instances_get_distinct_slots() {
    let store = MemoryStore::new();
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let order = if i % 2 == 0 {
                ProbeOrder::Ascending
            } else {
                ProbeOrder::RandomStart
            };
            let allocator = SlotAllocator::new(
                store.clone(),
                config().with_slot_count(32).with_probe_order(order),
            );
            tokio::spawn(async move {
                let slot = allocator.allocate().await.unwrap();
                (slot, allocator)
            })
        })
        .collect();

    let mut slots = HashSet::new();
    let mut owners = HashSet::new();
    let mut allocators = Vec::new();
    for handle in handles {
        let (slot, allocator) = handle.await.unwrap();
        assert!(slots.insert(slot), "slot {slot} handed out twice");
        assert!(owners.insert(allocator.owner().clone()));
        allocators.push(allocator);
    }
    assert_eq!(store.len().unwrap(), 16);

    for allocator in &allocators {
        assert!(matches!(
            allocator.release().await,
            Ok(ReleaseOutcome::Released { .. })
        ));
    }
    assert!(store.is_empty().unwrap());
}

#[tokio::test]
async fn encoder_stamps_the_leased_slot() {
    let store = MemoryStore::new();
    store.put("ns:slot:0", "other").unwrap();
    let allocator = Arc::new(SlotAllocator::new(store, config()));
    let slot = allocator.allocate().await.unwrap();
    assert_eq!(slot, 1);

    let encoder = IdEncoder::new(Arc::clone(&allocator), SystemClock);
    let mut last = None;
    for _ in 0..1_000 {
        let id = encoder.generate().unwrap();
        assert_eq!(encoder.decode(id.to_raw()).slot, slot);
        assert!(last < Some(id));
        last = Some(id);
    }
}

#[test]
fn owner_ids_are_per_allocator() {
    let a = SlotAllocator::new(MemoryStore::new(), config());
    let b = SlotAllocator::new(MemoryStore::new(), config());
    assert_ne!(a.owner(), b.owner());
    let c = SlotAllocator::with_owner(MemoryStore::new(), config(), OwnerId::from("fixed"));
    assert_eq!(c.owner().as_str(), "fixed");
}
