//! state-sync — reconciles an in-memory value with one persisted storage slot.
//!
//! Purpose
//! - Wrap a single storage key as typed application state: reads return the
//!   current value, writes go slot-first so the persisted representation is
//!   never behind the in-memory one.
//! - Propagate changes made by *other* contexts (processes, tabs, workers
//!   sharing the same store) back into the in-memory value through a
//!   change-notification hub, without re-applying self-originated writes.
//!
//! Design
//! - `SlotStore` is the storage port: one key, one serialized value, no
//!   partial-key schema. The store handle is injected explicitly; nothing in
//!   this crate reaches for globals.
//! - `ChangeHub` is a generic subscription abstraction over a broadcast
//!   channel: `subscribe(key)` returns a feed of changes to that key, and
//!   dropping the feed unsubscribes.
//! - Conflict policy is last-write-wins at the storage layer; the hub only
//!   tells a context that it lost the race sooner.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Pending notices buffered per subscriber before the feed overflows.
const HUB_CAPACITY: usize = 64;

/// Errors from the storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by synchronizer operations.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Storage port: a flat keyspace of serialized slots.
pub trait SlotStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-memory slot store. Share one instance (behind an `Arc`) between
/// several `SyncedState` handles to model contexts over a common origin.
pub struct MemorySlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemorySlotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotStore for MemorySlotStore {
    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))?;
        Ok(slots.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StoreError::Backend("mutex poisoned".into()))?;
        slots.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Identifies the originating synchronizer of a change notice, so contexts
/// can skip their own writes.
pub type WriterId = u64;

static NEXT_WRITER: AtomicU64 = AtomicU64::new(1);

fn next_writer_id() -> WriterId {
    NEXT_WRITER.fetch_add(1, Ordering::Relaxed)
}

/// One observed change: the key, the new serialized value, and who wrote it.
#[derive(Clone, Debug)]
pub struct ChangeNotice {
    pub key: String,
    pub value: String,
    pub writer: WriterId,
}

/// Broadcast hub for cross-context change notices. Clone freely; clones
/// share the same channel.
#[derive(Clone)]
pub struct ChangeHub {
    tx: broadcast::Sender<ChangeNotice>,
}

impl ChangeHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(HUB_CAPACITY);
        Self { tx }
    }

    /// Subscribe to changes of one key. Dropping the returned feed
    /// unsubscribes.
    pub fn subscribe(&self, key: impl Into<String>) -> ChangeFeed {
        ChangeFeed {
            key: key.into(),
            rx: self.tx.subscribe(),
        }
    }

    /// Publish a change notice. A hub with no subscribers swallows the
    /// notice, which is the correct behavior for a lone context.
    pub fn publish(&self, notice: ChangeNotice) {
        let _ = self.tx.send(notice);
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A scoped subscription to changes of a single key.
pub struct ChangeFeed {
    key: String,
    rx: broadcast::Receiver<ChangeNotice>,
}

impl ChangeFeed {
    /// Pull all pending notices for the watched key. The boolean is true
    /// when the feed lagged and notices were lost, in which case the slot
    /// itself must be consulted.
    pub fn drain(&mut self) -> (Vec<ChangeNotice>, bool) {
        let mut notices = Vec::new();
        let mut overflowed = false;
        loop {
            match self.rx.try_recv() {
                Ok(n) if n.key == self.key => notices.push(n),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => overflowed = true,
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        (notices, overflowed)
    }
}

/// Typed view over one storage slot, kept consistent with the slot and with
/// changes arriving from other contexts.
///
/// Updates are slot-first: serialize, write through the store, then replace
/// the in-memory value, then notify the hub. Foreign notices are reconciled
/// at every read and before every update.
pub struct SyncedState<T> {
    key: String,
    initial: T,
    store: Arc<dyn SlotStore>,
    hub: ChangeHub,
    feed: Mutex<ChangeFeed>,
    current: RwLock<T>,
    writer: WriterId,
}

impl<T> SyncedState<T>
where
    T: Serialize + DeserializeOwned + Clone,
{
    /// Bind a slot to a typed value. An absent or unparsable slot is seeded
    /// with `initial`, which then becomes the current value.
    pub fn new(
        store: Arc<dyn SlotStore>,
        hub: ChangeHub,
        key: impl Into<String>,
        initial: T,
    ) -> Result<Self, SyncError> {
        let key = key.into();
        // Subscribe before the first read so nothing slips between them.
        let feed = hub.subscribe(&key);

        let current = match store.read(&key)? {
            Some(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!(key = %key, error = %err, "unparsable slot content, reseeding");
                    Self::seed(store.as_ref(), &key, &initial)?;
                    initial.clone()
                }
            },
            None => {
                Self::seed(store.as_ref(), &key, &initial)?;
                initial.clone()
            }
        };

        Ok(Self {
            key,
            initial,
            store,
            hub,
            feed: Mutex::new(feed),
            current: RwLock::new(current),
            writer: next_writer_id(),
        })
    }

    fn seed(store: &dyn SlotStore, key: &str, initial: &T) -> Result<(), SyncError> {
        let raw = serde_json::to_string(initial)?;
        store.write(key, &raw)?;
        Ok(())
    }

    /// The watched storage key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// This synchronizer's writer identity, as tagged onto its notices.
    pub fn writer_id(&self) -> WriterId {
        self.writer
    }

    /// Current value, after reconciling pending foreign changes.
    pub fn read(&self) -> T {
        let mut feed = self.feed.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        self.apply_foreign(&mut feed, &mut current);
        current.clone()
    }

    /// Replace the value outright.
    pub fn set(&self, value: T) -> Result<T, SyncError> {
        self.update(move |_| value)
    }

    /// Compute a new value from the old one and commit it: slot write first,
    /// then the in-memory value, then a self-tagged notice to the hub.
    /// Returns the committed value.
    pub fn update<F>(&self, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&T) -> T,
    {
        let mut feed = self.feed.lock().unwrap_or_else(|e| e.into_inner());
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        self.apply_foreign(&mut feed, &mut current);

        let new = f(&current);
        let raw = serde_json::to_string(&new)?;
        self.store.write(&self.key, &raw)?;
        *current = new.clone();
        self.hub.publish(ChangeNotice {
            key: self.key.clone(),
            value: raw,
            writer: self.writer,
        });
        Ok(new)
    }

    /// Apply pending foreign notices to `current`. The newest foreign notice
    /// wins; self-originated notices are already reflected and are skipped.
    /// An overflowed feed falls back to re-reading the slot, which is always
    /// at least as new as anything the feed dropped.
    fn apply_foreign(&self, feed: &mut ChangeFeed, current: &mut T) {
        let (notices, overflowed) = feed.drain();
        if overflowed {
            match self.store.read(&self.key) {
                Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                    Ok(value) => *current = value,
                    Err(err) => {
                        warn!(key = %self.key, error = %err, "unparsable slot after feed overflow, keeping current value");
                    }
                },
                Ok(None) => {}
                Err(err) => {
                    warn!(key = %self.key, error = %err, "slot re-read failed after feed overflow");
                }
            }
            return;
        }

        let Some(latest) = notices.iter().rev().find(|n| n.writer != self.writer) else {
            return;
        };
        match serde_json::from_str::<T>(&latest.value) {
            Ok(value) => {
                debug!(key = %self.key, writer = latest.writer, "applied foreign change");
                *current = value;
            }
            Err(err) => {
                warn!(key = %self.key, error = %err, "ignoring unparsable change notice");
            }
        }
    }

    /// The fallback value used when the slot is absent or corrupt.
    pub fn initial(&self) -> &T {
        &self.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    struct Counter {
        count: u64,
    }

    fn setup() -> (Arc<MemorySlotStore>, ChangeHub) {
        (Arc::new(MemorySlotStore::new()), ChangeHub::new())
    }

    #[test]
    fn absent_slot_is_seeded_with_initial() {
        let (store, hub) = setup();
        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub,
            "counter",
            Counter { count: 7 },
        )
        .expect("bound");
        assert_eq!(state.read(), Counter { count: 7 });

        let raw = store.read("counter").expect("read").expect("seeded");
        let persisted: Counter = serde_json::from_str(&raw).expect("parseable");
        assert_eq!(persisted, Counter { count: 7 });
    }

    #[test]
    fn update_commits_slot_and_memory_together() {
        let (store, hub) = setup();
        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub,
            "counter",
            Counter { count: 0 },
        )
        .expect("bound");

        let committed = state.update(|c| Counter { count: c.count + 1 }).expect("updated");
        assert_eq!(committed, Counter { count: 1 });
        assert_eq!(state.read(), Counter { count: 1 });

        // Read-after-write consistency: slot content matches memory
        let raw = store.read("counter").expect("read").expect("present");
        let persisted: Counter = serde_json::from_str(&raw).expect("parseable");
        assert_eq!(persisted, state.read());
    }

    #[test]
    fn foreign_change_is_reflected_without_local_update() {
        let (store, hub) = setup();
        let a = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound a");
        let b = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound b");

        a.set(Counter { count: 42 }).expect("set");
        assert_eq!(b.read(), Counter { count: 42 });
    }

    #[test]
    fn later_foreign_notice_wins_over_self_notice() {
        let (store, hub) = setup();
        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound");

        state.set(Counter { count: 1 }).expect("set");
        // A later foreign notice must win over the earlier self notice
        hub.publish(ChangeNotice {
            key: "counter".to_string(),
            value: serde_json::to_string(&Counter { count: 9 }).expect("serialize"),
            writer: state.writer_id() + 1000,
        });
        assert_eq!(state.read(), Counter { count: 9 });
    }

    #[test]
    fn notices_for_other_keys_are_ignored() {
        let (store, hub) = setup();
        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 5 },
        )
        .expect("bound");

        hub.publish(ChangeNotice {
            key: "other".to_string(),
            value: serde_json::to_string(&Counter { count: 99 }).expect("serialize"),
            writer: 12345,
        });
        assert_eq!(state.read(), Counter { count: 5 });
    }

    #[test]
    fn corrupt_slot_falls_back_to_initial_and_reseeds() {
        let (store, hub) = setup();
        store.write("counter", "definitely not json").expect("written");

        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub,
            "counter",
            Counter { count: 3 },
        )
        .expect("bound");
        assert_eq!(state.read(), Counter { count: 3 });

        let raw = store.read("counter").expect("read").expect("present");
        assert_eq!(
            serde_json::from_str::<Counter>(&raw).expect("reseeded"),
            Counter { count: 3 }
        );
    }

    #[test]
    fn corrupt_foreign_notice_is_skipped() {
        let (store, hub) = setup();
        let state = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 5 },
        )
        .expect("bound");

        hub.publish(ChangeNotice {
            key: "counter".to_string(),
            value: "garbage".to_string(),
            writer: 12345,
        });
        assert_eq!(state.read(), Counter { count: 5 });
    }

    #[test]
    fn overflowed_feed_recovers_from_slot() {
        let (store, hub) = setup();
        let a = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound a");
        let b = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound b");

        // Push well past the hub capacity without letting b drain
        for i in 1..=200u64 {
            a.set(Counter { count: i }).expect("set");
        }
        assert_eq!(b.read(), Counter { count: 200 });
    }

    #[test]
    fn last_foreign_write_wins() {
        let (store, hub) = setup();
        let a = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound a");
        let b = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound b");
        let observer = SyncedState::new(
            store.clone() as Arc<dyn SlotStore>,
            hub.clone(),
            "counter",
            Counter { count: 0 },
        )
        .expect("bound observer");

        a.set(Counter { count: 1 }).expect("set");
        b.set(Counter { count: 2 }).expect("set");
        assert_eq!(observer.read(), Counter { count: 2 });
    }
}
