/// In-memory collection cache.
///
/// Holds the last known snapshot per key with:
/// - wholesale replacement (snapshots are never partially mutated in place)
/// - a per-key generation, bumped by every write and cancellation, so a
///   background refresh that started before a newer write is discarded
/// - stale-while-revalidate: an invalidated snapshot stays readable until
///   its refresh lands
/// - broadcast notifications for subscribers
///
/// The store performs no I/O; refreshes are driven by the revalidator.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use super::{CacheEvent, CacheKey, ContentFingerprint, Snapshot};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Entry {
    snapshot: Option<Snapshot>,
    fingerprint: Option<ContentFingerprint>,
    generation: u64,
    stale: bool,
}

/// Proof that a refresh was requested at a particular generation.
/// Only a ticket whose generation is still current may write its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTicket {
    pub key: CacheKey,
    pub generation: u64,
}

pub struct CacheStore {
    entries: Mutex<HashMap<CacheKey, Entry>>,
    /// Global generation counter (monotonic, shared across keys)
    next_generation: AtomicU64,
    event_tx: broadcast::Sender<CacheEvent>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            event_tx,
        }
    }

    fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, event: CacheEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.event_tx.subscribe()
    }

    /// Current snapshot, or `None` if the key was never fetched.
    pub fn read(&self, key: &CacheKey) -> Option<Snapshot> {
        self.entries().get(key).and_then(|e| e.snapshot.clone())
    }

    pub fn is_known(&self, key: &CacheKey) -> bool {
        self.entries()
            .get(key)
            .is_some_and(|e| e.snapshot.is_some())
    }

    /// Whether the key has been invalidated and not yet refreshed.
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.entries().get(key).is_some_and(|e| e.stale)
    }

    pub fn generation(&self, key: &CacheKey) -> Option<u64> {
        self.entries().get(key).map(|e| e.generation)
    }

    /// Keys that hold a snapshot.
    pub fn keys(&self) -> Vec<CacheKey> {
        let mut keys: Vec<CacheKey> = self
            .entries()
            .iter()
            .filter(|(_, e)| e.snapshot.is_some())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Overwrite the snapshot for `key` and notify subscribers.
    /// Also supersedes any refresh still in flight for the key.
    pub fn replace(&self, key: &CacheKey, snapshot: Snapshot) {
        let generation = self.next_generation();
        let fingerprint = ContentFingerprint::of(&snapshot);
        let changed = {
            let mut entries = self.entries();
            let entry = entries.entry(key.clone()).or_default();
            let changed = entry.fingerprint.as_ref() != Some(&fingerprint);
            entry.snapshot = Some(snapshot);
            entry.fingerprint = Some(fingerprint);
            entry.generation = generation;
            entry.stale = false;
            changed
        };
        if changed {
            log::debug!(target: "modulo.cache", "replaced {}", key);
            self.notify(CacheEvent::Replaced { key: key.clone() });
        }
    }

    /// Supersede any pending refresh for `key`. The refresh keeps running,
    /// its result is simply dropped when it arrives.
    pub fn cancel_in_flight(&self, key: &CacheKey) {
        let generation = self.next_generation();
        if let Some(entry) = self.entries().get_mut(key) {
            entry.generation = generation;
        }
    }

    /// Mark `key` stale and hand out the ticket its refresh must present.
    /// The stale snapshot stays readable in the meantime.
    pub fn invalidate(&self, key: &CacheKey) -> RefreshTicket {
        let generation = self.next_generation();
        {
            let mut entries = self.entries();
            let entry = entries.entry(key.clone()).or_default();
            entry.generation = generation;
            entry.stale = true;
        }
        self.notify(CacheEvent::Invalidated { key: key.clone() });
        RefreshTicket {
            key: key.clone(),
            generation,
        }
    }

    /// Store a refresh result if its ticket is still current.
    /// Returns false when a newer write or cancellation superseded it.
    pub fn complete_refresh(&self, ticket: &RefreshTicket, snapshot: Snapshot) -> bool {
        let fingerprint = ContentFingerprint::of(&snapshot);
        let changed = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(&ticket.key) else {
                log::debug!(target: "modulo.cache", "dropping refresh for evicted {}", ticket.key);
                return false;
            };
            if entry.generation != ticket.generation {
                log::debug!(
                    target: "modulo.cache",
                    "discarding late refresh of {} (generation {} < {})",
                    ticket.key,
                    ticket.generation,
                    entry.generation
                );
                return false;
            }
            let changed = entry.fingerprint.as_ref() != Some(&fingerprint);
            entry.snapshot = Some(snapshot);
            entry.fingerprint = Some(fingerprint);
            entry.stale = false;
            changed
        };
        if changed {
            self.notify(CacheEvent::Replaced {
                key: ticket.key.clone(),
            });
        }
        true
    }

    /// Forget `key` entirely; later reads report it as unknown.
    pub fn evict(&self, key: &CacheKey) -> bool {
        let removed = self.entries().remove(key).is_some();
        if removed {
            self.notify(CacheEvent::Evicted { key: key.clone() });
        }
        removed
    }

    /// Drop every collection owned by `board_id`.
    pub fn evict_board(&self, board_id: &str) {
        for key in CacheKey::board_scoped(board_id) {
            self.evict(&key);
        }
    }

    /// Tear down: forget every key.
    pub fn clear(&self) {
        let keys: Vec<CacheKey> = self.entries().drain().map(|(k, _)| k).collect();
        for key in keys {
            self.notify(CacheEvent::Evicted { key });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{column, tag};

    fn columns_key() -> CacheKey {
        CacheKey::Columns("b1".into())
    }

    #[test]
    fn test_unknown_key_reads_none() {
        let store = CacheStore::new();
        assert_eq!(store.read(&columns_key()), None);
        assert!(!store.is_known(&columns_key()));
    }

    #[test]
    fn test_replace_and_read() {
        let store = CacheStore::new();
        let snap = Snapshot::Columns(vec![column("b1", "todo", "Todo", 0)]);
        store.replace(&columns_key(), snap.clone());
        assert_eq!(store.read(&columns_key()), Some(snap));
    }

    #[test]
    fn test_replace_notifies_subscribers() {
        let store = CacheStore::new();
        let mut rx = store.subscribe();
        store.replace(&columns_key(), Snapshot::Columns(vec![]));
        assert_eq!(
            rx.try_recv().unwrap(),
            CacheEvent::Replaced { key: columns_key() }
        );
    }

    #[test]
    fn test_identical_replace_is_silent() {
        let store = CacheStore::new();
        store.replace(&columns_key(), Snapshot::Columns(vec![]));
        let mut rx = store.subscribe();
        store.replace(&columns_key(), Snapshot::Columns(vec![]));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalidate_keeps_stale_value_visible() {
        let store = CacheStore::new();
        let snap = Snapshot::Tags(vec![tag("b1", "t1", "bug")]);
        let key = CacheKey::Tags("b1".into());
        store.replace(&key, snap.clone());

        let ticket = store.invalidate(&key);
        assert!(store.is_stale(&key));
        assert_eq!(store.read(&key), Some(snap));

        assert!(store.complete_refresh(&ticket, Snapshot::Tags(vec![])));
        assert!(!store.is_stale(&key));
        assert_eq!(store.read(&key), Some(Snapshot::Tags(vec![])));
    }

    #[test]
    fn test_cancel_discards_late_refresh() {
        let store = CacheStore::new();
        let ticket = store.invalidate(&columns_key());
        store.cancel_in_flight(&columns_key());

        assert!(!store.complete_refresh(&ticket, Snapshot::Columns(vec![])));
        assert_eq!(store.read(&columns_key()), None);
    }

    #[test]
    fn test_cancel_on_unknown_key_leaves_no_entry() {
        let store = CacheStore::new();
        store.cancel_in_flight(&columns_key());
        assert!(store.keys().is_empty());
        assert_eq!(store.generation(&columns_key()), None);

        store.invalidate(&CacheKey::Boards);
        assert!(store.keys().is_empty());
        store.replace(&columns_key(), Snapshot::Columns(vec![]));
        assert_eq!(store.keys(), vec![columns_key()]);
    }

    #[test]
    fn test_replace_supersedes_pending_refresh() {
        let store = CacheStore::new();
        let ticket = store.invalidate(&columns_key());
        let newer = Snapshot::Columns(vec![column("b1", "c1", "Doing", 0)]);
        store.replace(&columns_key(), newer.clone());

        assert!(!store.complete_refresh(&ticket, Snapshot::Columns(vec![])));
        assert_eq!(store.read(&columns_key()), Some(newer));
    }

    #[test]
    fn test_second_invalidate_wins() {
        let store = CacheStore::new();
        let first = store.invalidate(&columns_key());
        let second = store.invalidate(&columns_key());
        assert!(!store.complete_refresh(&first, Snapshot::Columns(vec![])));
        assert!(store.complete_refresh(&second, Snapshot::Columns(vec![])));
    }

    #[test]
    fn test_evict_board_cascades() {
        let store = CacheStore::new();
        store.replace(&CacheKey::Columns("b1".into()), Snapshot::Columns(vec![]));
        store.replace(&CacheKey::Cards("b1".into()), Snapshot::Cards(vec![]));
        store.replace(&CacheKey::Cards("b2".into()), Snapshot::Cards(vec![]));

        store.evict_board("b1");

        assert!(!store.is_known(&CacheKey::Columns("b1".into())));
        assert!(!store.is_known(&CacheKey::Cards("b1".into())));
        assert!(store.is_known(&CacheKey::Cards("b2".into())));
    }

    #[test]
    fn test_refresh_after_evict_is_dropped() {
        let store = CacheStore::new();
        let ticket = store.invalidate(&columns_key());
        store.evict(&columns_key());
        assert!(!store.complete_refresh(&ticket, Snapshot::Columns(vec![])));
        assert!(!store.is_known(&columns_key()));
    }

    #[test]
    fn test_clear() {
        let store = CacheStore::new();
        store.replace(&CacheKey::Boards, Snapshot::Boards(vec![]));
        store.clear();
        assert!(store.keys().is_empty());
    }
}
