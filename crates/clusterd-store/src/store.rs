//! The store contract and its in-process reference implementation.

use crate::config::ClusterConfig;
use crate::error::StoreError;
use crate::types::{OpNumber, ReplicaId, ViewNumber};
use crate::watch::{self, WatchEvent, WatchStream};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use tracing::{debug, warn};

/// A read/write handle into one consistent snapshot of the store,
/// passed into the closure given to [`Store::transaction`].
pub struct Txn<'a> {
    snapshot: &'a BTreeMap<String, Vec<u8>>,
    writes: BTreeMap<String, Option<Vec<u8>>>,
}

impl<'a> Txn<'a> {
    fn new(snapshot: &'a BTreeMap<String, Vec<u8>>) -> Self {
        Self {
            snapshot,
            writes: BTreeMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        if let Some(pending) = self.writes.get(key) {
            return pending.clone();
        }
        self.snapshot.get(key).cloned()
    }

    pub fn scan_prefix(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let mut merged: BTreeMap<String, Option<Vec<u8>>> = self
            .snapshot
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        for (k, v) in self.writes.range(prefix.to_string()..) {
            if !k.starts_with(prefix) {
                continue;
            }
            merged.insert(k.clone(), v.clone());
        }
        merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect()
    }

    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.writes.insert(key.into(), Some(value));
    }

    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), None);
    }
}

/// Replicated key/value store used to hold all durable cluster state.
///
/// Every write is linearized through whichever replica currently holds
/// leadership; reads against a follower succeed from that follower's
/// last applied snapshot, which may lag the leader.
pub trait Store: Send + Sync {
    /// Type-erased form of [`Store::transaction`], kept object-safe so
    /// that `Store` can be used as `dyn Store`. Call [`StoreExt::transaction`]
    /// instead of this directly.
    fn transaction_dyn(
        &self,
        f: Box<dyn FnOnce(&mut Txn) -> Result<Box<dyn Any>, StoreError> + '_>,
    ) -> Result<Box<dyn Any>, StoreError>;

    /// Subscribes to committed writes to keys under `prefix`, replaying
    /// nothing at or before `from_index`.
    fn watch(&self, prefix: &str, from_index: OpNumber) -> WatchStream;

    /// Idempotently advances the store's on-disk schema to
    /// `target_version` under a cluster-wide lock held in the store
    /// itself. Returns immediately if already at or past that version.
    fn schema_upgrade(&self, target_version: u32) -> Result<(), StoreError>;

    fn current_view(&self) -> ViewNumber;

    fn last_committed(&self) -> OpNumber;

    /// Called by the membership manager once it has determined this
    /// replica should become leader for `view`. A stale view (at or
    /// below the current one) is ignored, so a lagging replica cannot
    /// seize leadership back.
    fn assume_leadership(&self, view: ViewNumber);
}

/// Ergonomic, generic front-end for [`Store::transaction_dyn`], usable
/// through `dyn Store` because it is implemented for every `Store`
/// (including the unsized `dyn Store` itself) rather than being a
/// dyn-incompatible method on the trait itself.
pub trait StoreExt: Store {
    /// Runs `f` against a consistent snapshot and, if `f` returns `Ok`,
    /// commits its writes to a majority of the configured replicas
    /// before returning. No partial application is ever observed by
    /// another transaction or by a watcher.
    fn transaction<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Txn) -> Result<T, StoreError>,
        T: 'static,
    {
        let boxed = self.transaction_dyn(Box::new(move |txn| {
            f(txn).map(|value| Box::new(value) as Box<dyn Any>)
        }))?;
        Ok(*boxed
            .downcast::<T>()
            .expect("transaction_dyn returns exactly the value produced by the closure"))
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

struct Inner {
    data: BTreeMap<String, Vec<u8>>,
    next_index: OpNumber,
    watchers: Vec<watch::WatchSender>,
    schema_version: u32,
}

/// Single-process reference implementation: one voter, always leader,
/// always has quorum with itself. Suitable for tests and for a
/// single-member cluster; the membership manager substitutes a
/// networked implementation once peers are added, without the rest of
/// the control plane noticing the difference.
pub struct InMemoryStore {
    replica: ReplicaId,
    config: RwLock<ClusterConfig>,
    view: RwLock<ViewNumber>,
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new(replica: ReplicaId) -> Self {
        Self {
            replica,
            config: RwLock::new(ClusterConfig::new([replica])),
            view: RwLock::new(ViewNumber::default()),
            inner: Mutex::new(Inner {
                data: BTreeMap::new(),
                next_index: OpNumber::ZERO,
                watchers: Vec::new(),
                schema_version: 0,
            }),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.replica
    }

    pub fn cluster_config(&self) -> ClusterConfig {
        self.config.read().expect("cluster config lock poisoned").clone()
    }

    pub fn set_cluster_config(&self, config: ClusterConfig) {
        *self.config.write().expect("cluster config lock poisoned") = config;
    }
}

impl Store for InMemoryStore {
    fn transaction_dyn(
        &self,
        f: Box<dyn FnOnce(&mut Txn) -> Result<Box<dyn Any>, StoreError> + '_>,
    ) -> Result<Box<dyn Any>, StoreError> {
        let config = self.cluster_config();
        if !config.has_quorum([self.replica]) {
            return Err(StoreError::NoQuorum);
        }

        let mut inner = self.inner.lock().expect("store lock poisoned");
        let mut txn = Txn::new(&inner.data);
        let result = f(&mut txn)?;
        let writes = txn.writes;

        let mut events = Vec::with_capacity(writes.len());
        for (key, value) in writes {
            let index = inner.next_index.next();
            inner.next_index = index;
            match &value {
                Some(v) => {
                    inner.data.insert(key.clone(), v.clone());
                }
                None => {
                    inner.data.remove(&key);
                }
            }
            events.push(WatchEvent { key, value, index });
        }

        inner.watchers.retain(|w| {
            let mut alive = true;
            for event in &events {
                if w.matches(&event.key) && !w.notify(event.clone()) {
                    alive = false;
                    break;
                }
            }
            alive
        });

        Ok(result)
    }

    fn watch(&self, prefix: &str, from_index: OpNumber) -> WatchStream {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let (sender, stream) = watch::channel(prefix.to_string());
        for (key, value) in inner.data.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if inner.next_index > from_index {
                let _ = sender.notify(WatchEvent {
                    key: key.clone(),
                    value: Some(value.clone()),
                    index: inner.next_index,
                });
            }
        }
        inner.watchers.push(sender);
        stream
    }

    fn schema_upgrade(&self, target_version: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        if inner.schema_version >= target_version {
            return Ok(());
        }
        warn!(from = inner.schema_version, to = target_version, "running schema upgrade");
        inner.schema_version = target_version;
        Ok(())
    }

    fn current_view(&self) -> ViewNumber {
        *self.view.read().expect("view lock poisoned")
    }

    fn last_committed(&self) -> OpNumber {
        self.inner.lock().expect("store lock poisoned").next_index
    }

    fn assume_leadership(&self, view: ViewNumber) {
        let mut current = self.view.write().expect("view lock poisoned");
        if view > *current {
            debug!(replica = %self.replica, %view, "assuming leadership");
            *current = view;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_applies_writes_atomically() {
        let store = InMemoryStore::new(ReplicaId(1));
        store
            .transaction(|txn| {
                txn.put("members/1", b"alice".to_vec());
                txn.put("members/2", b"bob".to_vec());
                Ok(())
            })
            .unwrap();

        let seen = store
            .transaction(|txn| Ok(txn.scan_prefix("members/")))
            .unwrap();
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn failed_closure_discards_writes() {
        let store = InMemoryStore::new(ReplicaId(1));
        let result: Result<(), StoreError> = store.transaction(|txn| {
            txn.put("x", b"1".to_vec());
            Err(StoreError::Conflict("precondition failed".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.transaction(|txn| Ok(txn.get("x"))).unwrap(), None);
    }

    #[test]
    fn watch_delivers_subsequent_writes() {
        let store = InMemoryStore::new(ReplicaId(1));
        let stream = store.watch("members/", OpNumber::ZERO);
        store
            .transaction(|txn| {
                txn.put("members/1", b"alice".to_vec());
                Ok(())
            })
            .unwrap();
        let event = stream.next().expect("expected an event");
        assert_eq!(event.key, "members/1");
        assert_eq!(event.value, Some(b"alice".to_vec()));
    }

    #[test]
    fn watch_ignores_keys_outside_prefix() {
        let store = InMemoryStore::new(ReplicaId(1));
        let stream = store.watch("members/", OpNumber::ZERO);
        store
            .transaction(|txn| {
                txn.put("projects/default", b"{}".to_vec());
                Ok(())
            })
            .unwrap();
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn no_quorum_blocks_transactions() {
        let store = InMemoryStore::new(ReplicaId(1));
        store.set_cluster_config(ClusterConfig::new([ReplicaId(1), ReplicaId(2), ReplicaId(3)]));
        let result: Result<(), StoreError> = store.transaction(|_| Ok(()));
        assert!(matches!(result, Err(StoreError::NoQuorum)));
    }

    #[test]
    fn schema_upgrade_is_idempotent() {
        let store = InMemoryStore::new(ReplicaId(1));
        store.schema_upgrade(3).unwrap();
        store.schema_upgrade(3).unwrap();
        store.schema_upgrade(2).unwrap();
    }

    proptest::proptest! {
        #[test]
        fn scan_prefix_returns_exactly_the_matching_keys(
            keys in proptest::collection::btree_set("[a-z]{1,6}/[a-z]{1,6}", 0..24),
            prefix in "[a-z]{1,3}",
        ) {
            let store = InMemoryStore::new(ReplicaId(1));
            store
                .transaction(|txn| {
                    for key in &keys {
                        txn.put(key.clone(), key.as_bytes().to_vec());
                    }
                    Ok(())
                })
                .unwrap();

            let scanned = store.transaction(|txn| Ok(txn.scan_prefix(&prefix))).unwrap();
            let expected: Vec<&String> = keys.iter().filter(|k| k.starts_with(&prefix)).collect();
            proptest::prop_assert_eq!(scanned.len(), expected.len());
            for (key, value) in &scanned {
                proptest::prop_assert!(key.starts_with(&prefix));
                proptest::prop_assert_eq!(value.as_slice(), key.as_bytes());
            }
        }
    }
}
