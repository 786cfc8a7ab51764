//! Optimistic transactions.
//!
//! Every mutation runs the same lifecycle:
//! 1. cancel in-flight refreshes of the affected keys
//! 2. snapshot each affected key (unknown keys pass through untouched)
//! 3. write the speculative snapshot
//! 4. dispatch the remote call (the only suspension point)
//! 5. on success, optionally merge the authoritative payload
//! 6. on failure, restore every snapshot verbatim and report the rejection
//! 7. settle: schedule background refreshes of the affected keys
//!
//! A mutation is described by a [`Transaction`]; the per-entity modules
//! only build transactions and request payloads.

pub mod boards;
pub mod cards;
pub mod columns;
pub mod notes;
pub mod subtasks;
pub mod tags;

use std::future::Future;

use crate::cache::{CacheKey, Snapshot};
use crate::engine::SyncEngine;
use crate::error::EngineError;
use crate::remote::RemoteResult;

type Speculate<'a> = Box<dyn FnMut(&CacheKey, &Snapshot) -> Option<Snapshot> + Send + 'a>;
type Merge<'a, T> = Box<dyn FnMut(&CacheKey, &Snapshot, &T) -> Option<Snapshot> + Send + 'a>;

fn no_speculation(_: &CacheKey, _: &Snapshot) -> Option<Snapshot> {
    None
}

/// How a confirmed result folds back into the cache.
pub enum Reconcile<'a, T> {
    /// Keep the speculative state until the settle refresh lands.
    Keep,
    /// Merge the authoritative payload into each affected key's current
    /// snapshot. Returning `None` leaves that key alone.
    Merge(Merge<'a, T>),
}

/// One mutation: affected keys, speculative transform and reconciliation.
pub struct Transaction<'a, T> {
    operation: &'static str,
    keys: Vec<CacheKey>,
    speculate: Speculate<'a>,
    reconcile: Reconcile<'a, T>,
    settle_extra: Vec<CacheKey>,
    evict_on_success: Vec<CacheKey>,
}

impl<'a, T> Transaction<'a, T> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            keys: Vec::new(),
            speculate: Box::new(no_speculation),
            reconcile: Reconcile::Keep,
            settle_extra: Vec::new(),
            evict_on_success: Vec::new(),
        }
    }

    /// Add a key the speculative write touches.
    pub fn affects(mut self, key: CacheKey) -> Self {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
        self
    }

    /// Transform applied to every known affected key. `None` skips the key.
    pub fn speculate<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CacheKey, &Snapshot) -> Option<Snapshot> + Send + 'a,
    {
        self.speculate = Box::new(f);
        self
    }

    pub fn reconcile<F>(mut self, f: F) -> Self
    where
        F: FnMut(&CacheKey, &Snapshot, &T) -> Option<Snapshot> + Send + 'a,
    {
        self.reconcile = Reconcile::Merge(Box::new(f));
        self
    }

    /// Refresh `key` on settle without writing it speculatively.
    pub fn also_settle(mut self, key: CacheKey) -> Self {
        if !self.settle_extra.contains(&key) {
            self.settle_extra.push(key);
        }
        self
    }

    /// Drop `key` from the cache once the remote call succeeds.
    pub fn evict_on_success(mut self, key: CacheKey) -> Self {
        self.evict_on_success.push(key);
        self
    }

    fn settle_keys(&self, evicted: bool) -> Vec<CacheKey> {
        self.keys
            .iter()
            .chain(self.settle_extra.iter())
            .filter(|k| !(evicted && self.evict_on_success.contains(*k)))
            .cloned()
            .collect()
    }
}

impl SyncEngine {
    /// Run `tx` around the remote call `dispatch`.
    ///
    /// `dispatch` is not polled until every speculative write is in place.
    pub(crate) async fn execute<T, F>(
        &self,
        mut tx: Transaction<'_, T>,
        dispatch: F,
    ) -> Result<T, EngineError>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        for key in &tx.keys {
            self.store.cancel_in_flight(key);
        }

        let mut rollback: Vec<(CacheKey, Snapshot)> = Vec::with_capacity(tx.keys.len());
        for key in &tx.keys {
            match self.store.read(key) {
                Some(before) => rollback.push((key.clone(), before)),
                None => log::debug!(
                    target: "modulo.tx",
                    "{}: {} not cached, passing through",
                    tx.operation,
                    key
                ),
            }
        }

        for (key, before) in &rollback {
            if let Some(next) = (tx.speculate)(key, before) {
                log::debug!(target: "modulo.tx", "{}: speculative write to {}", tx.operation, key);
                self.store.replace(key, next);
            }
        }

        match dispatch.await {
            Ok(value) => {
                if let Reconcile::Merge(merge) = &mut tx.reconcile {
                    for key in &tx.keys {
                        let Some(current) = self.store.read(key) else {
                            continue;
                        };
                        if let Some(merged) = merge(key, &current, &value) {
                            self.store.replace(key, merged);
                        }
                    }
                }
                for key in &tx.evict_on_success {
                    self.store.evict(key);
                }
                log::info!(target: "modulo.tx", "{} confirmed", tx.operation);
                self.settle(tx.operation, &tx.settle_keys(true));
                Ok(value)
            }
            Err(source) => {
                for (key, before) in rollback {
                    self.store.replace(&key, before);
                }
                log::warn!(
                    target: "modulo.tx",
                    "{} rejected, rolled back {} key(s): {}",
                    tx.operation,
                    tx.keys.len(),
                    source
                );
                self.settle(tx.operation, &tx.settle_keys(false));
                Err(EngineError::Rejected {
                    operation: tx.operation,
                    source,
                })
            }
        }
    }
}

/// Replace the first item matching `id`, or return `None` if absent.
pub(crate) fn replace_by_id<T: Clone>(
    items: &[T],
    id: &str,
    id_of: impl Fn(&T) -> &str,
    f: impl FnOnce(&mut T),
) -> Option<Vec<T>> {
    let index = items.iter().position(|item| id_of(item) == id)?;
    let mut next = items.to_vec();
    f(&mut next[index]);
    Some(next)
}

/// Insert `item`, or overwrite the entry sharing its ID.
pub(crate) fn upsert<T: Clone>(items: &[T], item: T, id_of: impl Fn(&T) -> &str) -> Vec<T> {
    let mut next = items.to_vec();
    match next.iter().position(|existing| id_of(existing) == id_of(&item)) {
        Some(index) => next[index] = item,
        None => next.push(item),
    }
    next
}
