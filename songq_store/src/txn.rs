//! Transactions over a sled tree.
//!
//! sled's own transactions cannot iterate, so writes are buffered in an
//! overlay that reads and cursors consult before the tree. Commit applies the
//! overlay as one atomic batch under the commit lock.
//!
//! Every transaction reads the store as of its start. Each read of the tree
//! holds the commit lock shared and checks that no write transaction has
//! committed since; if one has, the read fails with `Conflict` and the caller
//! starts over on a fresh transaction. A write transaction likewise fails to
//! commit if any other write transaction committed after it began.
use std::{
    collections::BTreeMap,
    iter::Peekable,
    sync::{
        atomic::{AtomicU64, Ordering},
        PoisonError, RwLock, RwLockReadGuard,
    },
};

use log::debug;
use sled::{Batch, Db, IVec};

use crate::error::{QueueError, Result};

pub const IN_MEMORY: &str = ":memory:";

type Pending = BTreeMap<Vec<u8>, Option<Vec<u8>>>;
type BaseIter = Box<dyn Iterator<Item = sled::Result<(IVec, IVec)>>>;

pub struct Store {
    db: Db,
    commit_lock: RwLock<()>,
    commit_version: AtomicU64,
}

impl Store {
    pub fn open(path: &str) -> Result<Self> {
        let config = if path == IN_MEMORY {
            sled::Config::new().temporary(true)
        } else {
            sled::Config::new().path(path)
        };
        Ok(Self {
            db: config.open()?,
            commit_lock: RwLock::new(()),
            commit_version: AtomicU64::new(0),
        })
    }

    /// Direct access for records kept outside transactions (version, id lease).
    pub const fn db(&self) -> &Db {
        &self.db
    }

    pub fn begin(&self, writable: bool) -> StoreTxn<'_> {
        let _shared = self.commit_lock.read().unwrap_or_else(PoisonError::into_inner);
        StoreTxn {
            store: self,
            writable,
            start_version: self.commit_version.load(Ordering::Acquire),
            pending: BTreeMap::new(),
        }
    }

    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }

    /// Holds off commits while the tree is read, provided nothing has been
    /// committed since `start_version`.
    fn snapshot(&self, start_version: u64) -> Result<RwLockReadGuard<'_, ()>> {
        let guard = self.commit_lock.read().unwrap_or_else(PoisonError::into_inner);
        let current_version = self.commit_version.load(Ordering::Acquire);
        if current_version == start_version {
            Ok(guard)
        } else {
            debug!("Snapshot from version {start_version} is stale, store is at {current_version}");
            Err(QueueError::Conflict)
        }
    }
}

pub struct StoreTxn<'s> {
    store: &'s Store,
    writable: bool,
    start_version: u64,
    pending: Pending,
}

impl<'s> StoreTxn<'s> {
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(value.clone());
        }
        let _snapshot = self.store.snapshot(self.start_version)?;
        Ok(self.store.db.get(key)?.map(|v| v.to_vec()))
    }

    pub fn contains_key(&self, key: &[u8]) -> Result<bool> {
        if let Some(value) = self.pending.get(key) {
            return Ok(value.is_some());
        }
        let _snapshot = self.store.snapshot(self.start_version)?;
        Ok(self.store.db.contains_key(key)?)
    }

    pub fn set(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<()> {
        if !self.writable {
            return Err(QueueError::ReadOnly);
        }
        self.pending.insert(key.into(), Some(value.into()));
        Ok(())
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) -> Result<()> {
        if !self.writable {
            return Err(QueueError::ReadOnly);
        }
        self.pending.insert(key.into(), None);
        Ok(())
    }

    /// Cursor over all keys starting with `prefix`, positioned at the first
    /// entry in traversal order. Writes made after this call are not visible to it.
    pub fn cursor(&self, prefix: &[u8], reverse: bool) -> Result<Cursor<'s>> {
        let overlay = self
            .pending
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut cursor = Cursor {
            store: self.store,
            start_version: self.start_version,
            prefix: prefix.to_vec(),
            overlay,
            reverse,
            state: None,
            current: None,
        };
        cursor.rewind()?;
        Ok(cursor)
    }

    pub fn commit(mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let _exclusive = self.store.commit_lock.write().unwrap_or_else(PoisonError::into_inner);
        let current_version = self.store.commit_version.load(Ordering::Acquire);
        if current_version != self.start_version {
            debug!(
                "Commit rejected: started at version {}, store is at {current_version}",
                self.start_version
            );
            self.pending.clear();
            return Err(QueueError::Conflict);
        }
        let mut batch = Batch::default();
        for (key, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(value) => batch.insert(key, value),
                None => batch.remove(key),
            }
        }
        self.store.db.apply_batch(batch)?;
        self.store.commit_version.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn discard(mut self) {
        self.pending.clear();
    }
}

impl Drop for StoreTxn<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!("Dropping transaction with {} uncommitted writes", self.pending.len());
        }
    }
}

struct MergeState {
    base: Peekable<BaseIter>,
    overlay: Peekable<std::vec::IntoIter<(Vec<u8>, Option<Vec<u8>>)>>,
}

/// Ordered cursor merging committed tree entries with a transaction's pending
/// writes. Pending values shadow the tree and pending deletes hide keys.
/// Moving the cursor fails with `Conflict` once another transaction commits.
pub struct Cursor<'s> {
    store: &'s Store,
    start_version: u64,
    prefix: Vec<u8>,
    overlay: Vec<(Vec<u8>, Option<Vec<u8>>)>,
    reverse: bool,
    state: Option<MergeState>,
    current: Option<(Vec<u8>, Vec<u8>)>,
}

impl Cursor<'_> {
    /// Position at the first key in traversal order.
    pub fn rewind(&mut self) -> Result<()> {
        let store = self.store;
        let _snapshot = store.snapshot(self.start_version)?;
        let base: BaseIter = if self.reverse {
            Box::new(store.db.scan_prefix(&self.prefix).rev())
        } else {
            Box::new(store.db.scan_prefix(&self.prefix))
        };
        let mut overlay = self.overlay.clone();
        if self.reverse {
            overlay.reverse();
        }
        self.start(base, overlay)
    }

    /// Forward: position at the smallest key `>= key`. Reverse: at the largest key `<= key`.
    pub fn seek(&mut self, key: &[u8]) -> Result<()> {
        let store = self.store;
        let _snapshot = store.snapshot(self.start_version)?;
        let prefix = self.prefix.clone();
        let in_prefix = move |entry: &sled::Result<(IVec, IVec)>| {
            entry.as_ref().map_or(true, |(k, _)| k.starts_with(&prefix))
        };
        let (base, overlay): (BaseIter, Vec<_>) = if self.reverse {
            (
                Box::new(store.db.range(..=key.to_vec()).rev().take_while(in_prefix)),
                self.overlay.iter().rev().filter(|(k, _)| k.as_slice() <= key).cloned().collect(),
            )
        } else {
            (
                Box::new(store.db.range(key.to_vec()..).take_while(in_prefix)),
                self.overlay.iter().filter(|(k, _)| k.as_slice() >= key).cloned().collect(),
            )
        };
        self.start(base, overlay)
    }

    pub const fn valid(&self) -> bool {
        self.current.is_some()
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    pub fn next(&mut self) -> Result<()> {
        let store = self.store;
        let _snapshot = store.snapshot(self.start_version)?;
        self.advance()
    }

    fn start(&mut self, base: BaseIter, overlay: Vec<(Vec<u8>, Option<Vec<u8>>)>) -> Result<()> {
        self.state = Some(MergeState {
            base: base.peekable(),
            overlay: overlay.into_iter().peekable(),
        });
        self.advance()
    }

    fn advance(&mut self) -> Result<()> {
        self.current = None;
        let reverse = self.reverse;
        let Some(state) = self.state.as_mut() else {
            return Ok(());
        };
        loop {
            let base_key = match state.base.peek() {
                Some(Ok((k, _))) => Some(k.to_vec()),
                Some(Err(_)) => {
                    if let Some(Err(e)) = state.base.next() {
                        return Err(e.into());
                    }
                    return Ok(());
                }
                None => None,
            };
            let take_overlay = match (base_key, state.overlay.peek()) {
                (None, None) => return Ok(()),
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (Some(base_key), Some((overlay_key, _))) => {
                    if base_key == *overlay_key {
                        // shadowed by the pending write
                        state.base.next();
                        true
                    } else if reverse {
                        *overlay_key > base_key
                    } else {
                        *overlay_key < base_key
                    }
                }
            };
            if take_overlay {
                match state.overlay.next() {
                    Some((key, Some(value))) => {
                        self.current = Some((key, value));
                        return Ok(());
                    }
                    Some((_, None)) => continue,
                    None => return Ok(()),
                }
            }
            match state.base.next() {
                Some(Ok((key, value))) => {
                    self.current = Some((key.to_vec(), value.to_vec()));
                    return Ok(());
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(()),
            }
        }
    }
}
