//! RocksDB-backed key/value store with atomic multi-key transactions.
//!
//! [`KvStore`] owns a single RocksDB instance; namespaces are string key
//! prefixes, not column families, so one atomic [`WriteBatch`] can span all
//! of them. A [`StoreTransaction`] reads through a snapshot taken at open
//! and stages writes locally: reads see the transaction's own staged
//! writes first, then the snapshot. Commit flushes the staged writes as a
//! single batch; dropping the transaction discards them.

use std::collections::BTreeMap;
use std::path::Path;

use rocksdb::{Options, Snapshot, WriteBatch, DB};

use chainaudit_core::error::StoreError;

fn backend(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Embedded ordered key/value store.
///
/// Shared-borrow transactions: any number of read-only transactions may run
/// alongside a writer. Dropping the store closes the database and, through
/// the borrow checker, outlives every outstanding transaction.
pub struct KvStore {
    db: DB,
}

impl KvStore {
    /// Open (or create) the store in the given data directory.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path.as_ref()).map_err(backend)?;
        Ok(Self { db })
    }

    /// Begin a transaction. Reads are snapshot-isolated from the moment of
    /// this call; writes require `writable`.
    pub fn transaction(&self, writable: bool) -> StoreTransaction<'_> {
        StoreTransaction {
            db: &self.db,
            snapshot: self.db.snapshot(),
            staged: BTreeMap::new(),
            writable,
        }
    }
}

/// A snapshot-isolated transaction over a [`KvStore`].
///
/// Writes are staged in memory (`None` marks a deletion) and become
/// visible to other transactions only after [`commit`](Self::commit).
/// Every exit path that does not commit leaves the store untouched,
/// whether that is an explicit [`discard`](Self::discard), an early `?`
/// return, or the caller being cancelled and dropping the value.
pub struct StoreTransaction<'a> {
    db: &'a DB,
    snapshot: Snapshot<'a>,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    writable: bool,
}

impl StoreTransaction<'_> {
    /// Read a key: staged writes first, then the snapshot.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if let Some(staged) = self.staged.get(key) {
            return Ok(staged.clone());
        }
        self.snapshot
            .get(key)
            .map(|value| value.map(|v| v.to_vec()))
            .map_err(backend)
    }

    /// Stage a write. Fails on a read-only transaction.
    pub fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.staged.insert(key.to_vec(), Some(value));
        Ok(())
    }

    /// Stage a deletion. Fails on a read-only transaction.
    pub fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.ensure_writable()?;
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }

    /// Atomically apply all staged writes. On failure nothing persists.
    pub fn commit(self) -> Result<(), StoreError> {
        if !self.writable {
            return Err(StoreError::ReadOnlyTransaction);
        }
        let mut batch = WriteBatch::default();
        for (key, value) in &self.staged {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            }
        }
        self.db.write(batch).map_err(backend)
    }

    /// Drop all staged writes. Always safe; equivalent to dropping.
    pub fn discard(self) {}

    fn ensure_writable(&self) -> Result<(), StoreError> {
        if self.writable {
            Ok(())
        } else {
            Err(StoreError::ReadOnlyTransaction)
        }
    }
}
