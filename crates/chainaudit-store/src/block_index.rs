//! Canonical-chain block index.
//!
//! Maintains the head pointer, immutable block records, duplicate-hash
//! guards, and the transaction→blocks reverse index, and drives the
//! [`BlockWorker`] pipeline so auxiliary indices commit atomically with
//! every block mutation. Re-orgs arrive from the driver as
//! [`remove_block`](BlockIndex::remove_block) calls for each abandoned
//! block followed by [`add_block`](BlockIndex::add_block) calls for the
//! replacement branch.
//!
//! Key layout (disjoint string-prefixed namespaces):
//!
//! ```text
//! head-block                    → BlockIdentifier of the tip
//! block/<hash>/<index>          → Block
//! block-hash/<hash>             → (empty) duplicate-hash marker
//! transaction-hash/<hash>       → { block hash → block index }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use chainaudit_core::error::{AuditError, BlockIndexError};
use chainaudit_core::types::{Block, BlockIdentifier};

use crate::codec;
use crate::db::{KvStore, StoreTransaction};
use crate::worker::BlockWorker;

const HEAD_BLOCK_KEY: &[u8] = b"head-block";

fn block_key(id: &BlockIdentifier) -> Vec<u8> {
    format!("block/{}/{}", id.hash, id.index).into_bytes()
}

// A separate namespace keyed by hash alone: the block record key embeds the
// index, so it cannot answer "was this hash ever used".
fn block_hash_key(hash: &str) -> Vec<u8> {
    format!("block-hash/{hash}").into_bytes()
}

fn transaction_hash_key(hash: &str) -> Vec<u8> {
    format!("transaction-hash/{hash}").into_bytes()
}

/// Block index over a shared [`KvStore`].
///
/// Mutating operations (`add_block`, `remove_block`, and the rewind built
/// on them) assume single-writer discipline on the head, which the driver
/// guarantees. Reads may run concurrently.
pub struct BlockIndex {
    db: Arc<KvStore>,
    workers: Vec<Arc<dyn BlockWorker>>,
}

impl BlockIndex {
    /// Create an index with no workers registered.
    pub fn new(db: Arc<KvStore>) -> Self {
        Self { db, workers: Vec::new() }
    }

    /// Register the worker pipeline, in invocation order.
    ///
    /// Workers are usually constructed after the index itself, so this is
    /// separate from [`new`](Self::new). Must be called before any block
    /// is processed; re-registration mid-stream is a caller bug.
    pub fn register_workers(&mut self, workers: Vec<Arc<dyn BlockWorker>>) {
        self.workers = workers;
    }

    /// Identifier of the current chain tip.
    ///
    /// # Errors
    ///
    /// [`BlockIndexError::HeadBlockNotFound`] if no block has ever been
    /// added (or all have been removed).
    pub fn head_block_identifier(&self) -> Result<BlockIdentifier, AuditError> {
        let txn = self.db.transaction(false);
        match txn.get(HEAD_BLOCK_KEY)? {
            Some(bytes) => Ok(codec::decode(&bytes)?),
            None => Err(BlockIndexError::HeadBlockNotFound.into()),
        }
    }

    /// Write the head pointer inside the caller's transaction, so it can
    /// compose with a larger atomic change (block add/remove).
    pub fn store_head_block_identifier(
        &self,
        txn: &mut StoreTransaction<'_>,
        block_identifier: &BlockIdentifier,
    ) -> Result<(), AuditError> {
        txn.set(HEAD_BLOCK_KEY, codec::encode(block_identifier)?)?;
        Ok(())
    }

    /// Fetch a stored block.
    ///
    /// # Errors
    ///
    /// [`BlockIndexError::BlockNotFound`] if no block is stored under this
    /// identifier.
    pub fn block(&self, block_identifier: &BlockIdentifier) -> Result<Block, AuditError> {
        let txn = self.db.transaction(false);
        match txn.get(&block_key(block_identifier))? {
            Some(bytes) => Ok(codec::decode(&bytes)?),
            None => Err(BlockIndexError::BlockNotFound(block_identifier.to_string()).into()),
        }
    }

    /// Accept a block as the new chain tip.
    ///
    /// Stores the block record, advances the head, indexes the block hash
    /// and every transaction hash, runs each worker, and commits, all in
    /// one transaction. Collected commit hooks run afterwards in worker
    /// order. On any failure the transaction is discarded and storage is
    /// unchanged.
    ///
    /// # Errors
    ///
    /// - [`BlockIndexError::DuplicateBlockHash`] if a block with this hash
    ///   is already stored
    /// - [`BlockIndexError::DuplicateTransactionHash`] if the block
    ///   carries the same transaction hash twice
    pub fn add_block(&self, block: &Block) -> Result<(), AuditError> {
        let mut txn = self.db.transaction(true);

        txn.set(&block_key(&block.block_identifier), codec::encode(block)?)?;
        self.store_head_block_identifier(&mut txn, &block.block_identifier)?;
        self.store_block_hash(&mut txn, &block.block_identifier)?;
        for transaction in &block.transactions {
            self.store_transaction_hash(&mut txn, &block.block_identifier, &transaction.hash)?;
        }

        self.run_workers_and_commit(block, txn, true)
    }

    /// Remove the block and restore its parent as the head.
    ///
    /// Unwinds everything [`add_block`](Self::add_block) wrote: the
    /// reverse-index entries, the hash marker, the block record, and each
    /// worker's contribution, leaving storage as if the block had never
    /// been added. The duplicate-hash guard is cleared so the same hash
    /// can return on a replacement branch.
    pub fn remove_block(&self, block_identifier: &BlockIdentifier) -> Result<(), AuditError> {
        let block = self.block(block_identifier)?;

        let mut txn = self.db.transaction(true);

        for transaction in &block.transactions {
            self.remove_transaction_hash(&mut txn, block_identifier, &transaction.hash)?;
        }
        txn.delete(&block_hash_key(&block_identifier.hash))?;
        txn.delete(&block_key(block_identifier))?;
        self.store_head_block_identifier(&mut txn, &block.parent_block_identifier)?;

        self.run_workers_and_commit(&block, txn, false)
    }

    /// Locate a transaction by hash.
    ///
    /// Returns `None` if the hash has never been indexed. Otherwise
    /// returns every stored block containing it, plus the distance from
    /// the head to the oldest sighting.
    ///
    /// # Errors
    ///
    /// [`BlockIndexError::HeadBlockNotFound`] if sightings exist but no
    /// head does: an indexed transaction implies at least one stored
    /// block, so this is a consistency violation.
    pub fn find_transaction(
        &self,
        transaction_hash: &str,
    ) -> Result<Option<(Vec<BlockIdentifier>, i64)>, AuditError> {
        let txn = self.db.transaction(false);

        let sightings: BTreeMap<String, i64> =
            match txn.get(&transaction_hash_key(transaction_hash))? {
                Some(bytes) => codec::decode(&bytes)?,
                None => return Ok(None),
            };

        let head: BlockIdentifier = match txn.get(HEAD_BLOCK_KEY)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => return Err(BlockIndexError::HeadBlockNotFound.into()),
        };

        let mut identifiers = Vec::with_capacity(sightings.len());
        let mut oldest = i64::MAX;
        for (hash, index) in sightings {
            oldest = oldest.min(index);
            identifiers.push(BlockIdentifier { hash, index });
        }

        Ok(Some((identifiers, head.index - oldest)))
    }

    /// Rewind the chain so syncing can restart at `start_index`: every
    /// block with `index >= start_index` is removed, newest first.
    ///
    /// Each removal is its own transaction, keeping transaction size
    /// bounded regardless of how far the rewind reaches. A store with no
    /// head is already rewound. A head below `start_index` cannot be
    /// rewound and is reported as
    /// [`BlockIndexError::HeadBehindStartIndex`]; a missing block along
    /// the parent chain surfaces as [`BlockIndexError::BlockNotFound`]
    /// (corruption; the driver decides).
    pub fn set_new_start_index(&self, start_index: i64) -> Result<(), AuditError> {
        let head = match self.head_block_identifier() {
            Ok(head) => head,
            Err(AuditError::BlockIndex(BlockIndexError::HeadBlockNotFound)) => return Ok(()),
            Err(err) => return Err(err),
        };

        if head.index < start_index {
            return Err(BlockIndexError::HeadBehindStartIndex {
                head_index: head.index,
                start_index,
            }
            .into());
        }

        let mut current = head;
        while current.index >= start_index {
            info!(hash = %current.hash, index = current.index, "rewinding block");
            let block = self.block(&current)?;
            self.remove_block(&block.block_identifier)?;
            current = block.parent_block_identifier;
        }

        Ok(())
    }

    /// Up to `max_size` most recent block identifiers, ascending by
    /// index, for priming the driver's in-memory re-org detection.
    ///
    /// Walks parent pointers from the head; a missing parent (pruned
    /// floor or genesis) ends the walk with what was collected. An empty
    /// store yields an empty cache.
    pub fn block_cache(&self, max_size: usize) -> Vec<BlockIdentifier> {
        let mut cache = Vec::new();
        let mut cursor = match self.head_block_identifier() {
            Ok(head) => head,
            Err(_) => return cache,
        };

        while cache.len() < max_size {
            let block = match self.block(&cursor) {
                Ok(block) => block,
                Err(_) => break,
            };
            debug!(hash = %block.block_identifier.hash, "added block to cache");
            cache.push(block.block_identifier);
            cursor = block.parent_block_identifier;
        }

        cache.reverse();
        cache
    }

    /// Run the worker pipeline, commit, then fire collected hooks.
    fn run_workers_and_commit(
        &self,
        block: &Block,
        mut txn: StoreTransaction<'_>,
        adding: bool,
    ) -> Result<(), AuditError> {
        let mut hooks = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let hook = if adding {
                worker.adding_block(block, &mut txn)?
            } else {
                worker.removing_block(block, &mut txn)?
            };
            hooks.push(hook);
        }

        txn.commit()?;

        // State is persisted from here on; hook failures propagate but
        // roll nothing back.
        for hook in hooks.into_iter().flatten() {
            hook()?;
        }

        Ok(())
    }

    /// Mark a block hash as used, failing if it already is.
    fn store_block_hash(
        &self,
        txn: &mut StoreTransaction<'_>,
        block_identifier: &BlockIdentifier,
    ) -> Result<(), AuditError> {
        let key = block_hash_key(&block_identifier.hash);
        if txn.get(&key)?.is_some() {
            return Err(
                BlockIndexError::DuplicateBlockHash(block_identifier.hash.clone()).into(),
            );
        }
        txn.set(&key, Vec::new())?;
        Ok(())
    }

    /// Record a `(block hash → block index)` sighting for a transaction.
    ///
    /// The value is a map rather than a single pointer: the same
    /// transaction hash may legitimately recur across blocks, and a
    /// re-org must restore the map to exactly its prior state. A sighting
    /// already present for this block means the block carries the hash
    /// twice.
    fn store_transaction_hash(
        &self,
        txn: &mut StoreTransaction<'_>,
        block_identifier: &BlockIdentifier,
        transaction_hash: &str,
    ) -> Result<(), AuditError> {
        let key = transaction_hash_key(transaction_hash);
        let mut sightings: BTreeMap<String, i64> = match txn.get(&key)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => BTreeMap::new(),
        };

        if sightings.contains_key(&block_identifier.hash) {
            return Err(BlockIndexError::DuplicateTransactionHash {
                tx_hash: transaction_hash.to_string(),
                block_hash: block_identifier.hash.clone(),
                block_index: block_identifier.index,
            }
            .into());
        }

        sightings.insert(block_identifier.hash.clone(), block_identifier.index);
        txn.set(&key, codec::encode(&sightings)?)?;
        Ok(())
    }

    /// Remove this block's sighting; a missing entry is an integrity
    /// violation, not a normal case. The key disappears with its last
    /// sighting.
    fn remove_transaction_hash(
        &self,
        txn: &mut StoreTransaction<'_>,
        block_identifier: &BlockIdentifier,
        transaction_hash: &str,
    ) -> Result<(), AuditError> {
        let key = transaction_hash_key(transaction_hash);
        let mut sightings: BTreeMap<String, i64> = match txn.get(&key)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => {
                return Err(BlockIndexError::TransactionNotIndexed {
                    tx_hash: transaction_hash.to_string(),
                    block_hash: block_identifier.hash.clone(),
                }
                .into())
            }
        };

        if sightings.remove(&block_identifier.hash).is_none() {
            return Err(BlockIndexError::TransactionNotIndexed {
                tx_hash: transaction_hash.to_string(),
                block_hash: block_identifier.hash.clone(),
            }
            .into());
        }

        if sightings.is_empty() {
            txn.delete(&key)?;
        } else {
            txn.set(&key, codec::encode(&sightings)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_disjoint() {
        let id = BlockIdentifier { hash: "h1".into(), index: 1 };
        assert_eq!(block_key(&id), b"block/h1/1".to_vec());
        assert_eq!(block_hash_key("h1"), b"block-hash/h1".to_vec());
        assert_eq!(
            transaction_hash_key("h1"),
            b"transaction-hash/h1".to_vec()
        );
    }

    #[test]
    fn block_key_embeds_index() {
        let a = BlockIdentifier { hash: "h1".into(), index: 1 };
        let b = BlockIdentifier { hash: "h1".into(), index: 2 };
        assert_ne!(block_key(&a), block_key(&b));
    }
}
