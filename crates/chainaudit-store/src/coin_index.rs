//! Unspent-output (coin) index.
//!
//! A [`BlockWorker`] that tracks which coins each account currently holds,
//! given operation metadata. Networks flag coin movements with the
//! `utxo_created` / `utxo_spent` metadata keys carrying a network-unique
//! coin identifier (in Bitcoin terms, the outpoint `tx_hash:index`).
//!
//! Key layout:
//!
//! ```text
//! coin/<coin-id>                → Coin
//! coin-account/<fingerprint>    → sorted set of coin-ids held
//! ```
//!
//! A coin record exists iff exactly one account set contains its id; both
//! sides are always written in the same block transaction.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use chainaudit_core::error::{AuditError, CoinIndexError};
use chainaudit_core::status::StatusClassifier;
use chainaudit_core::types::{AccountIdentifier, Block, Coin, Operation, Transaction};

use crate::codec;
use crate::db::{KvStore, StoreTransaction};
use crate::worker::{BlockWorker, CommitHook};

/// Metadata key flagging the coin an operation created.
pub const COIN_CREATED_KEY: &str = "utxo_created";
/// Metadata key flagging the coin an operation spent.
pub const COIN_SPENT_KEY: &str = "utxo_spent";

fn coin_key(identifier: &str) -> Vec<u8> {
    format!("coin/{identifier}").into_bytes()
}

fn coin_account_key(fingerprint: &str) -> Vec<u8> {
    format!("coin-account/{fingerprint}").into_bytes()
}

/// Coin index over a shared [`KvStore`].
pub struct CoinIndex {
    db: Arc<KvStore>,
    classifier: Arc<dyn StatusClassifier>,
}

impl CoinIndex {
    pub fn new(db: Arc<KvStore>, classifier: Arc<dyn StatusClassifier>) -> Self {
        Self { db, classifier }
    }

    /// All coins currently held by an account. Unknown accounts hold
    /// nothing; a set entry without a coin record is an integrity error.
    pub fn coins(&self, account: &AccountIdentifier) -> Result<Vec<Coin>, AuditError> {
        let txn = self.db.transaction(false);

        let fingerprint = account.fingerprint()?;
        let held: BTreeSet<String> = match txn.get(&coin_account_key(&fingerprint))? {
            Some(bytes) => codec::decode(&bytes)?,
            None => return Ok(Vec::new()),
        };

        let mut coins = Vec::with_capacity(held.len());
        for identifier in held {
            let bytes = match txn.get(&coin_key(&identifier))? {
                Some(bytes) => bytes,
                None => return Err(CoinIndexError::CoinRecordMissing(identifier).into()),
            };
            coins.push(codec::decode(&bytes)?);
        }
        Ok(coins)
    }

    /// Pull a string coin identifier out of operation metadata. Absent key
    /// means the operation does not move a coin under this role.
    fn coin_identifier(
        operation: &Operation,
        metadata_key: &str,
    ) -> Result<Option<String>, CoinIndexError> {
        match operation.metadata.get(metadata_key) {
            None => Ok(None),
            Some(serde_json::Value::String(identifier)) => Ok(Some(identifier.clone())),
            Some(other) => Err(CoinIndexError::InvalidCoinIdentifier {
                key: metadata_key.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Stage a new coin and add it to the owner's set. Returns whether a
    /// coin was staged.
    fn try_adding_coin(
        &self,
        txn: &mut StoreTransaction<'_>,
        block_transaction: &Transaction,
        operation: &Operation,
        metadata_key: &str,
    ) -> Result<bool, AuditError> {
        let identifier = match Self::coin_identifier(operation, metadata_key)? {
            Some(identifier) => identifier,
            None => return Ok(false),
        };

        let coin = Coin {
            identifier: identifier.clone(),
            transaction: block_transaction.clone(),
            operation: operation.clone(),
        };
        txn.set(&coin_key(&identifier), codec::encode(&coin)?)?;

        let fingerprint = operation.account.fingerprint()?;
        let account_key = coin_account_key(&fingerprint);
        let mut held: BTreeSet<String> = match txn.get(&account_key)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => BTreeSet::new(),
        };

        if !held.insert(identifier.clone()) {
            return Err(CoinIndexError::CoinAlreadyHeld {
                coin: identifier,
                account: fingerprint,
            }
            .into());
        }

        txn.set(&account_key, codec::encode(&held)?)?;
        Ok(true)
    }

    /// Stage removal of a coin and drop it from the owner's set. A coin
    /// with no record predates the sync start and is skipped; a recorded
    /// coin whose owner set is missing or inconsistent is an error.
    /// Returns whether a coin was removed.
    fn try_removing_coin(
        &self,
        txn: &mut StoreTransaction<'_>,
        operation: &Operation,
        metadata_key: &str,
    ) -> Result<bool, AuditError> {
        let identifier = match Self::coin_identifier(operation, metadata_key)? {
            Some(identifier) => identifier,
            None => return Ok(false),
        };

        if txn.get(&coin_key(&identifier))?.is_none() {
            return Ok(false);
        }
        txn.delete(&coin_key(&identifier))?;

        let fingerprint = operation.account.fingerprint()?;
        let account_key = coin_account_key(&fingerprint);
        let mut held: BTreeSet<String> = match txn.get(&account_key)? {
            Some(bytes) => codec::decode(&bytes)?,
            None => return Err(CoinIndexError::AccountNotFound(fingerprint).into()),
        };

        if !held.remove(&identifier) {
            return Err(CoinIndexError::CoinNotHeld {
                coin: identifier,
                account: fingerprint,
            }
            .into());
        }

        txn.set(&account_key, codec::encode(&held)?)?;
        Ok(true)
    }

    /// Walk every successful, amount-bearing operation, staging coin
    /// mutations. `created_key` / `spent_key` swap roles between add and
    /// remove so removal exactly undoes addition. Within one operation the
    /// create is processed before the spend, so a coin created and
    /// immediately spent nets out.
    fn process_block(
        &self,
        block: &Block,
        txn: &mut StoreTransaction<'_>,
        created_key: &str,
        spent_key: &str,
    ) -> Result<Option<CommitHook>, AuditError> {
        let mut added = 0usize;
        let mut removed = 0usize;

        for transaction in &block.transactions {
            for operation in &transaction.operations {
                if !self.classifier.operation_successful(operation)? {
                    continue;
                }
                if operation.amount.is_none() {
                    continue;
                }

                if self.try_adding_coin(txn, transaction, operation, created_key)? {
                    added += 1;
                }
                if self.try_removing_coin(txn, operation, spent_key)? {
                    removed += 1;
                }
            }
        }

        if added == 0 && removed == 0 {
            return Ok(None);
        }

        let block_hash = block.block_identifier.hash.clone();
        Ok(Some(Box::new(move || {
            debug!(block = %block_hash, added, removed, "coin index updated");
            Ok(())
        })))
    }
}

impl BlockWorker for CoinIndex {
    fn adding_block(
        &self,
        block: &Block,
        txn: &mut StoreTransaction<'_>,
    ) -> Result<Option<CommitHook>, AuditError> {
        self.process_block(block, txn, COIN_CREATED_KEY, COIN_SPENT_KEY)
    }

    // Roles reverse on a re-org: spent coins come back, created coins go.
    fn removing_block(
        &self,
        block: &Block,
        txn: &mut StoreTransaction<'_>,
    ) -> Result<Option<CommitHook>, AuditError> {
        self.process_block(block, txn, COIN_SPENT_KEY, COIN_CREATED_KEY)
    }
}
