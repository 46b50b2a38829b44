//! Chain data types as reported by an upstream node adapter.
//!
//! Hashes are opaque strings supplied by the adapter; chainaudit never
//! recomputes them. Block indexes are monotonic `i64` heights. Operation
//! and account metadata are open-ended JSON maps, kept sorted so every
//! encoding of the same logical value is byte-identical.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::CodecError;

/// Open-ended metadata attached to operations and accounts.
///
/// Backed by a sorted map so canonical encodings do not depend on the key
/// order the upstream adapter happened to emit.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Identifies a block by its opaque hash and chain height.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockIdentifier {
    /// Opaque block hash.
    pub hash: String,
    /// Monotonic block height.
    pub index: i64,
}

impl fmt::Display for BlockIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.index)
    }
}

/// A canonical-chain block with its parent link and transactions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Block {
    /// Identifier of this block.
    pub block_identifier: BlockIdentifier,
    /// Identifier of the parent block. For a genesis block this points at
    /// the block itself or at a pruned ancestor; the index never walks
    /// past it.
    pub parent_block_identifier: BlockIdentifier,
    /// Block timestamp in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Ordered transactions contained in the block.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

/// A transaction within a block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Transaction {
    /// Opaque transaction hash. May legitimately recur across blocks,
    /// never twice within one block.
    pub hash: String,
    /// Ordered operations applied by this transaction.
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// A single balance-affecting operation within a transaction.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Operation {
    /// Position of the operation within its transaction.
    pub index: i64,
    /// Network-defined operation type (e.g. `"Transfer"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Network-defined execution status, classified by a
    /// [`StatusClassifier`](crate::status::StatusClassifier).
    pub status: String,
    /// Account whose balance the operation affects.
    pub account: AccountIdentifier,
    /// Balance change; absent for purely informational operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
    /// Adapter-supplied metadata. The coin index reads the
    /// `utxo_created` / `utxo_spent` keys; everything else is carried
    /// opaquely.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A signed balance change in some currency.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Amount {
    /// Integer value in the currency's smallest unit, as a base-10 string
    /// (may carry a leading `-`).
    pub value: String,
    /// Currency of the value.
    pub currency: Currency,
}

/// Currency denomination for an [`Amount`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Currency {
    /// Ticker symbol (e.g. `"BTC"`).
    pub symbol: String,
    /// Number of decimal places in the standard unit.
    pub decimals: u32,
}

/// Identifies an account, optionally scoped to a sub-account.
///
/// Two identifiers that differ only in metadata key order or in
/// absent-versus-empty optional fields are the same account; use
/// [`fingerprint`](Self::fingerprint) wherever a storage key is needed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AccountIdentifier {
    /// Network address of the account.
    pub address: String,
    /// Optional sub-account scope (e.g. a staking bucket).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_account: Option<SubAccountIdentifier>,
    /// Adapter-supplied metadata distinguishing otherwise equal addresses.
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

/// A named scope under an [`AccountIdentifier`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SubAccountIdentifier {
    /// Sub-account address or label.
    pub address: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
}

impl AccountIdentifier {
    /// Deterministic fingerprint of the account identity.
    ///
    /// Lowercase-hex SHA-256 of the canonical encoding: struct fields in
    /// declaration order, metadata keys sorted, `None` fields omitted.
    /// Pure and stable across processes, so it is safe to use in
    /// persisted storage keys.
    ///
    /// # Errors
    ///
    /// [`CodecError::Encode`] if the identifier cannot be encoded.
    pub fn fingerprint(&self) -> Result<String, CodecError> {
        let canonical =
            serde_json::to_vec(self).map_err(|e| CodecError::Encode(e.to_string()))?;
        let digest = Sha256::digest(&canonical);
        Ok(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }
}

/// A spendable output (UTXO) tracked by the coin index.
///
/// Created by the operation carrying `utxo_created`, destroyed by the one
/// carrying `utxo_spent` (roles reverse when a block is removed).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Coin {
    /// Network-unique coin identifier (e.g. `"txhash:vout"`).
    pub identifier: String,
    /// Transaction that produced this coin.
    pub transaction: Transaction,
    /// Operation that produced this coin.
    pub operation: Operation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sample_account() -> AccountIdentifier {
        AccountIdentifier {
            address: "addr1".into(),
            sub_account: Some(SubAccountIdentifier {
                address: "staking".into(),
                metadata: meta(&[("tier", json!("gold")), ("epoch", json!(7))]),
            }),
            metadata: Metadata::new(),
        }
    }

    // --- BlockIdentifier ---

    #[test]
    fn block_identifier_display() {
        let id = BlockIdentifier { hash: "h1".into(), index: 42 };
        assert_eq!(id.to_string(), "h1:42");
    }

    // --- AccountIdentifier fingerprint ---

    #[test]
    fn fingerprint_is_deterministic() {
        let a = sample_account();
        assert_eq!(a.fingerprint().unwrap(), a.fingerprint().unwrap());
        assert_eq!(a.fingerprint().unwrap().len(), 64);
        assert!(a
            .fingerprint()
            .unwrap()
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_ignores_metadata_key_order() {
        let forward = AccountIdentifier {
            address: "addr1".into(),
            sub_account: None,
            metadata: meta(&[("a", json!(1)), ("b", json!(2))]),
        };
        let reversed = AccountIdentifier {
            address: "addr1".into(),
            sub_account: None,
            metadata: meta(&[("b", json!(2)), ("a", json!(1))]),
        };
        assert_eq!(forward.fingerprint().unwrap(), reversed.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_collapses_empty_and_missing_metadata() {
        let explicit = AccountIdentifier {
            address: "addr1".into(),
            sub_account: None,
            metadata: Metadata::new(),
        };
        let parsed: AccountIdentifier =
            serde_json::from_value(json!({ "address": "addr1" })).unwrap();
        assert_eq!(explicit.fingerprint().unwrap(), parsed.fingerprint().unwrap());
    }

    #[test]
    fn fingerprint_distinguishes_sub_accounts() {
        let bare = AccountIdentifier {
            address: "addr1".into(),
            sub_account: None,
            metadata: Metadata::new(),
        };
        assert_ne!(
            bare.fingerprint().unwrap(),
            sample_account().fingerprint().unwrap()
        );
    }

    #[test]
    fn fingerprint_distinguishes_addresses() {
        let a = AccountIdentifier {
            address: "addr1".into(),
            sub_account: None,
            metadata: Metadata::new(),
        };
        let b = AccountIdentifier {
            address: "addr2".into(),
            sub_account: None,
            metadata: Metadata::new(),
        };
        assert_ne!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
    }

    // --- serde round-trips ---

    #[test]
    fn operation_round_trip_with_nested_metadata() {
        let op = Operation {
            index: 0,
            kind: "Transfer".into(),
            status: "Success".into(),
            account: sample_account(),
            amount: Some(Amount {
                value: "-2500".into(),
                currency: Currency { symbol: "BTC".into(), decimals: 8 },
            }),
            metadata: meta(&[
                ("utxo_spent", json!("c1")),
                ("detail", json!({ "nested": { "deep": [1, "two", null] } })),
            ]),
        };
        let encoded = serde_json::to_vec(&op).unwrap();
        let decoded: Operation = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(op, decoded);
    }

    #[test]
    fn operation_type_field_renames() {
        let value = serde_json::to_value(Operation {
            index: 1,
            kind: "Transfer".into(),
            status: "Success".into(),
            account: sample_account(),
            amount: None,
            metadata: Metadata::new(),
        })
        .unwrap();
        assert_eq!(value["type"], json!("Transfer"));
        assert!(value.get("kind").is_none());
        assert!(value.get("amount").is_none());
    }

    #[test]
    fn block_round_trip() {
        let block = Block {
            block_identifier: BlockIdentifier { hash: "h1".into(), index: 1 },
            parent_block_identifier: BlockIdentifier { hash: "h0".into(), index: 0 },
            timestamp: 1_700_000_000_000,
            transactions: vec![Transaction { hash: "tx1".into(), operations: vec![] }],
        };
        let encoded = serde_json::to_vec(&block).unwrap();
        let decoded: Block = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn block_transactions_default_to_empty() {
        let decoded: Block = serde_json::from_value(json!({
            "block_identifier": { "hash": "h1", "index": 1 },
            "parent_block_identifier": { "hash": "h0", "index": 0 },
            "timestamp": 1
        }))
        .unwrap();
        assert!(decoded.transactions.is_empty());
    }
}
