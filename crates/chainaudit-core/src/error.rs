//! Error types for the chainaudit storage core.
//!
//! One enum per subsystem; [`AuditError`] is the umbrella the public API
//! surfaces. Every kind stays inspectable through the umbrella, so callers
//! can `matches!` on the inner enum to branch (e.g. treating
//! [`BlockIndexError::HeadBlockNotFound`] as "fresh store").
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("backend: {0}")] Backend(String),
    #[error("transaction is read-only")] ReadOnlyTransaction,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("encode: {0}")] Encode(String),
    #[error("decode: {0}")] Decode(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockIndexError {
    #[error("head block not found")] HeadBlockNotFound,
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("transaction not found: {0}")] TransactionNotFound(String),
    #[error("duplicate block hash: {0}")] DuplicateBlockHash(String),
    #[error("duplicate transaction {tx_hash} in block {block_hash}:{block_index}")]
    DuplicateTransactionHash { tx_hash: String, block_hash: String, block_index: i64 },
    #[error("transaction {tx_hash} is not indexed under block {block_hash}")]
    TransactionNotIndexed { tx_hash: String, block_hash: String },
    #[error("last processed block {head_index} is less than start index {start_index}")]
    HeadBehindStartIndex { head_index: i64, start_index: i64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoinIndexError {
    #[error("coin identifier under {key} is not a string: {value}")]
    InvalidCoinIdentifier { key: String, value: String },
    #[error("coin {coin} already exists in account {account}")]
    CoinAlreadyHeld { coin: String, account: String },
    #[error("no coin set stored for account {0}")] AccountNotFound(String),
    #[error("coin {coin} is not held by account {account}")]
    CoinNotHeld { coin: String, account: String },
    #[error("coin record missing for {0}")] CoinRecordMissing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    #[error("unknown operation status: {0}")] UnknownStatus(String),
    #[error("invalid amount: {0}")] InvalidAmount(String),
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error(transparent)] Store(#[from] StoreError),
    #[error(transparent)] Codec(#[from] CodecError),
    #[error(transparent)] BlockIndex(#[from] BlockIndexError),
    #[error(transparent)] CoinIndex(#[from] CoinIndexError),
    #[error(transparent)] Status(#[from] StatusError),
}
