//! # chainaudit-store — transactional block-index substrate.
//!
//! Composes the storage core of the audit tool:
//! - [`db::KvStore`] — atomic multi-key transactions over RocksDB
//! - [`block_index::BlockIndex`] — canonical chain: head pointer, duplicate
//!   guards, transaction reverse index, re-org unwinding
//! - [`worker::BlockWorker`] — auxiliary indices co-committed with each
//!   block mutation
//! - [`coin_index::CoinIndex`] — reference worker tracking unspent outputs
//!   per account

pub mod block_index;
pub mod codec;
pub mod coin_index;
pub mod db;
pub mod worker;

pub use block_index::BlockIndex;
pub use coin_index::CoinIndex;
pub use db::{KvStore, StoreTransaction};
pub use worker::{BlockWorker, CommitHook};
