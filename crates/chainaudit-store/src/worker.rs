//! Block-worker pipeline seam.
//!
//! Workers maintain auxiliary indices that must move in lock-step with the
//! canonical chain: their writes land in the same transaction as the block
//! record, so a crash or re-org can never leave a half-indexed chain.

use chainaudit_core::error::AuditError;
use chainaudit_core::types::Block;

use crate::db::StoreTransaction;

/// A deferred side effect returned by a [`BlockWorker`].
///
/// Runs only after the enclosing block transaction commits, in worker
/// registration order. Typical use is user-visible logging that must not
/// appear for a block that was never accepted. Once a hook runs, its
/// effects may be externally visible and cannot be rolled back; a hook
/// error is reported to the driver with storage already persisted.
pub type CommitHook = Box<dyn FnOnce() -> Result<(), AuditError> + Send>;

/// Work performed while a block is added to or removed from storage,
/// inside the same database transaction as the change.
///
/// Workers are registered once, before any block is processed, and run in
/// registration order. They see the in-flight transaction, including
/// writes staged earlier in the same transaction (by the block index or by
/// workers ahead of them), so composite indices can build on reverse-index
/// state that is not yet committed. Any error aborts the whole
/// transaction; none of the staged writes survive.
pub trait BlockWorker: Send + Sync {
    /// Stage this worker's writes for a block being added.
    fn adding_block(
        &self,
        block: &Block,
        txn: &mut StoreTransaction<'_>,
    ) -> Result<Option<CommitHook>, AuditError>;

    /// Stage this worker's writes for a block being removed. Must undo
    /// exactly what [`adding_block`](Self::adding_block) staged for the
    /// same block.
    fn removing_block(
        &self,
        block: &Block,
        txn: &mut StoreTransaction<'_>,
    ) -> Result<Option<CommitHook>, AuditError>;
}
