//! Pending-transaction handle returned by write commands.

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_types::TxHash;

use crate::LedgerError;

/// Acknowledgement that a write was finalized by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub hash: TxHash,
    /// Height of the block that included the transaction.
    pub block: u64,
}

/// A submitted write whose outcome is not yet known.
///
/// The hash is available as soon as the ledger accepted the submission;
/// [`PendingTx::confirmed`] waits (without polling the CPU) for the
/// ledger to report the final outcome. Dropping the handle abandons the
/// wait; it does not cancel the transaction.
pub struct PendingTx {
    hash: TxHash,
    confirmation: BoxFuture<'static, Result<TxReceipt, LedgerError>>,
}

impl PendingTx {
    pub fn new(
        hash: TxHash,
        confirmation: BoxFuture<'static, Result<TxReceipt, LedgerError>>,
    ) -> Self {
        Self { hash, confirmation }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Wait for the ledger to finalize or reject the transaction.
    pub async fn confirmed(self) -> Result<TxReceipt, LedgerError> {
        self.confirmation.await
    }
}

impl fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTx").field("hash", &self.hash).finish()
    }
}
