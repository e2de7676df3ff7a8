//! Ledger gateway for the tally voting client.
//!
//! The voting contract lives on an external, append-only ledger. This crate
//! exposes it as a set of narrow capability traits, one per method group:
//!
//! - [`SessionReader`]: sessions, candidates, vote flags, admin address
//! - [`WhitelistReader`]: whitelist mode and per-address membership
//! - [`SessionAdmin`]: session creation, candidates, activation flag
//! - [`WhitelistAdmin`]: whitelist mode and membership writes
//! - [`VoteSubmitter`]: casting a vote
//!
//! Every method declares [`LedgerError`] as its error set. Ledger-native
//! revert text is classified into a [`RejectionKind`] here, at the boundary,
//! so callers match on types rather than strings.
//!
//! Writes return a [`PendingTx`] whose confirmation is awaited separately.

pub mod capability;
pub mod error;
pub mod pending;
pub mod records;
pub mod rpc;

pub use capability::{
    Ledger, SessionAdmin, SessionReader, VoteSubmitter, WhitelistAdmin, WhitelistReader,
};
pub use error::{LedgerError, Rejection, RejectionKind};
pub use pending::{PendingTx, TxReceipt};
pub use records::{CandidateRecord, SessionRecord};
pub use rpc::RpcLedger;
