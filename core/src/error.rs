use tally_ledger::{LedgerError, RejectionKind};
use tally_types::{CandidateId, SessionId};
use thiserror::Error;

/// Everything a client operation can fail with.
///
/// Pure derivations never fail; every variant originates in a local
/// pre-submission check or in ledger I/O. All of them leave no partial state
/// behind, so any operation can be retried by invoking it again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Rejected locally before any ledger contact.
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("this address has already voted in the session")]
    AlreadyVoted,

    #[error("this address is not on the voter whitelist")]
    NotWhitelisted,

    #[error("voting is not currently active for this session")]
    NotActive,

    /// The same operation is already in flight.
    #[error("an identical operation is already pending")]
    AlreadyPending,

    /// Unreachable endpoint or malformed response; safe to retry.
    #[error("ledger unavailable: {0}")]
    NetworkOrLedger(String),

    /// The ledger refused the write for a reason outside the known taxonomy.
    #[error("ledger rejected the transaction: {0}")]
    UnknownRejection(String),
}

/// Local input checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("malformed address: {0:?}")]
    MalformedAddress(String),

    #[error("malformed addresses: {}", .0.join(", "))]
    InvalidAddresses(Vec<String>),

    #[error("end time must be after start time")]
    EndNotAfterStart,

    #[error("start time must be in the future")]
    StartNotInFuture,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("session {0} is not in the current snapshot")]
    UnknownSession(SessionId),

    #[error("candidate {candidate} does not exist in session {session}")]
    UnknownCandidate {
        session: SessionId,
        candidate: CandidateId,
    },

    #[error("session {0} no longer accepts candidates (inactive or already started)")]
    SessionClosedToCandidates(SessionId),
}

impl From<LedgerError> for ClientError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Transport(msg) => Self::NetworkOrLedger(msg),
            LedgerError::MalformedResponse(msg) => {
                Self::NetworkOrLedger(format!("malformed response: {msg}"))
            }
            LedgerError::Reverted(rejection) => match rejection.kind {
                RejectionKind::AlreadyVoted => Self::AlreadyVoted,
                RejectionKind::NotWhitelisted => Self::NotWhitelisted,
                RejectionKind::NotActive => Self::NotActive,
                RejectionKind::Unknown => Self::UnknownRejection(rejection.reason),
            },
        }
    }
}
