use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Declared error set of every ledger capability method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The endpoint could not be reached or the request did not complete.
    #[error("transport error: {0}")]
    Transport(String),

    /// The endpoint answered with something that is not a valid response.
    #[error("malformed ledger response: {0}")]
    MalformedResponse(String),

    /// The contract rejected the call.
    #[error("ledger rejected the call: {0}")]
    Reverted(Rejection),
}

impl LedgerError {
    /// Build a [`LedgerError::Reverted`] from raw revert text.
    pub fn reverted(reason: impl Into<String>) -> Self {
        Self::Reverted(Rejection::from_reason(reason))
    }

    /// Whether re-issuing the same call could succeed without any state change.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Reverted(_))
    }
}

/// Known causes of a contract-side rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionKind {
    AlreadyVoted,
    NotWhitelisted,
    NotActive,
    Unknown,
}

impl RejectionKind {
    /// Map ledger-native revert text to a kind.
    ///
    /// The contract's messages are not under this client's control, so the
    /// match is a case-insensitive substring search on stable fragments.
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        if reason.contains("already voted") {
            Self::AlreadyVoted
        } else if reason.contains("not whitelisted") {
            Self::NotWhitelisted
        } else if reason.contains("not active") {
            Self::NotActive
        } else {
            Self::Unknown
        }
    }
}

/// A classified contract rejection, keeping the raw text for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{reason} ({kind:?})")]
pub struct Rejection {
    pub kind: RejectionKind,
    pub reason: String,
}

impl Rejection {
    pub fn from_reason(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            kind: RejectionKind::classify(&reason),
            reason,
        }
    }
}
