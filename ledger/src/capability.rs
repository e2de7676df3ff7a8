//! Capability traits over the voting contract, one per method group.
//!
//! Components depend on the narrowest trait they need: the session
//! repository only ever sees a [`SessionReader`], the vote coordinator a
//! [`VoteSubmitter`]. Implementations must be shareable across tasks.

use async_trait::async_trait;
use tally_types::{Address, CandidateId, SessionId};

use crate::{CandidateRecord, LedgerError, PendingTx, SessionRecord};

/// Read access to sessions, candidates and vote flags.
#[async_trait]
pub trait SessionReader: Send + Sync {
    /// `sessionsCount()`
    async fn sessions_count(&self) -> Result<u64, LedgerError>;

    /// `getSessionDetails(id)`
    async fn session_details(&self, id: SessionId) -> Result<SessionRecord, LedgerError>;

    /// `getCandidatesCount(sessionId)`
    async fn candidates_count(&self, session: SessionId) -> Result<u64, LedgerError>;

    /// `getCandidate(sessionId, candidateId)`
    async fn candidate(
        &self,
        session: SessionId,
        candidate: CandidateId,
    ) -> Result<CandidateRecord, LedgerError>;

    /// `hasVoted(sessionId, address)`
    async fn has_voted(&self, session: SessionId, voter: &Address) -> Result<bool, LedgerError>;

    /// `adminAddress()`
    async fn admin_address(&self) -> Result<Address, LedgerError>;
}

/// Read access to the whitelist.
#[async_trait]
pub trait WhitelistReader: Send + Sync {
    /// `whitelistRequired()`
    async fn whitelist_required(&self) -> Result<bool, LedgerError>;

    /// `isVoterWhitelisted(address)`
    async fn is_voter_whitelisted(&self, voter: &Address) -> Result<bool, LedgerError>;
}

/// Administrative session writes.
#[async_trait]
pub trait SessionAdmin: Send + Sync {
    /// `createVotingSession(start, end, description)`, times in unix seconds.
    async fn create_voting_session(
        &self,
        start_time: u64,
        end_time: u64,
        description: &str,
    ) -> Result<PendingTx, LedgerError>;

    /// `addCandidate(sessionId, name)`
    async fn add_candidate(&self, session: SessionId, name: &str)
        -> Result<PendingTx, LedgerError>;

    /// `setSessionStatus(sessionId, isActive)`
    async fn set_session_status(
        &self,
        session: SessionId,
        is_active: bool,
    ) -> Result<PendingTx, LedgerError>;
}

/// Administrative whitelist writes.
#[async_trait]
pub trait WhitelistAdmin: Send + Sync {
    /// `setWhitelistRequired(bool)`
    async fn set_whitelist_required(&self, required: bool) -> Result<PendingTx, LedgerError>;

    /// `addVoterToWhitelist(address)`
    async fn add_voter_to_whitelist(&self, voter: &Address) -> Result<PendingTx, LedgerError>;

    /// `addMultipleVotersToWhitelist(address[])`
    async fn add_multiple_voters_to_whitelist(
        &self,
        voters: &[Address],
    ) -> Result<PendingTx, LedgerError>;

    /// `removeVoterFromWhitelist(address)`
    async fn remove_voter_from_whitelist(&self, voter: &Address)
        -> Result<PendingTx, LedgerError>;
}

/// Casting votes.
#[async_trait]
pub trait VoteSubmitter: Send + Sync {
    /// `vote(sessionId, candidateId)`, signed by the gateway's account.
    async fn vote(&self, session: SessionId, candidate: CandidateId)
        -> Result<PendingTx, LedgerError>;
}

/// The full contract surface.
pub trait Ledger:
    SessionReader + WhitelistReader + SessionAdmin + WhitelistAdmin + VoteSubmitter
{
}

impl<T> Ledger for T where
    T: SessionReader + WhitelistReader + SessionAdmin + WhitelistAdmin + VoteSubmitter
{
}
