//! Immutable client-side view of ledger state.

use serde::Serialize;
use std::sync::Arc;
use tally_ledger::{CandidateRecord, SessionRecord, TxReceipt};
use tally_types::{Address, CandidateId, SessionId, Timestamp};

use crate::status::{self, SessionStatus};

/// A candidate with its running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub name: String,
    pub vote_count: u64,
}

impl From<CandidateRecord> for Candidate {
    fn from(record: CandidateRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            vote_count: record.vote_count,
        }
    }
}

/// A voting session as read from the ledger, with its candidates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    /// Admin-controlled activation flag.
    pub is_active: bool,
    pub description: String,
    /// In ledger order.
    pub candidates: Vec<Candidate>,
    /// Whether the viewer of the fetch has voted; `None` when the fetch had
    /// no viewer.
    pub has_voted: Option<bool>,
}

impl Session {
    pub fn from_record(
        record: SessionRecord,
        candidates: Vec<Candidate>,
        has_voted: Option<bool>,
    ) -> Self {
        Self {
            id: record.id,
            start_time: Timestamp::from_unix_secs(record.start_time),
            end_time: Timestamp::from_unix_secs(record.end_time),
            is_active: record.is_active,
            description: record.description,
            candidates,
            has_voted,
        }
    }

    pub fn status(&self, now: Timestamp) -> SessionStatus {
        status::resolve(self, now)
    }

    pub fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }
}

/// Which sessions a fetch keeps after reading their details.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFilter {
    #[default]
    All,
    /// Only sessions whose activation flag is set.
    FlagActive,
    /// Only sessions whose window has closed, whatever their flag.
    Ended,
}

impl SessionFilter {
    pub fn admits(&self, is_active: bool, end_time: Timestamp, now: Timestamp) -> bool {
        match self {
            SessionFilter::All => true,
            SessionFilter::FlagActive => is_active,
            SessionFilter::Ended => now > end_time,
        }
    }
}

/// Parameters of a session fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionQuery {
    pub filter: SessionFilter,
    /// Address whose per-session vote flag is read alongside each session.
    pub viewer: Option<Address>,
}

impl SessionQuery {
    pub fn new(filter: SessionFilter) -> Self {
        Self {
            filter,
            viewer: None,
        }
    }

    pub fn for_viewer(mut self, viewer: Address) -> Self {
        self.viewer = Some(viewer);
        self
    }
}

/// The result of one complete fetch. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    /// Issue order of the fetch that produced this snapshot.
    pub sequence: u64,
    pub fetched_at: Timestamp,
    pub filter: SessionFilter,
    pub viewer: Option<Address>,
    /// Ascending by id.
    pub sessions: Vec<Session>,
}

impl Snapshot {
    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// `voter`'s vote flag for session `id`, known only when this snapshot
    /// was fetched for `voter`.
    pub fn vote_flag(&self, id: SessionId, voter: &Address) -> Option<bool> {
        if self.viewer.as_ref() != Some(voter) {
            return None;
        }
        self.session(id)?.has_voted
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// A confirmed write together with the state re-read after it.
///
/// `refreshed` is `None` when the follow-up fetch failed; the write itself
/// still succeeded.
#[derive(Debug, Clone)]
pub struct WriteOutcome<S> {
    pub tx: TxReceipt,
    pub refreshed: Option<Arc<S>>,
}
