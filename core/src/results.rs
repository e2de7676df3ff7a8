//! Result aggregation for sessions.
//!
//! Pure over a [`Session`]: the same candidates always give the same total,
//! outcome and percentages.

use serde::Serialize;
use tally_types::{CandidateId, SessionId, Timestamp};

use crate::model::{Session, Snapshot};

/// How a session came out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "candidate")]
pub enum Outcome {
    /// One candidate strictly ahead of all others.
    Winner(CandidateId),
    /// Two or more candidates share the highest, non-zero tally.
    Tie,
    /// No votes were cast (or there are no candidates).
    NoVotes,
}

/// One row of the result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub candidate: CandidateId,
    pub name: String,
    pub vote_count: u64,
    /// Share of the total, whole percent rounded half up; 0 when nobody voted.
    pub percentage: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionResult {
    pub session: SessionId,
    pub description: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub total_votes: u64,
    pub outcome: Outcome,
    /// Descending by votes; equal tallies keep ledger order.
    pub standings: Vec<Standing>,
    /// The viewer's vote flag, when the session was fetched for a viewer.
    pub has_voted: Option<bool>,
}

impl SessionResult {
    pub fn winner(&self) -> Option<&Standing> {
        match self.outcome {
            Outcome::Winner(id) => self.standings.iter().find(|s| s.candidate == id),
            _ => None,
        }
    }

    pub fn is_tie(&self) -> bool {
        self.outcome == Outcome::Tie
    }
}

/// Tally `session`.
pub fn aggregate(session: &Session) -> SessionResult {
    let total_votes = session
        .candidates
        .iter()
        .fold(0u64, |acc, c| acc.saturating_add(c.vote_count));

    let mut standings: Vec<Standing> = session
        .candidates
        .iter()
        .map(|c| Standing {
            candidate: c.id,
            name: c.name.clone(),
            vote_count: c.vote_count,
            percentage: percentage(c.vote_count, total_votes),
        })
        .collect();
    // `sort_by` is stable.
    standings.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

    SessionResult {
        session: session.id,
        description: session.description.clone(),
        start_time: session.start_time,
        end_time: session.end_time,
        total_votes,
        outcome: outcome(&standings),
        standings,
        has_voted: session.has_voted,
    }
}

fn outcome(sorted: &[Standing]) -> Outcome {
    match sorted {
        [] => Outcome::NoVotes,
        [first, ..] if first.vote_count == 0 => Outcome::NoVotes,
        [first, second, ..] if second.vote_count == first.vote_count => Outcome::Tie,
        [first, ..] => Outcome::Winner(first.candidate),
    }
}

/// `votes / total` in whole percent, rounded half up.
pub fn percentage(votes: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let (votes, total) = (u128::from(votes), u128::from(total));
    ((votes * 200 + total) / (2 * total)) as u64
}

/// Results of every session in `snapshot` whose window has closed by `now`,
/// most recently ended first.
pub fn history(snapshot: &Snapshot, now: Timestamp) -> Vec<SessionResult> {
    let mut ended: Vec<&Session> = snapshot
        .sessions
        .iter()
        .filter(|s| now > s.end_time)
        .collect();
    ended.sort_by(|a, b| b.end_time.cmp(&a.end_time));
    ended.into_iter().map(aggregate).collect()
}
