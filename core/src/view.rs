//! Derived dashboard views over a snapshot.

use serde::Serialize;
use tally_types::{Address, Timestamp};

use crate::model::{Session, Snapshot};
use crate::roles::Role;
use crate::status::SessionStatus;
use crate::whitelist::WhitelistSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct SessionView<'a> {
    pub session: &'a Session,
    pub status: SessionStatus,
    /// Whether the vote affordance should be offered to the viewer.
    pub can_vote: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dashboard<'a> {
    pub active: Vec<SessionView<'a>>,
    pub upcoming: Vec<SessionView<'a>>,
}

/// Split `snapshot` into active and upcoming sessions for `viewer`.
///
/// Inactive and ended sessions appear in neither list. Admins never get a
/// vote affordance.
pub fn dashboard<'a>(
    snapshot: &'a Snapshot,
    now: Timestamp,
    whitelist: &WhitelistSnapshot,
    viewer: &Address,
    role: Role,
) -> Dashboard<'a> {
    let mut active = Vec::new();
    let mut upcoming = Vec::new();
    for session in &snapshot.sessions {
        let status = session.status(now);
        let can_vote = status.accepts_votes()
            && snapshot.vote_flag(session.id, viewer) != Some(true)
            && whitelist.allows(viewer)
            && role != Role::Admin;
        let view = SessionView {
            session,
            status,
            can_vote,
        };
        match status {
            SessionStatus::Active => active.push(view),
            SessionStatus::Upcoming => upcoming.push(view),
            SessionStatus::Inactive | SessionStatus::Ended => {}
        }
    }
    Dashboard { active, upcoming }
}

/// Candidates can only be added while a session is flag-active and has not
/// started yet.
pub fn accepts_candidates(session: &Session, now: Timestamp) -> bool {
    session.is_active && session.start_time > now
}

/// Sessions an admin may still add candidates to.
pub fn candidate_targets(snapshot: &Snapshot, now: Timestamp) -> Vec<&Session> {
    snapshot
        .sessions
        .iter()
        .filter(|s| accepts_candidates(s, now))
        .collect()
}
