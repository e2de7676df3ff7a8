//! Session lifecycle.
//!
//! A session's status is never stored. It is derived from the activation
//! flag, the voting window and the current time, so the same snapshot can
//! move from `Upcoming` to `Active` to `Ended` as the clock advances without
//! any ledger read.

use serde::Serialize;
use std::fmt;
use tally_types::Timestamp;

use crate::model::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Deactivated by an admin, whatever the window says.
    Inactive,
    Upcoming,
    Active,
    Ended,
}

impl SessionStatus {
    pub fn accepts_votes(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Inactive => "inactive",
            SessionStatus::Upcoming => "upcoming",
            SessionStatus::Active => "active",
            SessionStatus::Ended => "ended",
        };
        f.write_str(label)
    }
}

/// Status of `session` at `now`.
pub fn resolve(session: &Session, now: Timestamp) -> SessionStatus {
    resolve_window(session.is_active, session.start_time, session.end_time, now)
}

/// The flag wins over the window. Both window bounds are inclusive for
/// `Active`.
pub fn resolve_window(
    is_active: bool,
    start_time: Timestamp,
    end_time: Timestamp,
    now: Timestamp,
) -> SessionStatus {
    if !is_active {
        SessionStatus::Inactive
    } else if now < start_time {
        SessionStatus::Upcoming
    } else if now > end_time {
        SessionStatus::Ended
    } else {
        SessionStatus::Active
    }
}
