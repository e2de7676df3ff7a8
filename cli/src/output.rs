//! Plain-text rendering of client views.

use std::fmt::Write;
use tally_core::{Outcome, Session, SessionResult, SessionView};
use tally_types::Timestamp;
use tally_utils::format_relative;

pub fn session_line(session: &Session, now: Timestamp) -> String {
    let status = session.status(now);
    let mut line = format!(
        "{} [{}] {} (opens {}, closes {})",
        session.id,
        status,
        session.description,
        format_relative(now, session.start_time),
        format_relative(now, session.end_time),
    );
    match session.has_voted {
        Some(true) => line.push_str(" - voted"),
        Some(false) => line.push_str(" - not voted"),
        None => {}
    }
    line
}

pub fn session_block(session: &Session, now: Timestamp) -> String {
    let mut out = session_line(session, now);
    for candidate in &session.candidates {
        let _ = write!(
            out,
            "\n    {:>3}  {:<24} {:>6} votes",
            candidate.id, candidate.name, candidate.vote_count
        );
    }
    out
}

pub fn view_block(view: &SessionView<'_>, now: Timestamp) -> String {
    let mut out = session_block(view.session, now);
    if view.can_vote {
        out.push_str("\n    -> you can vote in this session");
    }
    out
}

pub fn result_block(result: &SessionResult) -> String {
    let headline = match result.outcome {
        Outcome::Winner(_) => match result.winner() {
            Some(winner) => format!("winner: {}", winner.name),
            None => "winner: unknown".to_string(),
        },
        Outcome::Tie => "tie".to_string(),
        Outcome::NoVotes => "no votes cast".to_string(),
    };
    let mut out = format!(
        "{} {} - {} ({} votes)",
        result.session, result.description, headline, result.total_votes
    );
    for standing in &result.standings {
        let _ = write!(
            out,
            "\n    {:<24} {:>6} votes {:>4}%",
            standing.name, standing.vote_count, standing.percentage
        );
    }
    if result.has_voted == Some(true) {
        out.push_str("\n    -> you voted in this session");
    }
    out
}

/// Sessions that still take candidates, one line each.
pub fn target_list(targets: &[&Session], now: Timestamp) -> String {
    if targets.is_empty() {
        return "no session is open to new candidates".to_string();
    }
    let mut out = String::from("sessions open to new candidates:");
    for session in targets {
        let _ = write!(out, "\n    {}", session_line(session, now));
    }
    out
}
