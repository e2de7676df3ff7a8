//! Session repository.
//!
//! A fetch reads the session count, then every session's details, then for
//! each kept session its candidates (and the viewer's vote flag), all
//! independent reads in flight at once. The pieces are assembled into a
//! [`Snapshot`] only after every read succeeded; a single failed read fails
//! the whole fetch and leaves the previously published snapshot in place.

use futures_util::future::{try_join, try_join_all};
use std::sync::{Arc, Mutex, PoisonError};
use tally_ledger::{LedgerError, SessionReader};
use tally_types::{Address, CandidateId, Clock, SessionId, Timestamp};
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::guard::{Publication, SequenceGuard};
use crate::model::{Candidate, Session, SessionQuery, Snapshot};

pub struct SessionRepository {
    reader: Arc<dyn SessionReader>,
    clock: Arc<dyn Clock>,
    guard: SequenceGuard<Snapshot>,
    last_query: Mutex<SessionQuery>,
}

impl SessionRepository {
    pub fn new(reader: Arc<dyn SessionReader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader,
            clock,
            guard: SequenceGuard::new(),
            last_query: Mutex::new(SessionQuery::default()),
        }
    }

    /// Fetch every session admitted by `query` and publish the result.
    ///
    /// Returns the snapshot that is current once this fetch has resolved:
    /// its own, or a newer one if a later fetch published first.
    pub async fn fetch_all(&self, query: SessionQuery) -> Result<Arc<Snapshot>, ClientError> {
        let ticket = self.guard.begin();
        *self.last_query.lock().unwrap_or_else(PoisonError::into_inner) = query;
        debug!(sequence = ticket.sequence(), filter = ?query.filter, "fetching sessions");

        let now = self.clock.now();
        let sessions = self.read_sessions(&query, now).await.map_err(|err| {
            warn!(sequence = ticket.sequence(), error = %err, "session fetch failed");
            ClientError::from(err)
        })?;

        let snapshot = Snapshot {
            sequence: ticket.sequence(),
            fetched_at: now,
            filter: query.filter,
            viewer: query.viewer,
            sessions,
        };

        match self.guard.publish(ticket, snapshot) {
            Publication::Published(snapshot) => {
                info!(
                    sequence = snapshot.sequence,
                    sessions = snapshot.sessions.len(),
                    "published session snapshot"
                );
                Ok(snapshot)
            }
            Publication::Superseded { current } => {
                debug!(
                    stale = ticket.sequence(),
                    current = current.sequence,
                    "discarded superseded session fetch"
                );
                Ok(current)
            }
        }
    }

    /// Re-run the most recent query.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, ClientError> {
        let query = *self.last_query.lock().unwrap_or_else(PoisonError::into_inner);
        self.fetch_all(query).await
    }

    /// The published snapshot, if any fetch has completed.
    pub fn current(&self) -> Option<Arc<Snapshot>> {
        self.guard.latest()
    }

    /// Read `voter`'s vote flag for `session` straight from the ledger.
    pub async fn has_voted(
        &self,
        session: SessionId,
        voter: &Address,
    ) -> Result<bool, ClientError> {
        let voted = self.reader.has_voted(session, voter).await?;
        debug!(%session, %voter, voted, "read vote flag");
        Ok(voted)
    }

    async fn read_sessions(
        &self,
        query: &SessionQuery,
        now: Timestamp,
    ) -> Result<Vec<Session>, LedgerError> {
        let count = self.reader.sessions_count().await?;
        let sessions =
            try_join_all((0..count).map(|i| self.read_session(SessionId(i), query, now))).await?;
        Ok(sessions.into_iter().flatten().collect())
    }

    async fn read_session(
        &self,
        id: SessionId,
        query: &SessionQuery,
        now: Timestamp,
    ) -> Result<Option<Session>, LedgerError> {
        let record = self.reader.session_details(id).await?;
        let end_time = Timestamp::from_unix_secs(record.end_time);
        if !query.filter.admits(record.is_active, end_time, now) {
            return Ok(None);
        }

        let (candidates, has_voted) = try_join(
            self.read_candidates(id),
            self.read_vote_flag(id, query.viewer.as_ref()),
        )
        .await?;
        Ok(Some(Session::from_record(record, candidates, has_voted)))
    }

    async fn read_candidates(&self, session: SessionId) -> Result<Vec<Candidate>, LedgerError> {
        let count = self.reader.candidates_count(session).await?;
        let records =
            try_join_all((0..count).map(|j| self.reader.candidate(session, CandidateId(j)))).await?;
        Ok(records.into_iter().map(Candidate::from).collect())
    }

    async fn read_vote_flag(
        &self,
        session: SessionId,
        viewer: Option<&Address>,
    ) -> Result<Option<bool>, LedgerError> {
        match viewer {
            Some(viewer) => self.reader.has_voted(session, viewer).await.map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SessionFilter;
    use tally_nullables::{NullClock, NullLedger, ReadCall};

    const ADMIN: Address = Address::new([0xAA; 20]);
    const VOTER: Address = Address::new([0x11; 20]);

    fn setup() -> (NullLedger, Arc<NullClock>, SessionRepository) {
        let clock = Arc::new(NullClock::new(1_000));
        let ledger = NullLedger::new(ADMIN, clock.clone());
        let repo = SessionRepository::new(Arc::new(ledger.clone()), clock.clone());
        (ledger, clock, repo)
    }

    #[tokio::test]
    async fn assembles_sessions_with_candidates_in_ledger_order() {
        let (ledger, _clock, repo) = setup();
        let s0 = ledger.seed_session(900, 1_100, "Board", true);
        ledger.seed_candidate(s0, "Alice", 3);
        ledger.seed_candidate(s0, "Bob", 1);
        let s1 = ledger.seed_session(2_000, 3_000, "Budget", true);

        let snapshot = repo.fetch_all(SessionQuery::default()).await.unwrap();

        assert_eq!(snapshot.sessions.len(), 2);
        assert_eq!(snapshot.sessions[0].id, s0);
        assert_eq!(snapshot.sessions[1].id, s1);
        let names: Vec<_> = snapshot.sessions[0]
            .candidates
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, ["Alice", "Bob"]);
        assert!(snapshot.sessions[1].candidates.is_empty());
        assert_eq!(snapshot.fetched_at, Timestamp::new(1_000));
        assert_eq!(snapshot.sessions[0].has_voted, None);
    }

    #[tokio::test]
    async fn empty_ledger_yields_empty_snapshot() {
        let (_ledger, _clock, repo) = setup();
        let snapshot = repo.fetch_all(SessionQuery::default()).await.unwrap();
        assert!(snapshot.is_empty());
        assert_eq!(repo.current().unwrap().sequence, snapshot.sequence);
    }

    #[tokio::test]
    async fn filtered_out_sessions_skip_candidate_reads() {
        let (ledger, _clock, repo) = setup();
        let inactive = ledger.seed_session(900, 1_100, "Paused", false);
        ledger.seed_candidate(inactive, "Alice", 0);
        let active = ledger.seed_session(900, 1_100, "Live", true);

        let snapshot = repo
            .fetch_all(SessionQuery::new(SessionFilter::FlagActive))
            .await
            .unwrap();

        assert_eq!(snapshot.sessions.len(), 1);
        assert_eq!(snapshot.sessions[0].id, active);
        assert!(!ledger
            .reads()
            .contains(&ReadCall::CandidatesCount(inactive)));
    }

    #[tokio::test]
    async fn viewer_flag_is_read_per_session() {
        let (ledger, _clock, repo) = setup();
        let s0 = ledger.seed_session(900, 1_100, "Board", true);
        let s1 = ledger.seed_session(900, 1_100, "Budget", true);
        ledger.seed_voter(s1, VOTER);

        let snapshot = repo
            .fetch_all(SessionQuery::default().for_viewer(VOTER))
            .await
            .unwrap();

        assert_eq!(snapshot.session(s0).unwrap().has_voted, Some(false));
        assert_eq!(snapshot.session(s1).unwrap().has_voted, Some(true));
    }

    #[tokio::test]
    async fn failed_read_keeps_previous_snapshot() {
        let (ledger, _clock, repo) = setup();
        let s0 = ledger.seed_session(900, 1_100, "Board", true);
        ledger.seed_candidate(s0, "Alice", 0);
        let first = repo.fetch_all(SessionQuery::default()).await.unwrap();

        ledger.fail_next_candidate_reads(1);
        let err = repo.fetch_all(SessionQuery::default()).await.unwrap_err();

        assert!(matches!(err, ClientError::NetworkOrLedger(_)));
        assert_eq!(repo.current().unwrap().sequence, first.sequence);
    }

    #[tokio::test]
    async fn refresh_reuses_the_last_query() {
        let (ledger, _clock, repo) = setup();
        ledger.seed_session(900, 1_100, "Paused", false);
        ledger.seed_session(900, 1_100, "Live", true);
        repo.fetch_all(SessionQuery::new(SessionFilter::FlagActive).for_viewer(VOTER))
            .await
            .unwrap();

        let refreshed = repo.refresh().await.unwrap();
        assert_eq!(refreshed.filter, SessionFilter::FlagActive);
        assert_eq!(refreshed.viewer, Some(VOTER));
        assert_eq!(refreshed.sessions.len(), 1);
    }
}
