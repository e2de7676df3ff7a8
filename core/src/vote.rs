//! Vote coordination.
//!
//! One vote attempt per `(session, voter)` walks an explicit state machine:
//!
//! ```text
//! Idle -> Validating -> Submitting -> AwaitingConfirmation -> Confirmed
//!             |              |                 |
//!             +--------------+-----------------+------------> Rejected
//! ```
//!
//! Validation failures reject without contacting the ledger. While an
//! attempt is between `Validating` and its terminal phase, a second attempt
//! for the same key is refused with [`ClientError::AlreadyPending`]. After
//! confirmation the session repository is re-fetched; tallies are never
//! bumped locally.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tally_ledger::{TxReceipt, VoteSubmitter};
use tally_types::{Address, CandidateId, Clock, SessionId};
use tracing::{debug, info, warn};

use crate::error::{ClientError, ValidationError};
use crate::model::{Snapshot, WriteOutcome};
use crate::repository::SessionRepository;
use crate::whitelist::WhitelistSnapshot;

/// Single-flight key of a vote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct VoteKey {
    pub session: SessionId,
    pub voter: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VotePhase {
    Idle,
    Validating,
    Submitting,
    AwaitingConfirmation,
    Confirmed,
    Rejected(ClientError),
}

impl VotePhase {
    /// Whether `self -> next` is an edge of the state machine.
    pub fn can_advance_to(&self, next: &VotePhase) -> bool {
        use VotePhase::*;
        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Submitting)
                | (Submitting, AwaitingConfirmation)
                | (AwaitingConfirmation, Confirmed)
                | (Validating | Submitting | AwaitingConfirmation, Rejected(_))
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VotePhase::Confirmed | VotePhase::Rejected(_))
    }

    /// Between leaving `Idle` and reaching a terminal phase.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            VotePhase::Validating | VotePhase::Submitting | VotePhase::AwaitingConfirmation
        )
    }
}

type PhaseTable = Arc<Mutex<HashMap<VoteKey, VotePhase>>>;

fn lock(table: &PhaseTable) -> MutexGuard<'_, HashMap<VoteKey, VotePhase>> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A live attempt. Owns its key in the phase table; dropping it before a
/// terminal phase forgets the attempt.
struct Attempt {
    key: VoteKey,
    phase: VotePhase,
    table: PhaseTable,
}

impl Attempt {
    fn begin(table: &PhaseTable, key: VoteKey) -> Option<Attempt> {
        let mut phases = lock(table);
        if phases.get(&key).is_some_and(VotePhase::is_in_flight) {
            return None;
        }
        phases.insert(key, VotePhase::Validating);
        Some(Attempt {
            key,
            phase: VotePhase::Validating,
            table: Arc::clone(table),
        })
    }

    fn advance(&mut self, next: VotePhase) {
        debug_assert!(
            self.phase.can_advance_to(&next),
            "illegal vote transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!(session = %self.key.session, voter = %self.key.voter, phase = ?next, "vote phase");
        lock(&self.table).insert(self.key, next.clone());
        self.phase = next;
    }

    fn reject(&mut self, err: ClientError) -> ClientError {
        self.advance(VotePhase::Rejected(err.clone()));
        err
    }
}

impl Drop for Attempt {
    fn drop(&mut self) {
        if !self.phase.is_terminal() {
            lock(&self.table).remove(&self.key);
        }
    }
}

pub struct VoteCoordinator {
    submitter: Arc<dyn VoteSubmitter>,
    sessions: Arc<SessionRepository>,
    clock: Arc<dyn Clock>,
    phases: PhaseTable,
}

impl VoteCoordinator {
    pub fn new(
        submitter: Arc<dyn VoteSubmitter>,
        sessions: Arc<SessionRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            submitter,
            sessions,
            clock,
            phases: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Latest phase of the attempt for `(session, voter)`; `Idle` if none.
    pub fn phase(&self, session: SessionId, voter: &Address) -> VotePhase {
        lock(&self.phases)
            .get(&VoteKey {
                session,
                voter: *voter,
            })
            .cloned()
            .unwrap_or(VotePhase::Idle)
    }

    /// Cast `voter`'s vote for `candidate` in `session`.
    ///
    /// `snapshot` and `whitelist` are the views the caller decided on; the
    /// pre-checks run against them and the current clock. The vote flag is
    /// taken from `snapshot` only when it was fetched for `voter`, otherwise
    /// it is read from the ledger. The submitter must sign as `voter`.
    pub async fn cast_vote(
        &self,
        snapshot: &Snapshot,
        session: SessionId,
        candidate: CandidateId,
        voter: Address,
        whitelist: &WhitelistSnapshot,
    ) -> Result<WriteOutcome<Snapshot>, ClientError> {
        let key = VoteKey { session, voter };
        let Some(mut attempt) = Attempt::begin(&self.phases, key) else {
            debug!(%session, %voter, "vote already pending");
            return Err(ClientError::AlreadyPending);
        };

        if let Err(err) = self
            .validate(snapshot, session, candidate, &voter, whitelist)
            .await
        {
            info!(%session, %voter, error = %err, "vote rejected before submission");
            return Err(attempt.reject(err));
        }

        attempt.advance(VotePhase::Submitting);
        let pending = match self.submitter.vote(session, candidate).await {
            Ok(pending) => pending,
            Err(err) => {
                warn!(%session, error = %err, "vote submission failed");
                return Err(attempt.reject(err.into()));
            }
        };

        attempt.advance(VotePhase::AwaitingConfirmation);
        info!(%session, tx = %pending.hash(), "vote submitted, awaiting confirmation");
        let tx: TxReceipt = match pending.confirmed().await {
            Ok(receipt) => receipt,
            Err(err) => {
                warn!(%session, error = %err, "vote not confirmed");
                return Err(attempt.reject(err.into()));
            }
        };

        attempt.advance(VotePhase::Confirmed);
        info!(%session, tx = %tx.hash, block = tx.block, "vote confirmed");

        let refreshed = match self.sessions.refresh().await {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                warn!(error = %err, "refresh after vote failed");
                None
            }
        };
        Ok(WriteOutcome { tx, refreshed })
    }

    async fn validate(
        &self,
        snapshot: &Snapshot,
        id: SessionId,
        candidate: CandidateId,
        voter: &Address,
        whitelist: &WhitelistSnapshot,
    ) -> Result<(), ClientError> {
        let session = snapshot
            .session(id)
            .ok_or(ValidationError::UnknownSession(id))?;
        if !session.status(self.clock.now()).accepts_votes() {
            return Err(ClientError::NotActive);
        }
        let voted = match snapshot.vote_flag(id, voter) {
            Some(voted) => voted,
            None => self.sessions.has_voted(id, voter).await?,
        };
        if voted {
            return Err(ClientError::AlreadyVoted);
        }
        if !whitelist.allows(voter) {
            return Err(ClientError::NotWhitelisted);
        }
        if session.candidate(candidate).is_none() {
            return Err(ValidationError::UnknownCandidate {
                session: id,
                candidate,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Candidate, Session, SessionFilter, SessionQuery};
    use tally_nullables::{NullClock, NullLedger, ReadCall};
    use tally_types::Timestamp;

    const ADMIN: Address = Address::new([0xAA; 20]);
    const VOTER: Address = Address::new([0x11; 20]);
    const ALICE: Address = Address::new([0xA1; 20]);
    const BOB: Address = Address::new([0xB0; 20]);

    #[test]
    fn transitions_follow_the_machine() {
        use VotePhase::*;
        assert!(Idle.can_advance_to(&Validating));
        assert!(Validating.can_advance_to(&Submitting));
        assert!(Submitting.can_advance_to(&AwaitingConfirmation));
        assert!(AwaitingConfirmation.can_advance_to(&Confirmed));
        assert!(Validating.can_advance_to(&Rejected(ClientError::NotActive)));
        assert!(AwaitingConfirmation.can_advance_to(&Rejected(ClientError::AlreadyVoted)));

        assert!(!Idle.can_advance_to(&Submitting));
        assert!(!Validating.can_advance_to(&Confirmed));
        assert!(!Submitting.can_advance_to(&Confirmed));
        assert!(!Confirmed.can_advance_to(&Rejected(ClientError::NotActive)));
        assert!(!Rejected(ClientError::NotActive).can_advance_to(&Validating));
        assert!(!Idle.can_advance_to(&Rejected(ClientError::NotActive)));
    }

    #[test]
    fn terminal_and_in_flight_are_disjoint() {
        let phases = [
            VotePhase::Idle,
            VotePhase::Validating,
            VotePhase::Submitting,
            VotePhase::AwaitingConfirmation,
            VotePhase::Confirmed,
            VotePhase::Rejected(ClientError::AlreadyPending),
        ];
        for phase in &phases {
            assert!(!(phase.is_terminal() && phase.is_in_flight()), "{phase:?}");
        }
        assert!(!VotePhase::Idle.is_terminal() && !VotePhase::Idle.is_in_flight());
    }

    fn snapshot(start: u64, end: u64, has_voted: Option<bool>) -> Snapshot {
        Snapshot {
            sequence: 1,
            fetched_at: Timestamp::new(1_000),
            filter: SessionFilter::All,
            viewer: has_voted.map(|_| VOTER),
            sessions: vec![Session {
                id: SessionId(0),
                start_time: Timestamp::new(start),
                end_time: Timestamp::new(end),
                is_active: true,
                description: "Board".into(),
                candidates: vec![Candidate {
                    id: CandidateId(0),
                    name: "Alice".into(),
                    vote_count: 0,
                }],
                has_voted,
            }],
        }
    }

    fn coordinator_for(
        account: Address,
        now: u64,
    ) -> (NullLedger, Arc<SessionRepository>, VoteCoordinator) {
        let clock = Arc::new(NullClock::new(now));
        let ledger = NullLedger::new(ADMIN, clock.clone());
        let signer = Arc::new(ledger.as_account(account));
        let repo = Arc::new(SessionRepository::new(signer.clone(), clock.clone()));
        let votes = VoteCoordinator::new(signer, repo.clone(), clock);
        (ledger, repo, votes)
    }

    fn coordinator(now: u64) -> (NullLedger, VoteCoordinator) {
        let (ledger, _repo, votes) = coordinator_for(VOTER, now);
        (ledger, votes)
    }

    #[tokio::test]
    async fn validation_failures_never_reach_the_ledger() {
        let (ledger, votes) = coordinator(1_000);
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));
        let id = SessionId(0);

        let upcoming = snapshot(2_000, 3_000, Some(false));
        let err = votes.cast_vote(&upcoming, id, CandidateId(0), VOTER, &open).await;
        assert_eq!(err.unwrap_err(), ClientError::NotActive);

        let voted = snapshot(500, 3_000, Some(true));
        let err = votes.cast_vote(&voted, id, CandidateId(0), VOTER, &open).await;
        assert_eq!(err.unwrap_err(), ClientError::AlreadyVoted);

        let closed = WhitelistSnapshot {
            required: true,
            ..WhitelistSnapshot::open(Timestamp::new(1_000))
        };
        let live = snapshot(500, 3_000, Some(false));
        let err = votes.cast_vote(&live, id, CandidateId(0), VOTER, &closed).await;
        assert_eq!(err.unwrap_err(), ClientError::NotWhitelisted);

        let err = votes.cast_vote(&live, SessionId(7), CandidateId(0), VOTER, &open).await;
        assert_eq!(
            err.unwrap_err(),
            ClientError::Validation(ValidationError::UnknownSession(SessionId(7)))
        );

        let err = votes.cast_vote(&live, id, CandidateId(9), VOTER, &open).await;
        assert!(matches!(
            err.unwrap_err(),
            ClientError::Validation(ValidationError::UnknownCandidate { .. })
        ));

        assert!(ledger.writes().is_empty());
        assert!(matches!(
            votes.phase(id, &VOTER),
            VotePhase::Rejected(ClientError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn another_viewers_flag_does_not_block_the_voter() {
        let (ledger, repo, votes) = coordinator_for(BOB, 1_000);
        let id = ledger.seed_session(500, 3_000, "Board", true);
        let carol = ledger.seed_candidate(id, "Carol", 0);
        ledger.seed_voter(id, ALICE);
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));

        let seen_by_alice = repo
            .fetch_all(SessionQuery::default().for_viewer(ALICE))
            .await
            .unwrap();
        assert_eq!(seen_by_alice.session(id).unwrap().has_voted, Some(true));

        votes.cast_vote(&seen_by_alice, id, carol, BOB, &open).await.unwrap();

        assert_eq!(ledger.writes().len(), 1);
        assert_eq!(ledger.vote_count(id, carol), Some(1));
        assert!(ledger.reads().contains(&ReadCall::HasVoted(id, BOB)));
        assert_eq!(votes.phase(id, &BOB), VotePhase::Confirmed);
    }

    #[tokio::test]
    async fn unknown_vote_flag_is_read_before_submitting() {
        let (ledger, repo, votes) = coordinator_for(VOTER, 1_000);
        let id = ledger.seed_session(500, 3_000, "Board", true);
        let carol = ledger.seed_candidate(id, "Carol", 0);
        ledger.seed_voter(id, VOTER);
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));

        let anonymous = repo.fetch_all(SessionQuery::default()).await.unwrap();
        assert_eq!(anonymous.viewer, None);

        let err = votes
            .cast_vote(&anonymous, id, carol, VOTER, &open)
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::AlreadyVoted);
        assert!(ledger.writes().is_empty());
        assert!(ledger.reads().contains(&ReadCall::HasVoted(id, VOTER)));
    }

    #[tokio::test]
    async fn confirmed_vote_refreshes_sessions() {
        let (ledger, repo, votes) = coordinator_for(VOTER, 1_000);
        let id = ledger.seed_session(500, 3_000, "Board", true);
        let alice = ledger.seed_candidate(id, "Alice", 0);
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));
        let before = repo
            .fetch_all(SessionQuery::default().for_viewer(VOTER))
            .await
            .unwrap();

        let outcome = votes
            .cast_vote(&before, id, alice, VOTER, &open)
            .await
            .unwrap();

        assert_eq!(votes.phase(id, &VOTER), VotePhase::Confirmed);
        let refreshed = outcome.refreshed.unwrap();
        assert_eq!(refreshed.session(id).unwrap().candidates[0].vote_count, 1);
        assert_eq!(refreshed.session(id).unwrap().has_voted, Some(true));
        assert_eq!(ledger.vote_count(id, alice), Some(1));
    }

    #[tokio::test]
    async fn ledger_rejection_is_classified() {
        let (ledger, votes) = coordinator(1_000);
        let id = ledger.seed_session(500, 3_000, "Board", true);
        let alice = ledger.seed_candidate(id, "Alice", 0);
        ledger.seed_voter(id, VOTER);
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));

        // Local view is stale: it still believes the voter has not voted.
        let err = votes
            .cast_vote(&snapshot(500, 3_000, Some(false)), id, alice, VOTER, &open)
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::AlreadyVoted);
        assert_eq!(ledger.writes().len(), 1);
        assert_eq!(
            votes.phase(id, &VOTER),
            VotePhase::Rejected(ClientError::AlreadyVoted)
        );
    }

    #[tokio::test]
    async fn post_confirmation_revert_with_unknown_reason() {
        let (ledger, votes) = coordinator(1_000);
        let id = ledger.seed_session(500, 3_000, "Board", true);
        let alice = ledger.seed_candidate(id, "Alice", 0);
        ledger.revert_next_confirmation("out of gas");
        let open = WhitelistSnapshot::open(Timestamp::new(1_000));

        let err = votes
            .cast_vote(&snapshot(500, 3_000, Some(false)), id, alice, VOTER, &open)
            .await
            .unwrap_err();

        assert_eq!(err, ClientError::UnknownRejection("out of gas".into()));
        assert_eq!(ledger.vote_count(id, alice), Some(0));
    }
}
