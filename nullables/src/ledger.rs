//! Nullable ledger: an in-memory voting contract.
//!
//! Implements every capability trait of `tally-ledger` against local state,
//! enforcing the same rules as the deployed contract and reverting with the
//! same messages. Every call is recorded so tests can assert which reads and
//! writes actually reached the ledger.
//!
//! Two calls can be held mid-flight to script interleavings:
//! [`NullLedger::hold_next_sessions_count`] and
//! [`NullLedger::hold_next_confirmation`].

use async_trait::async_trait;
use futures_util::FutureExt;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tally_ledger::{
    CandidateRecord, LedgerError, PendingTx, SessionAdmin, SessionReader, SessionRecord,
    TxReceipt, VoteSubmitter, WhitelistAdmin, WhitelistReader,
};
use tally_types::{Address, CandidateId, Clock, SessionId, TxHash};
use tokio::sync::oneshot;

pub const REVERT_ONLY_ADMIN: &str = "Only admin can perform this action";
pub const REVERT_NO_SESSION: &str = "Session does not exist";
pub const REVERT_TIME_RANGE: &str = "End time must be after start time";
pub const REVERT_START_PASSED: &str = "Start time must be in the future";
pub const REVERT_SESSION_STARTED: &str = "Session has already started";
pub const REVERT_NOT_ACTIVE: &str = "Voting is not active";
pub const REVERT_ALREADY_VOTED: &str = "Already voted";
pub const REVERT_NOT_WHITELISTED: &str = "Voter is not whitelisted";
pub const REVERT_INVALID_CANDIDATE: &str = "Invalid candidate";

/// A read that reached the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadCall {
    SessionsCount,
    SessionDetails(SessionId),
    CandidatesCount(SessionId),
    Candidate(SessionId, CandidateId),
    HasVoted(SessionId, Address),
    AdminAddress,
    WhitelistRequired,
    IsVoterWhitelisted(Address),
}

/// A write submission that reached the ledger (accepted or reverted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    CreateVotingSession {
        start_time: u64,
        end_time: u64,
        description: String,
    },
    AddCandidate {
        session: SessionId,
        name: String,
    },
    SetSessionStatus {
        session: SessionId,
        is_active: bool,
    },
    SetWhitelistRequired(bool),
    AddVoterToWhitelist(Address),
    AddMultipleVotersToWhitelist(Vec<Address>),
    RemoveVoterFromWhitelist(Address),
    Vote {
        session: SessionId,
        candidate: CandidateId,
    },
}

/// Test-side handle to a call parked inside the ledger.
pub struct HeldCall {
    reached: Option<oneshot::Receiver<()>>,
    release: oneshot::Sender<()>,
}

impl HeldCall {
    /// Wait until the held call has arrived at the ledger and parked.
    pub async fn reached(&mut self) {
        if let Some(reached) = self.reached.take() {
            let _ = reached.await;
        }
    }

    /// Let the held call complete.
    pub fn release(self) {
        let _ = self.release.send(());
    }
}

/// Ledger-side half of a [`HeldCall`].
struct Hold {
    reached: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

impl Hold {
    fn pair() -> (Hold, HeldCall) {
        let (reached_tx, reached_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        (
            Hold {
                reached: reached_tx,
                release: release_rx,
            },
            HeldCall {
                reached: Some(reached_rx),
                release: release_tx,
            },
        )
    }

    /// Park until released; a dropped [`HeldCall`] releases too.
    async fn pass(self) {
        let _ = self.reached.send(());
        let _ = self.release.await;
    }
}

struct StoredSession {
    record: SessionRecord,
    candidates: Vec<CandidateRecord>,
    voters: HashSet<Address>,
}

struct State {
    admin: Address,
    sessions: Vec<StoredSession>,
    whitelist_required: bool,
    whitelist: HashSet<Address>,
    reads: Vec<ReadCall>,
    writes: Vec<WriteCall>,
    next_tx: u64,
    block_height: u64,
    held_counts: VecDeque<Hold>,
    held_confirmations: VecDeque<Hold>,
    failing_candidate_reads: u32,
    revert_next_confirmation: Option<String>,
}

impl State {
    fn session(&self, id: SessionId) -> Option<&StoredSession> {
        usize::try_from(id.as_u64())
            .ok()
            .and_then(|i| self.sessions.get(i))
    }

    fn session_mut(&mut self, id: SessionId) -> Option<&mut StoredSession> {
        usize::try_from(id.as_u64())
            .ok()
            .and_then(|i| self.sessions.get_mut(i))
    }

    /// The contract's `require` checks for `call` sent by `sender` at `now`.
    fn check(&self, call: &WriteCall, sender: &Address, now: u64) -> Result<(), &'static str> {
        if let WriteCall::Vote { session, candidate } = call {
            let stored = self.session(*session).ok_or(REVERT_NO_SESSION)?;
            let record = &stored.record;
            if !record.is_active || now < record.start_time || now > record.end_time {
                return Err(REVERT_NOT_ACTIVE);
            }
            if stored.voters.contains(sender) {
                return Err(REVERT_ALREADY_VOTED);
            }
            if self.whitelist_required && !self.whitelist.contains(sender) {
                return Err(REVERT_NOT_WHITELISTED);
            }
            if candidate.as_u64() >= stored.candidates.len() as u64 {
                return Err(REVERT_INVALID_CANDIDATE);
            }
            return Ok(());
        }

        if sender != &self.admin {
            return Err(REVERT_ONLY_ADMIN);
        }
        match call {
            WriteCall::CreateVotingSession {
                start_time,
                end_time,
                ..
            } => {
                if start_time >= end_time {
                    return Err(REVERT_TIME_RANGE);
                }
                if *start_time <= now {
                    return Err(REVERT_START_PASSED);
                }
            }
            WriteCall::AddCandidate { session, .. } => {
                let stored = self.session(*session).ok_or(REVERT_NO_SESSION)?;
                if now >= stored.record.start_time {
                    return Err(REVERT_SESSION_STARTED);
                }
            }
            WriteCall::SetSessionStatus { session, .. } => {
                self.session(*session).ok_or(REVERT_NO_SESSION)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn apply(&mut self, call: WriteCall, sender: Address) {
        match call {
            WriteCall::CreateVotingSession {
                start_time,
                end_time,
                description,
            } => {
                let id = SessionId(self.sessions.len() as u64);
                self.sessions.push(StoredSession {
                    record: SessionRecord {
                        id,
                        start_time,
                        end_time,
                        is_active: true,
                        description,
                    },
                    candidates: Vec::new(),
                    voters: HashSet::new(),
                });
            }
            WriteCall::AddCandidate { session, name } => {
                if let Some(stored) = self.session_mut(session) {
                    let id = CandidateId(stored.candidates.len() as u64);
                    stored.candidates.push(CandidateRecord {
                        id,
                        name,
                        vote_count: 0,
                    });
                }
            }
            WriteCall::SetSessionStatus { session, is_active } => {
                if let Some(stored) = self.session_mut(session) {
                    stored.record.is_active = is_active;
                }
            }
            WriteCall::SetWhitelistRequired(required) => self.whitelist_required = required,
            WriteCall::AddVoterToWhitelist(voter) => {
                self.whitelist.insert(voter);
            }
            WriteCall::AddMultipleVotersToWhitelist(voters) => self.whitelist.extend(voters),
            WriteCall::RemoveVoterFromWhitelist(voter) => {
                self.whitelist.remove(&voter);
            }
            WriteCall::Vote { session, candidate } => {
                if let Some(stored) = self.session_mut(session) {
                    stored.voters.insert(sender);
                    if let Some(c) = usize::try_from(candidate.as_u64())
                        .ok()
                        .and_then(|i| stored.candidates.get_mut(i))
                    {
                        c.vote_count += 1;
                    }
                }
            }
        }
    }
}

fn tx_hash(n: u64) -> TxHash {
    let mut bytes = [0u8; 32];
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    TxHash::new(bytes)
}

/// An in-memory voting contract.
///
/// Clones share the same contract state. [`NullLedger::as_account`] gives a
/// handle that signs writes as a different account.
#[derive(Clone)]
pub struct NullLedger {
    state: Arc<Mutex<State>>,
    clock: Arc<dyn Clock>,
    sender: Address,
}

impl NullLedger {
    /// Deploy an empty contract administered by `admin`; the returned handle
    /// signs as `admin`.
    pub fn new(admin: Address, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                admin,
                sessions: Vec::new(),
                whitelist_required: false,
                whitelist: HashSet::new(),
                reads: Vec::new(),
                writes: Vec::new(),
                next_tx: 0,
                block_height: 0,
                held_counts: VecDeque::new(),
                held_confirmations: VecDeque::new(),
                failing_candidate_reads: 0,
                revert_next_confirmation: None,
            })),
            clock,
            sender: admin,
        }
    }

    /// A handle on the same contract that signs writes as `account`.
    pub fn as_account(&self, account: Address) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            sender: account,
        }
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_secs(&self) -> u64 {
        self.clock.now().as_secs()
    }

    // ── Seeding (bypasses admin and time checks) ───────────────────────

    /// Store a session directly.
    pub fn seed_session(
        &self,
        start_time: u64,
        end_time: u64,
        description: &str,
        is_active: bool,
    ) -> SessionId {
        let mut state = self.state();
        let id = SessionId(state.sessions.len() as u64);
        state.sessions.push(StoredSession {
            record: SessionRecord {
                id,
                start_time,
                end_time,
                is_active,
                description: description.to_string(),
            },
            candidates: Vec::new(),
            voters: HashSet::new(),
        });
        id
    }

    /// Store a candidate with a preset tally.
    ///
    /// # Panics
    /// Panics if `session` was never seeded.
    pub fn seed_candidate(&self, session: SessionId, name: &str, vote_count: u64) -> CandidateId {
        let mut state = self.state();
        let stored = state
            .session_mut(session)
            .expect("seed_candidate on unknown session");
        let id = CandidateId(stored.candidates.len() as u64);
        stored.candidates.push(CandidateRecord {
            id,
            name: name.to_string(),
            vote_count,
        });
        id
    }

    /// Mark `voter` as having voted in `session` without touching tallies.
    pub fn seed_voter(&self, session: SessionId, voter: Address) {
        if let Some(stored) = self.state().session_mut(session) {
            stored.voters.insert(voter);
        }
    }

    /// Set whitelist mode and membership directly.
    pub fn seed_whitelist(&self, required: bool, members: &[Address]) {
        let mut state = self.state();
        state.whitelist_required = required;
        state.whitelist.extend(members.iter().copied());
    }

    // ── Observation ────────────────────────────────────────────────────

    /// All reads received so far, in arrival order.
    pub fn reads(&self) -> Vec<ReadCall> {
        self.state().reads.clone()
    }

    /// All write submissions received so far, in arrival order.
    pub fn writes(&self) -> Vec<WriteCall> {
        self.state().writes.clone()
    }

    /// Forget recorded reads and writes.
    pub fn clear_calls(&self) {
        let mut state = self.state();
        state.reads.clear();
        state.writes.clear();
    }

    /// Current tally of a candidate, if it exists.
    pub fn vote_count(&self, session: SessionId, candidate: CandidateId) -> Option<u64> {
        let state = self.state();
        let stored = state.session(session)?;
        stored
            .candidates
            .iter()
            .find(|c| c.id == candidate)
            .map(|c| c.vote_count)
    }

    // ── Fault injection and interleaving control ───────────────────────

    /// Fail the next `n` candidate reads with a transport error.
    pub fn fail_next_candidate_reads(&self, n: u32) {
        self.state().failing_candidate_reads = n;
    }

    /// Park the next `sessions_count` read after it has computed its answer.
    pub fn hold_next_sessions_count(&self) -> HeldCall {
        let (hold, held) = Hold::pair();
        self.state().held_counts.push_back(hold);
        held
    }

    /// Park the confirmation of the next accepted write submission.
    pub fn hold_next_confirmation(&self) -> HeldCall {
        let (hold, held) = Hold::pair();
        self.state().held_confirmations.push_back(hold);
        held
    }

    /// Make the next confirmation fail with `reason`, as if the transaction
    /// was mined but reverted.
    pub fn revert_next_confirmation(&self, reason: &str) {
        self.state().revert_next_confirmation = Some(reason.to_string());
    }

    // ── Write plumbing ─────────────────────────────────────────────────

    fn submit(&self, call: WriteCall) -> Result<PendingTx, LedgerError> {
        let now = self.now_secs();
        let (hash, hold) = {
            let mut state = self.state();
            state.writes.push(call.clone());
            state
                .check(&call, &self.sender, now)
                .map_err(LedgerError::reverted)?;
            state.next_tx += 1;
            (tx_hash(state.next_tx), state.held_confirmations.pop_front())
        };

        let ledger = self.clone();
        Ok(PendingTx::new(
            hash,
            async move {
                if let Some(hold) = hold {
                    hold.pass().await;
                }
                ledger.confirm(hash, call)
            }
            .boxed(),
        ))
    }

    fn confirm(&self, hash: TxHash, call: WriteCall) -> Result<TxReceipt, LedgerError> {
        let now = self.now_secs();
        let mut state = self.state();
        if let Some(reason) = state.revert_next_confirmation.take() {
            return Err(LedgerError::reverted(reason));
        }
        state
            .check(&call, &self.sender, now)
            .map_err(LedgerError::reverted)?;
        state.apply(call, self.sender);
        state.block_height += 1;
        Ok(TxReceipt {
            hash,
            block: state.block_height,
        })
    }
}

#[async_trait]
impl SessionReader for NullLedger {
    async fn sessions_count(&self) -> Result<u64, LedgerError> {
        let (count, hold) = {
            let mut state = self.state();
            state.reads.push(ReadCall::SessionsCount);
            (state.sessions.len() as u64, state.held_counts.pop_front())
        };
        if let Some(hold) = hold {
            hold.pass().await;
        }
        Ok(count)
    }

    async fn session_details(&self, id: SessionId) -> Result<SessionRecord, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::SessionDetails(id));
        state
            .session(id)
            .map(|s| s.record.clone())
            .ok_or_else(|| LedgerError::reverted(REVERT_NO_SESSION))
    }

    async fn candidates_count(&self, session: SessionId) -> Result<u64, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::CandidatesCount(session));
        state
            .session(session)
            .map(|s| s.candidates.len() as u64)
            .ok_or_else(|| LedgerError::reverted(REVERT_NO_SESSION))
    }

    async fn candidate(
        &self,
        session: SessionId,
        candidate: CandidateId,
    ) -> Result<CandidateRecord, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::Candidate(session, candidate));
        if state.failing_candidate_reads > 0 {
            state.failing_candidate_reads -= 1;
            return Err(LedgerError::Transport("connection reset by peer".into()));
        }
        let stored = state
            .session(session)
            .ok_or_else(|| LedgerError::reverted(REVERT_NO_SESSION))?;
        stored
            .candidates
            .iter()
            .find(|c| c.id == candidate)
            .cloned()
            .ok_or_else(|| LedgerError::reverted(REVERT_INVALID_CANDIDATE))
    }

    async fn has_voted(&self, session: SessionId, voter: &Address) -> Result<bool, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::HasVoted(session, *voter));
        state
            .session(session)
            .map(|s| s.voters.contains(voter))
            .ok_or_else(|| LedgerError::reverted(REVERT_NO_SESSION))
    }

    async fn admin_address(&self) -> Result<Address, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::AdminAddress);
        Ok(state.admin)
    }
}

#[async_trait]
impl WhitelistReader for NullLedger {
    async fn whitelist_required(&self) -> Result<bool, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::WhitelistRequired);
        Ok(state.whitelist_required)
    }

    async fn is_voter_whitelisted(&self, voter: &Address) -> Result<bool, LedgerError> {
        let mut state = self.state();
        state.reads.push(ReadCall::IsVoterWhitelisted(*voter));
        Ok(state.whitelist.contains(voter))
    }
}

#[async_trait]
impl SessionAdmin for NullLedger {
    async fn create_voting_session(
        &self,
        start_time: u64,
        end_time: u64,
        description: &str,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::CreateVotingSession {
            start_time,
            end_time,
            description: description.to_string(),
        })
    }

    async fn add_candidate(
        &self,
        session: SessionId,
        name: &str,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::AddCandidate {
            session,
            name: name.to_string(),
        })
    }

    async fn set_session_status(
        &self,
        session: SessionId,
        is_active: bool,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::SetSessionStatus { session, is_active })
    }
}

#[async_trait]
impl WhitelistAdmin for NullLedger {
    async fn set_whitelist_required(&self, required: bool) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::SetWhitelistRequired(required))
    }

    async fn add_voter_to_whitelist(&self, voter: &Address) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::AddVoterToWhitelist(*voter))
    }

    async fn add_multiple_voters_to_whitelist(
        &self,
        voters: &[Address],
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::AddMultipleVotersToWhitelist(voters.to_vec()))
    }

    async fn remove_voter_from_whitelist(
        &self,
        voter: &Address,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::RemoveVoterFromWhitelist(*voter))
    }
}

#[async_trait]
impl VoteSubmitter for NullLedger {
    async fn vote(
        &self,
        session: SessionId,
        candidate: CandidateId,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(WriteCall::Vote { session, candidate })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NullClock;
    use tally_ledger::RejectionKind;

    const ADMIN: Address = Address::new([0xAA; 20]);
    const VOTER: Address = Address::new([0x01; 20]);

    fn ledger_at(now: u64) -> (Arc<NullClock>, NullLedger) {
        let clock = Arc::new(NullClock::new(now));
        let ledger = NullLedger::new(ADMIN, clock.clone());
        (clock, ledger)
    }

    fn rejection(err: LedgerError) -> RejectionKind {
        match err {
            LedgerError::Reverted(r) => r.kind,
            other => panic!("expected revert, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn admin_writes_apply_on_confirmation() {
        let (_clock, ledger) = ledger_at(1_000);
        let pending = ledger
            .create_voting_session(2_000, 3_000, "Board")
            .await
            .unwrap();
        assert_eq!(ledger.sessions_count().await.unwrap(), 0);

        pending.confirmed().await.unwrap();
        assert_eq!(ledger.sessions_count().await.unwrap(), 1);
        let record = ledger.session_details(SessionId(0)).await.unwrap();
        assert!(record.is_active);
        assert_eq!(record.description, "Board");
    }

    #[tokio::test]
    async fn non_admin_writes_revert() {
        let (_clock, ledger) = ledger_at(1_000);
        let err = ledger
            .as_account(VOTER)
            .create_voting_session(2_000, 3_000, "Board")
            .await
            .unwrap_err();
        assert_eq!(rejection(err), RejectionKind::Unknown);
        assert_eq!(ledger.writes().len(), 1);
    }

    #[tokio::test]
    async fn vote_enforces_window_and_uniqueness() {
        let (clock, ledger) = ledger_at(1_000);
        let session = ledger.seed_session(2_000, 3_000, "Board", true);
        let alice = ledger.seed_candidate(session, "Alice", 0);
        let voter = ledger.as_account(VOTER);

        let err = voter.vote(session, alice).await.unwrap_err();
        assert_eq!(rejection(err), RejectionKind::NotActive);

        clock.set(2_500);
        voter.vote(session, alice).await.unwrap().confirmed().await.unwrap();
        assert_eq!(ledger.vote_count(session, alice), Some(1));

        let err = voter.vote(session, alice).await.unwrap_err();
        assert_eq!(rejection(err), RejectionKind::AlreadyVoted);
    }

    #[tokio::test]
    async fn whitelist_gates_votes() {
        let (_clock, ledger) = ledger_at(2_500);
        let session = ledger.seed_session(2_000, 3_000, "Board", true);
        let alice = ledger.seed_candidate(session, "Alice", 0);
        ledger.seed_whitelist(true, &[]);

        let err = ledger.as_account(VOTER).vote(session, alice).await.unwrap_err();
        assert_eq!(rejection(err), RejectionKind::NotWhitelisted);
    }

    #[tokio::test]
    async fn held_sessions_count_parks_until_released() {
        let (_clock, ledger) = ledger_at(0);
        let mut held = ledger.hold_next_sessions_count();
        let reader = ledger.clone();
        let task = tokio::spawn(async move { reader.sessions_count().await });

        held.reached().await;
        assert!(!task.is_finished());
        held.release();
        assert_eq!(task.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_candidate_read_failures_are_transport_errors() {
        let (_clock, ledger) = ledger_at(0);
        let session = ledger.seed_session(10, 20, "Board", true);
        let alice = ledger.seed_candidate(session, "Alice", 3);
        ledger.fail_next_candidate_reads(1);

        assert!(matches!(
            ledger.candidate(session, alice).await,
            Err(LedgerError::Transport(_))
        ));
        assert_eq!(ledger.candidate(session, alice).await.unwrap().vote_count, 3);
    }
}
