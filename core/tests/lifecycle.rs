use std::sync::Arc;
use tally_core::{
    aggregate, history, ClientError, Outcome, SessionDraft, SessionFilter, SessionQuery,
    SessionStatus, TallyClient, VotePhase,
};
use tally_nullables::{NullClock, NullLedger, WriteCall};
use tally_types::{Address, Clock, SessionId, Timestamp};

const ADMIN: Address = Address::new([0xAA; 20]);
const ALICE: Address = Address::new([0x01; 20]);
const BOB: Address = Address::new([0x02; 20]);

const HOUR: u64 = 3_600;
const T0: u64 = 1_700_000_000;

struct World {
    clock: Arc<NullClock>,
    ledger: NullLedger,
    admin: TallyClient,
}

impl World {
    fn new() -> Self {
        let clock = Arc::new(NullClock::new(T0));
        let ledger = NullLedger::new(ADMIN, clock.clone());
        let admin = TallyClient::new(Arc::new(ledger.clone()), clock.clone());
        Self {
            clock,
            ledger,
            admin,
        }
    }

    fn voter(&self, account: Address) -> TallyClient {
        TallyClient::new(Arc::new(self.ledger.as_account(account)), self.clock.clone())
    }

    fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

#[tokio::test]
async fn status_follows_the_clock_and_the_flag() {
    let w = World::new();
    let draft = SessionDraft {
        description: "Board election".into(),
        start_time: Timestamp::new(T0 + HOUR),
        end_time: Timestamp::new(T0 + 2 * HOUR),
    };
    let created = w.admin.admin.create_session(draft).await.unwrap();
    let snapshot = created.refreshed.unwrap();
    let session = &snapshot.sessions[0];
    assert_eq!(session.status(w.now()), SessionStatus::Upcoming);

    w.clock.advance(HOUR + 1);
    assert_eq!(session.status(w.now()), SessionStatus::Active);

    w.clock.advance(HOUR);
    assert_eq!(session.status(w.now()), SessionStatus::Ended);

    w.admin
        .admin
        .set_session_status(session.id, false)
        .await
        .unwrap();
    let refetched = w.admin.sessions.refresh().await.unwrap();
    for secs in [T0, T0 + HOUR + 1, T0 + 3 * HOUR] {
        assert_eq!(
            refetched.sessions[0].status(Timestamp::new(secs)),
            SessionStatus::Inactive
        );
    }
}

#[tokio::test]
async fn full_election_round() {
    let w = World::new();
    w.admin
        .admin
        .create_session(SessionDraft {
            description: "Budget".into(),
            start_time: Timestamp::new(T0 + HOUR),
            end_time: Timestamp::new(T0 + 2 * HOUR),
        })
        .await
        .unwrap();
    let id = SessionId(0);
    w.admin.admin.add_candidate(id, "Parks").await.unwrap();
    w.admin.admin.add_candidate(id, "Roads").await.unwrap();
    w.admin
        .admin
        .add_voters(&format!("{ALICE}\n{BOB}\n"))
        .await
        .unwrap();
    let mode = w.admin.admin.set_whitelist_required(true).await.unwrap();
    assert!(mode.refreshed.unwrap().required);

    w.clock.advance(HOUR + 10);

    for (account, pick) in [(ALICE, 1), (BOB, 1)] {
        let client = w.voter(account);
        let snapshot = client
            .sessions
            .fetch_all(SessionQuery::new(SessionFilter::FlagActive).for_viewer(account))
            .await
            .unwrap();
        let whitelist = client.whitelist.fetch(Some(account)).await.unwrap();
        let candidate = snapshot.session(id).unwrap().candidates[pick].id;

        let outcome = client
            .votes
            .cast_vote(&snapshot, id, candidate, account, &whitelist)
            .await
            .unwrap();
        assert_eq!(client.votes.phase(id, &account), VotePhase::Confirmed);
        let after = outcome.refreshed.unwrap();
        assert_eq!(after.session(id).unwrap().has_voted, Some(true));

        let again = client
            .votes
            .cast_vote(&after, id, candidate, account, &whitelist)
            .await;
        assert_eq!(again.unwrap_err(), ClientError::AlreadyVoted);
    }

    w.clock.advance(2 * HOUR);
    let ended = w
        .admin
        .sessions
        .fetch_all(SessionQuery::new(SessionFilter::Ended))
        .await
        .unwrap();
    let results = history(&ended, w.now());
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.total_votes, 2);
    assert_eq!(result.winner().unwrap().name, "Roads");
    assert_eq!(result.standings[0].percentage, 100);
    assert_eq!(result.standings[1].percentage, 0);
    assert_eq!(result.has_voted, None);

    let alice = w.voter(ALICE);
    let seen_by_alice = alice
        .sessions
        .fetch_all(SessionQuery::new(SessionFilter::Ended).for_viewer(ALICE))
        .await
        .unwrap();
    assert_eq!(history(&seen_by_alice, w.now())[0].has_voted, Some(true));
}

#[tokio::test]
async fn votes_outside_the_window_issue_no_write() {
    let w = World::new();
    let id = w.ledger.seed_session(T0 + HOUR, T0 + 2 * HOUR, "Later", true);
    w.ledger.seed_candidate(id, "Parks", 0);
    let client = w.voter(ALICE);
    let whitelist = client.whitelist.fetch(Some(ALICE)).await.unwrap();

    let snapshot = client
        .sessions
        .fetch_all(SessionQuery::default().for_viewer(ALICE))
        .await
        .unwrap();
    let candidate = snapshot.session(id).unwrap().candidates[0].id;

    let err = client
        .votes
        .cast_vote(&snapshot, id, candidate, ALICE, &whitelist)
        .await;
    assert_eq!(err.unwrap_err(), ClientError::NotActive);

    w.clock.advance(3 * HOUR);
    let err = client
        .votes
        .cast_vote(&snapshot, id, candidate, ALICE, &whitelist)
        .await;
    assert_eq!(err.unwrap_err(), ClientError::NotActive);

    assert!(w
        .ledger
        .writes()
        .iter()
        .all(|call| !matches!(call, WriteCall::Vote { .. })));
}

#[tokio::test]
async fn three_way_split_does_not_sum_to_one_hundred() {
    let w = World::new();
    let id = w.ledger.seed_session(T0 - 2 * HOUR, T0 - HOUR, "Split", true);
    for name in ["A", "B", "C"] {
        w.ledger.seed_candidate(id, name, 1);
    }
    let snapshot = w.admin.sessions.fetch_all(SessionQuery::default()).await.unwrap();
    let result = aggregate(snapshot.session(id).unwrap());

    assert!(result.is_tie());
    assert_eq!(result.outcome, Outcome::Tie);
    assert!(result.standings.iter().all(|s| s.percentage == 33));
}
