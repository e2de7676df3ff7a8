//! Whitelist eligibility.
//!
//! Whether the whitelist applies is a single global flag on the ledger.
//! Membership of the viewing address is only read when the flag is set.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tally_ledger::{LedgerError, WhitelistReader};
use tally_types::{Address, Clock, Timestamp};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::guard::{Publication, SequenceGuard};

/// A voter is eligible when the whitelist is not required, or when it is
/// and they are on it.
pub fn eligible(required: bool, is_member: bool) -> bool {
    !required || is_member
}

/// Whitelist state as seen by one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistSnapshot {
    pub sequence: u64,
    pub fetched_at: Timestamp,
    pub required: bool,
    pub viewer: Option<Address>,
    /// Membership of `viewer`; only read while the whitelist is required.
    pub member: Option<bool>,
}

impl WhitelistSnapshot {
    /// Whether `voter` may vote under this snapshot.
    ///
    /// Membership is only known for the snapshot's own viewer; any other
    /// address counts as a non-member while the whitelist is required.
    pub fn allows(&self, voter: &Address) -> bool {
        let is_member = self.viewer.as_ref() == Some(voter) && self.member == Some(true);
        eligible(self.required, is_member)
    }

    /// Snapshot of an open whitelist, for callers that never fetched one.
    pub fn open(fetched_at: Timestamp) -> Self {
        Self {
            sequence: 0,
            fetched_at,
            required: false,
            viewer: None,
            member: None,
        }
    }
}

/// Fetches and publishes [`WhitelistSnapshot`]s, newest-initiated wins.
pub struct WhitelistRepository {
    reader: Arc<dyn WhitelistReader>,
    clock: Arc<dyn Clock>,
    guard: SequenceGuard<WhitelistSnapshot>,
    last_viewer: Mutex<Option<Address>>,
}

impl WhitelistRepository {
    pub fn new(reader: Arc<dyn WhitelistReader>, clock: Arc<dyn Clock>) -> Self {
        Self {
            reader,
            clock,
            guard: SequenceGuard::new(),
            last_viewer: Mutex::new(None),
        }
    }

    pub async fn fetch(
        &self,
        viewer: Option<Address>,
    ) -> Result<Arc<WhitelistSnapshot>, ClientError> {
        let ticket = self.guard.begin();
        *self.last_viewer.lock().unwrap_or_else(PoisonError::into_inner) = viewer;

        let now = self.clock.now();
        let (required, member) = self.read(viewer.as_ref()).await.map_err(|err| {
            warn!(error = %err, "whitelist fetch failed");
            ClientError::from(err)
        })?;

        let snapshot = WhitelistSnapshot {
            sequence: ticket.sequence(),
            fetched_at: now,
            required,
            viewer,
            member,
        };
        match self.guard.publish(ticket, snapshot) {
            Publication::Published(snapshot) => {
                debug!(required, ?member, "published whitelist snapshot");
                Ok(snapshot)
            }
            Publication::Superseded { current } => Ok(current),
        }
    }

    /// Re-fetch for the most recent viewer.
    pub async fn refresh(&self) -> Result<Arc<WhitelistSnapshot>, ClientError> {
        let viewer = *self.last_viewer.lock().unwrap_or_else(PoisonError::into_inner);
        self.fetch(viewer).await
    }

    pub fn current(&self) -> Option<Arc<WhitelistSnapshot>> {
        self.guard.latest()
    }

    async fn read(&self, viewer: Option<&Address>) -> Result<(bool, Option<bool>), LedgerError> {
        let required = self.reader.whitelist_required().await?;
        let member = match viewer {
            Some(viewer) if required => Some(self.reader.is_voter_whitelisted(viewer).await?),
            _ => None,
        };
        Ok((required, member))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_nullables::{NullClock, NullLedger, ReadCall};

    const ADMIN: Address = Address::new([0xAA; 20]);
    const VOTER: Address = Address::new([0x11; 20]);
    const OTHER: Address = Address::new([0x22; 20]);

    fn setup() -> (NullLedger, WhitelistRepository) {
        let clock = Arc::new(NullClock::new(1_000));
        let ledger = NullLedger::new(ADMIN, clock.clone());
        let repo = WhitelistRepository::new(Arc::new(ledger.clone()), clock);
        (ledger, repo)
    }

    #[test]
    fn eligibility_table() {
        assert!(eligible(false, false));
        assert!(eligible(false, true));
        assert!(eligible(true, true));
        assert!(!eligible(true, false));
    }

    #[tokio::test]
    async fn membership_is_not_read_when_not_required() {
        let (ledger, repo) = setup();
        let snapshot = repo.fetch(Some(VOTER)).await.unwrap();

        assert!(!snapshot.required);
        assert_eq!(snapshot.member, None);
        assert!(snapshot.allows(&VOTER));
        assert_eq!(ledger.reads(), vec![ReadCall::WhitelistRequired]);
    }

    #[tokio::test]
    async fn required_whitelist_gates_by_membership() {
        let (ledger, repo) = setup();
        ledger.seed_whitelist(true, &[VOTER]);

        let snapshot = repo.fetch(Some(VOTER)).await.unwrap();
        assert_eq!(snapshot.member, Some(true));
        assert!(snapshot.allows(&VOTER));
        assert!(!snapshot.allows(&OTHER));
    }

    #[tokio::test]
    async fn required_whitelist_without_viewer_allows_nobody() {
        let (ledger, repo) = setup();
        ledger.seed_whitelist(true, &[VOTER]);

        let snapshot = repo.fetch(None).await.unwrap();
        assert_eq!(snapshot.member, None);
        assert!(!snapshot.allows(&VOTER));
    }

    #[tokio::test]
    async fn refresh_reuses_viewer_and_sees_flag_change() {
        let (ledger, repo) = setup();
        repo.fetch(Some(VOTER)).await.unwrap();
        ledger.seed_whitelist(true, &[]);

        let snapshot = repo.refresh().await.unwrap();
        assert!(snapshot.required);
        assert_eq!(snapshot.viewer, Some(VOTER));
        assert!(!snapshot.allows(&VOTER));
        assert!(snapshot.sequence > 1);
    }
}
