//! Administrative commands.
//!
//! Each command validates its input locally, holds a single-flight key,
//! submits, waits for confirmation and then re-fetches the affected
//! repository. Nothing is flipped locally on submission; a confirmed write
//! becomes visible through the re-fetched snapshot only.

use std::future::Future;
use std::sync::Arc;
use tally_ledger::{LedgerError, PendingTx, SessionAdmin, TxReceipt, WhitelistAdmin};
use tally_types::{Address, Clock, SessionId, Timestamp};
use tracing::{info, warn};

use crate::error::{ClientError, ValidationError};
use crate::flight::SingleFlight;
use crate::model::{Snapshot, WriteOutcome};
use crate::repository::SessionRepository;
use crate::view::accepts_candidates;
use crate::whitelist::{WhitelistRepository, WhitelistSnapshot};

/// Single-flight keys for administrative writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminKey {
    CreateSession,
    /// Any write against one existing session.
    SessionWrite(SessionId),
    /// Any whitelist write.
    Whitelist,
}

/// Input of the session creation form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub description: String,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
}

impl SessionDraft {
    pub fn validate(&self, now: Timestamp) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::EmptyField("description"));
        }
        if self.end_time <= self.start_time {
            return Err(ValidationError::EndNotAfterStart);
        }
        if self.start_time <= now {
            return Err(ValidationError::StartNotInFuture);
        }
        Ok(())
    }
}

/// Parse a newline-separated address list.
///
/// Lines are trimmed and blank lines skipped. If any line is not an
/// address the whole list is refused, naming every offending line.
pub fn parse_address_list(text: &str) -> Result<Vec<Address>, ValidationError> {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match Address::parse(line) {
            Ok(address) => valid.push(address),
            Err(_) => invalid.push(line.to_string()),
        }
    }
    if !invalid.is_empty() {
        return Err(ValidationError::InvalidAddresses(invalid));
    }
    if valid.is_empty() {
        return Err(ValidationError::EmptyField("addresses"));
    }
    Ok(valid)
}

fn parse_address(raw: &str) -> Result<Address, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::EmptyField("address"));
    }
    Address::parse(raw).map_err(|_| ValidationError::MalformedAddress(raw.to_string()))
}

pub struct AdminConsole {
    session_admin: Arc<dyn SessionAdmin>,
    whitelist_admin: Arc<dyn WhitelistAdmin>,
    sessions: Arc<SessionRepository>,
    whitelist: Arc<WhitelistRepository>,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<AdminKey>,
}

impl AdminConsole {
    pub fn new(
        session_admin: Arc<dyn SessionAdmin>,
        whitelist_admin: Arc<dyn WhitelistAdmin>,
        sessions: Arc<SessionRepository>,
        whitelist: Arc<WhitelistRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session_admin,
            whitelist_admin,
            sessions,
            whitelist,
            clock,
            flights: SingleFlight::new(),
        }
    }

    pub fn is_in_flight(&self, key: AdminKey) -> bool {
        self.flights.is_in_flight(&key)
    }

    pub async fn create_session(
        &self,
        draft: SessionDraft,
    ) -> Result<WriteOutcome<Snapshot>, ClientError> {
        draft.validate(self.clock.now())?;
        let description = draft.description.trim();
        let submit = self.session_admin.create_voting_session(
            draft.start_time.as_secs(),
            draft.end_time.as_secs(),
            description,
        );
        let tx = self.write(AdminKey::CreateSession, "create session", submit).await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_sessions().await,
        })
    }

    /// Add a candidate to a session that is flag-active and not yet started,
    /// as seen in the current session snapshot.
    pub async fn add_candidate(
        &self,
        session: SessionId,
        name: &str,
    ) -> Result<WriteOutcome<Snapshot>, ClientError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyField("candidate name").into());
        }
        let snapshot = self
            .sessions
            .current()
            .ok_or(ValidationError::UnknownSession(session))?;
        let target = snapshot
            .session(session)
            .ok_or(ValidationError::UnknownSession(session))?;
        if !accepts_candidates(target, self.clock.now()) {
            return Err(ValidationError::SessionClosedToCandidates(session).into());
        }

        let submit = self.session_admin.add_candidate(session, name);
        let tx = self
            .write(AdminKey::SessionWrite(session), "add candidate", submit)
            .await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_sessions().await,
        })
    }

    pub async fn set_session_status(
        &self,
        session: SessionId,
        is_active: bool,
    ) -> Result<WriteOutcome<Snapshot>, ClientError> {
        let submit = self.session_admin.set_session_status(session, is_active);
        let tx = self
            .write(AdminKey::SessionWrite(session), "set session status", submit)
            .await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_sessions().await,
        })
    }

    pub async fn set_whitelist_required(
        &self,
        required: bool,
    ) -> Result<WriteOutcome<WhitelistSnapshot>, ClientError> {
        let submit = self.whitelist_admin.set_whitelist_required(required);
        let tx = self.write(AdminKey::Whitelist, "set whitelist mode", submit).await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_whitelist().await,
        })
    }

    pub async fn add_voter(
        &self,
        raw: &str,
    ) -> Result<WriteOutcome<WhitelistSnapshot>, ClientError> {
        let voter = parse_address(raw)?;
        let submit = self.whitelist_admin.add_voter_to_whitelist(&voter);
        let tx = self.write(AdminKey::Whitelist, "whitelist voter", submit).await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_whitelist().await,
        })
    }

    /// Add every address of a newline-separated list in one write.
    pub async fn add_voters(
        &self,
        text: &str,
    ) -> Result<WriteOutcome<WhitelistSnapshot>, ClientError> {
        let voters = parse_address_list(text)?;
        let submit = self.whitelist_admin.add_multiple_voters_to_whitelist(&voters);
        let tx = self.write(AdminKey::Whitelist, "whitelist voters", submit).await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_whitelist().await,
        })
    }

    pub async fn remove_voter(
        &self,
        raw: &str,
    ) -> Result<WriteOutcome<WhitelistSnapshot>, ClientError> {
        let voter = parse_address(raw)?;
        let submit = self.whitelist_admin.remove_voter_from_whitelist(&voter);
        let tx = self.write(AdminKey::Whitelist, "remove voter", submit).await?;
        Ok(WriteOutcome {
            tx,
            refreshed: self.refresh_whitelist().await,
        })
    }

    /// Hold `key`, submit, and wait for confirmation.
    ///
    /// `submit` is only polled once the key is held, so a refused duplicate
    /// never reaches the ledger.
    async fn write(
        &self,
        key: AdminKey,
        action: &'static str,
        submit: impl Future<Output = Result<PendingTx, LedgerError>>,
    ) -> Result<TxReceipt, ClientError> {
        let Some(_flight) = self.flights.try_begin(key) else {
            return Err(ClientError::AlreadyPending);
        };

        let pending = submit.await.map_err(|err| {
            warn!(action, ?key, error = %err, "submission failed");
            ClientError::from(err)
        })?;
        let hash = pending.hash();
        info!(action, ?key, tx = %hash, "submitted, awaiting confirmation");

        let receipt = pending.confirmed().await.map_err(|err| {
            warn!(action, ?key, tx = %hash, error = %err, "not confirmed");
            ClientError::from(err)
        })?;
        info!(action, ?key, tx = %hash, block = receipt.block, "confirmed");
        Ok(receipt)
    }

    async fn refresh_sessions(&self) -> Option<Arc<Snapshot>> {
        self.sessions
            .refresh()
            .await
            .map_err(|err| warn!(error = %err, "refresh after admin write failed"))
            .ok()
    }

    async fn refresh_whitelist(&self) -> Option<Arc<WhitelistSnapshot>> {
        self.whitelist
            .refresh()
            .await
            .map_err(|err| warn!(error = %err, "whitelist refresh after admin write failed"))
            .ok()
    }
}
