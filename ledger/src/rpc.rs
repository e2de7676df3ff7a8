//! JSON-RPC gateway client for the voting contract.
//!
//! The gateway is an HTTP endpoint that fronts the ledger node and the
//! signer. Every request is a JSON object with an `action` field naming the
//! contract method, plus the method's parameters; the gateway answers with a
//! `result`, an infrastructural `error`, or a contract `revert` reason.
//!
//! Writes are signed by the gateway on behalf of the configured account and
//! answered with a transaction hash. Their confirmation is observed by
//! polling `tx_status` on a fixed interval.

use async_trait::async_trait;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tally_types::{Address, CandidateId, SessionId, TxHash};
use tokio::time::MissedTickBehavior;

use crate::capability::{SessionAdmin, SessionReader, VoteSubmitter, WhitelistAdmin, WhitelistReader};
use crate::{CandidateRecord, LedgerError, PendingTx, SessionRecord, TxReceipt};

/// Consecutive retryable `tx_status` failures tolerated before a
/// confirmation wait gives up.
const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 5;

/// HTTP client for a voting-contract gateway.
#[derive(Clone)]
pub struct RpcLedger {
    http: reqwest::Client,
    endpoint: String,
    contract: String,
    account: Option<Address>,
    poll_interval: Duration,
}

impl RpcLedger {
    /// Create a client for `contract` behind the gateway at `endpoint`.
    pub fn new(
        endpoint: impl Into<String>,
        contract: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
            contract: contract.into(),
            account: None,
            poll_interval: Duration::from_secs(1),
        })
    }

    /// Sign writes as `account` (the gateway must hold its key).
    pub fn with_account(mut self, account: Address) -> Self {
        self.account = Some(account);
        self
    }

    /// How often confirmation status is polled.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn account(&self) -> Option<&Address> {
        self.account.as_ref()
    }

    /// Send one request and return the `result` field.
    async fn rpc_call(&self, action: &str, params: Value) -> Result<Value, LedgerError> {
        let mut body = params;
        let object = body
            .as_object_mut()
            .ok_or_else(|| LedgerError::MalformedResponse("params must be a JSON object".into()))?;
        object.insert("action".to_string(), json!(action));
        object.insert("contract".to_string(), json!(self.contract));
        if let Some(account) = &self.account {
            object.insert("from".to_string(), json!(account.to_string()));
        }

        tracing::debug!(action, "ledger call");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "gateway returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| LedgerError::MalformedResponse(format!("invalid JSON response: {e}")))?;

        if let Some(reason) = envelope.get("revert").and_then(Value::as_str) {
            return Err(LedgerError::reverted(reason));
        }
        if let Some(err) = envelope.get("error").and_then(Value::as_str) {
            return Err(LedgerError::Transport(format!("gateway error: {err}")));
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| LedgerError::MalformedResponse(format!("{action}: missing result")))
    }

    async fn read<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<T, LedgerError> {
        let result = self.rpc_call(action, params).await?;
        serde_json::from_value(result)
            .map_err(|e| LedgerError::MalformedResponse(format!("invalid {action} response: {e}")))
    }

    /// Submit a write and wrap its hash in a pending handle.
    async fn submit(&self, action: &str, params: Value) -> Result<PendingTx, LedgerError> {
        let submitted: SubmitResult = self.read(action, params).await?;
        let hash: TxHash = submitted
            .hash
            .parse()
            .map_err(|e| LedgerError::MalformedResponse(format!("{action}: {e}")))?;
        tracing::info!(action, %hash, "transaction submitted");

        let client = self.clone();
        Ok(PendingTx::new(
            hash,
            async move { client.await_confirmation(hash).await }.boxed(),
        ))
    }

    async fn await_confirmation(&self, hash: TxHash) -> Result<TxReceipt, LedgerError> {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut failures = 0u32;

        loop {
            ticker.tick().await;
            let status: TxStatus = match self
                .read("tx_status", json!({ "hash": hash.to_string() }))
                .await
            {
                Ok(status) => {
                    failures = 0;
                    status
                }
                Err(e) if e.is_retryable() && failures + 1 < MAX_CONSECUTIVE_POLL_FAILURES => {
                    failures += 1;
                    tracing::warn!(%hash, failures, "confirmation poll failed: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match status {
                TxStatus::Pending => continue,
                TxStatus::Confirmed { block } => {
                    tracing::info!(%hash, block, "transaction confirmed");
                    return Ok(TxReceipt { hash, block });
                }
                TxStatus::Reverted { reason } => {
                    tracing::info!(%hash, %reason, "transaction reverted");
                    return Err(LedgerError::reverted(reason));
                }
            }
        }
    }
}

/// Response to any write action.
#[derive(Debug, Deserialize)]
struct SubmitResult {
    hash: String,
}

/// Response to `tx_status`.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum TxStatus {
    Pending,
    Confirmed { block: u64 },
    Reverted { reason: String },
}

#[async_trait]
impl SessionReader for RpcLedger {
    async fn sessions_count(&self) -> Result<u64, LedgerError> {
        self.read("sessions_count", json!({})).await
    }

    async fn session_details(&self, id: SessionId) -> Result<SessionRecord, LedgerError> {
        self.read("get_session_details", json!({ "session_id": id.as_u64() }))
            .await
    }

    async fn candidates_count(&self, session: SessionId) -> Result<u64, LedgerError> {
        self.read("get_candidates_count", json!({ "session_id": session.as_u64() }))
            .await
    }

    async fn candidate(
        &self,
        session: SessionId,
        candidate: CandidateId,
    ) -> Result<CandidateRecord, LedgerError> {
        self.read(
            "get_candidate",
            json!({ "session_id": session.as_u64(), "candidate_id": candidate.as_u64() }),
        )
        .await
    }

    async fn has_voted(&self, session: SessionId, voter: &Address) -> Result<bool, LedgerError> {
        self.read(
            "has_voted",
            json!({ "session_id": session.as_u64(), "voter": voter.to_string() }),
        )
        .await
    }

    async fn admin_address(&self) -> Result<Address, LedgerError> {
        self.read("admin", json!({})).await
    }
}

#[async_trait]
impl WhitelistReader for RpcLedger {
    async fn whitelist_required(&self) -> Result<bool, LedgerError> {
        self.read("whitelist_required", json!({})).await
    }

    async fn is_voter_whitelisted(&self, voter: &Address) -> Result<bool, LedgerError> {
        self.read("is_voter_whitelisted", json!({ "voter": voter.to_string() }))
            .await
    }
}

#[async_trait]
impl SessionAdmin for RpcLedger {
    async fn create_voting_session(
        &self,
        start_time: u64,
        end_time: u64,
        description: &str,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(
            "create_voting_session",
            json!({ "start_time": start_time, "end_time": end_time, "description": description }),
        )
        .await
    }

    async fn add_candidate(
        &self,
        session: SessionId,
        name: &str,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(
            "add_candidate",
            json!({ "session_id": session.as_u64(), "name": name }),
        )
        .await
    }

    async fn set_session_status(
        &self,
        session: SessionId,
        is_active: bool,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(
            "set_session_status",
            json!({ "session_id": session.as_u64(), "is_active": is_active }),
        )
        .await
    }
}

#[async_trait]
impl WhitelistAdmin for RpcLedger {
    async fn set_whitelist_required(&self, required: bool) -> Result<PendingTx, LedgerError> {
        self.submit("set_whitelist_required", json!({ "required": required }))
            .await
    }

    async fn add_voter_to_whitelist(&self, voter: &Address) -> Result<PendingTx, LedgerError> {
        self.submit("add_voter_to_whitelist", json!({ "voter": voter.to_string() }))
            .await
    }

    async fn add_multiple_voters_to_whitelist(
        &self,
        voters: &[Address],
    ) -> Result<PendingTx, LedgerError> {
        let voters: Vec<String> = voters.iter().map(ToString::to_string).collect();
        self.submit("add_multiple_voters_to_whitelist", json!({ "voters": voters }))
            .await
    }

    async fn remove_voter_from_whitelist(
        &self,
        voter: &Address,
    ) -> Result<PendingTx, LedgerError> {
        self.submit("remove_voter_from_whitelist", json!({ "voter": voter.to_string() }))
            .await
    }
}

#[async_trait]
impl VoteSubmitter for RpcLedger {
    async fn vote(
        &self,
        session: SessionId,
        candidate: CandidateId,
    ) -> Result<PendingTx, LedgerError> {
        self.submit(
            "vote",
            json!({ "session_id": session.as_u64(), "candidate_id": candidate.as_u64() }),
        )
        .await
    }
}
