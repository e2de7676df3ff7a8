//! Raw records as returned by the contract's read methods.
//!
//! Times are left as unix seconds here; conversion to `Timestamp` belongs to
//! the consumer that builds snapshots.

use serde::{Deserialize, Serialize};
use tally_types::{CandidateId, SessionId};

/// Result of `getSessionDetails(id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: SessionId,
    pub start_time: u64,
    pub end_time: u64,
    pub is_active: bool,
    pub description: String,
}

/// Result of `getCandidate(sessionId, candidateId)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub name: String,
    pub vote_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_contract_field_names() {
        let json = r#"{"id":3,"startTime":100,"endTime":200,"isActive":true,"description":"Board"}"#;
        let record: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, SessionId(3));
        assert_eq!(record.start_time, 100);
        assert!(record.is_active);

        let json = r#"{"id":0,"name":"Alice","voteCount":7}"#;
        let candidate: CandidateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(candidate.vote_count, 7);
    }
}
