//! The per-claim durable aggregate: an append-only history of status
//! updates and the state derived from it.
//!
//! Updates are merged in increasing-timestamp order, so `current_status`
//! always reflects the timestamp-maximal entry — never the entry that
//! happened to arrive last. Reordered deliveries from concurrent writers
//! are corrected on merge rather than surfaced as errors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    ProofGenerated,
    ClaimSubmitted,
    UnderReview,
    Verified,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProofGenerated => "proof_generated",
            Self::ClaimSubmitted => "claim_submitted",
            Self::UnderReview => "under_review",
            Self::Verified => "verified",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Whether this status ends the claim lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision details attached to `verified`/`approved`/`rejected` updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionData {
    pub reference_number: Option<String>,
    pub reviewer_notes: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// One append-only lifecycle event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusUpdate {
    /// Delivery-dedup identity for the storage-poll fallback path.
    pub update_id: Uuid,
    pub claim_id: String,
    pub status: ClaimStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<DecisionData>,
}

impl ClaimStatusUpdate {
    pub fn new(claim_id: &str, status: ClaimStatus) -> Self {
        Self {
            update_id: Uuid::new_v4(),
            claim_id: claim_id.to_string(),
            status,
            timestamp: Utc::now(),
            decision: None,
        }
    }

    pub fn with_decision(mut self, decision: DecisionData) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Override the timestamp (concurrent-writer scenarios and tests).
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// The durable source of truth for one claim's lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub claim_id: String,
    pub history: Vec<ClaimStatusUpdate>,
    /// Status of the timestamp-maximal history entry; `None` for an empty
    /// record (projects as all-pending).
    pub current_status: Option<ClaimStatus>,
    pub last_updated: DateTime<Utc>,
}

impl ClaimRecord {
    pub fn new(claim_id: &str) -> Self {
        Self {
            claim_id: claim_id.to_string(),
            history: Vec::new(),
            current_status: None,
            last_updated: Utc::now(),
        }
    }

    /// Merge one update, keeping history in increasing-timestamp order.
    ///
    /// Equal timestamps keep receipt order.
    pub fn apply(&mut self, update: ClaimStatusUpdate) {
        let pos = self
            .history
            .partition_point(|u| u.timestamp <= update.timestamp);
        self.history.insert(pos, update);

        if let Some(last) = self.history.last() {
            self.current_status = Some(last.status);
            self.last_updated = last.timestamp;
        }
    }

    /// Rebuild a record by replaying a history.
    pub fn replay(claim_id: &str, updates: impl IntoIterator<Item = ClaimStatusUpdate>) -> Self {
        let mut record = Self::new(claim_id);
        for update in updates {
            record.apply(update);
        }
        record
    }

    /// The most recent history entry with the given status, if any.
    pub fn latest_for(&self, status: ClaimStatus) -> Option<&ClaimStatusUpdate> {
        self.history.iter().rev().find(|u| u.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_current_status_follows_timestamp_not_arrival() {
        let t1 = Utc::now();
        let t2 = t1 + Duration::seconds(10);

        let mut record = ClaimRecord::new("c-1");
        record.apply(ClaimStatusUpdate::new("c-1", ClaimStatus::UnderReview).at(t2));
        record.apply(ClaimStatusUpdate::new("c-1", ClaimStatus::ClaimSubmitted).at(t1));

        assert_eq!(record.current_status, Some(ClaimStatus::UnderReview));
        assert_eq!(record.last_updated, t2);
        assert_eq!(record.history[0].status, ClaimStatus::ClaimSubmitted);
        assert_eq!(record.history[1].status, ClaimStatus::UnderReview);
    }

    #[test]
    fn test_equal_timestamps_keep_receipt_order() {
        let t = Utc::now();
        let mut record = ClaimRecord::new("c-1");
        record.apply(ClaimStatusUpdate::new("c-1", ClaimStatus::ProofGenerated).at(t));
        record.apply(ClaimStatusUpdate::new("c-1", ClaimStatus::ClaimSubmitted).at(t));

        assert_eq!(record.current_status, Some(ClaimStatus::ClaimSubmitted));
    }

    #[test]
    fn test_replay_matches_incremental_application() {
        let t = Utc::now();
        let updates: Vec<_> = [
            ClaimStatus::ProofGenerated,
            ClaimStatus::ClaimSubmitted,
            ClaimStatus::UnderReview,
        ]
        .iter()
        .enumerate()
        .map(|(i, s)| ClaimStatusUpdate::new("c-1", *s).at(t + Duration::seconds(i as i64)))
        .collect();

        let replayed = ClaimRecord::replay("c-1", updates.clone());
        let mut incremental = ClaimRecord::new("c-1");
        for u in updates {
            incremental.apply(u);
        }

        assert_eq!(replayed.history, incremental.history);
        assert_eq!(replayed.current_status, Some(ClaimStatus::UnderReview));
    }

    #[test]
    fn test_empty_record_has_no_status() {
        let record = ClaimRecord::new("c-1");
        assert_eq!(record.current_status, None);
        assert!(record.history.is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut record = ClaimRecord::new("c-1");
        record.apply(
            ClaimStatusUpdate::new("c-1", ClaimStatus::Approved).with_decision(DecisionData {
                reference_number: Some("REF-1".to_string()),
                ..Default::default()
            }),
        );

        let json = serde_json::to_string(&record).unwrap();
        let parsed: ClaimRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
