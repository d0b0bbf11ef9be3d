//! Derives the display-ready step list from a claim's update log.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::record::{ClaimRecord, ClaimStatus, DecisionData};

/// The canonical forward progression shown to the patient.
pub const CANONICAL_PROGRESSION: [ClaimStatus; 5] = [
    ClaimStatus::ProofGenerated,
    ClaimStatus::ClaimSubmitted,
    ClaimStatus::UnderReview,
    ClaimStatus::Verified,
    ClaimStatus::Approved,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Complete,
    Current,
    Pending,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusStep {
    pub id: &'static str,
    pub label: String,
    pub description: String,
    pub state: StepState,
    pub timestamp: Option<DateTime<Utc>>,
    pub decision: Option<DecisionData>,
}

const DEFAULT_COPY: [(&str, &str); 5] = [
    (
        "Proof Generated",
        "A zero-knowledge eligibility proof was generated on your device.",
    ),
    ("Claim Submitted", "The claim bundle was shared with the insurer."),
    ("Under Review", "The insurer is reviewing the claim."),
    ("Proof Verified", "The insurer verified the eligibility proof."),
    ("Claim Approved", "The insurer approved the claim."),
];

const REJECTED_LABEL: &str = "Claim Rejected";
const REJECTED_COPY: &str = "The insurer rejected the claim.";

/// Position of a status in the canonical progression. `Rejected` shares the
/// terminal index with `Approved`.
fn progression_index(status: ClaimStatus) -> usize {
    match status {
        ClaimStatus::ProofGenerated => 0,
        ClaimStatus::ClaimSubmitted => 1,
        ClaimStatus::UnderReview => 2,
        ClaimStatus::Verified => 3,
        ClaimStatus::Approved | ClaimStatus::Rejected => 4,
    }
}

/// Project a record onto the fixed five-step progression.
///
/// Steps before the current status are complete, the current one is
/// current, the rest pending. A rejected claim replaces the terminal step
/// with a "Claim Rejected" step that is always current, never complete. A
/// record with no status projects everything as pending.
pub fn project(record: &ClaimRecord) -> Vec<StatusStep> {
    let rejected = record.current_status == Some(ClaimStatus::Rejected);
    let current_index = record.current_status.map(progression_index);

    CANONICAL_PROGRESSION
        .iter()
        .enumerate()
        .map(|(i, step_status)| {
            let state = match current_index {
                None => StepState::Pending,
                Some(c) if i < c => StepState::Complete,
                Some(c) if i == c => StepState::Current,
                Some(_) => StepState::Pending,
            };

            let terminal_rejection = rejected && i == CANONICAL_PROGRESSION.len() - 1;
            let source_status = if terminal_rejection {
                ClaimStatus::Rejected
            } else {
                *step_status
            };
            let entry = record.latest_for(source_status);

            let (label, default_copy) = if terminal_rejection {
                (REJECTED_LABEL, REJECTED_COPY)
            } else {
                (DEFAULT_COPY[i].0, DEFAULT_COPY[i].1)
            };

            let description = entry
                .and_then(|u| u.decision.as_ref())
                .and_then(|d| d.reviewer_notes.clone())
                .unwrap_or_else(|| default_copy.to_string());

            StatusStep {
                id: source_status.as_str(),
                label: label.to_string(),
                description,
                state,
                timestamp: entry.map(|u| u.timestamp),
                decision: entry.and_then(|u| u.decision.clone()),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ClaimStatusUpdate;
    use chrono::Duration;

    fn record_through(statuses: &[ClaimStatus]) -> ClaimRecord {
        let t0 = Utc::now();
        ClaimRecord::replay(
            "c-1",
            statuses.iter().enumerate().map(|(i, s)| {
                ClaimStatusUpdate::new("c-1", *s).at(t0 + Duration::seconds(i as i64))
            }),
        )
    }

    fn states(steps: &[StatusStep]) -> Vec<StepState> {
        steps.iter().map(|s| s.state).collect()
    }

    #[test]
    fn test_verified_marks_first_three_complete() {
        let record = record_through(&[
            ClaimStatus::ProofGenerated,
            ClaimStatus::ClaimSubmitted,
            ClaimStatus::UnderReview,
            ClaimStatus::Verified,
        ]);
        let steps = project(&record);

        assert_eq!(
            states(&steps),
            vec![
                StepState::Complete,
                StepState::Complete,
                StepState::Complete,
                StepState::Current,
                StepState::Pending,
            ]
        );
    }

    #[test]
    fn test_rejection_is_a_current_terminal_step() {
        let record = record_through(&[
            ClaimStatus::ProofGenerated,
            ClaimStatus::ClaimSubmitted,
            ClaimStatus::UnderReview,
            ClaimStatus::Verified,
            ClaimStatus::Rejected,
        ]);
        let steps = project(&record);

        let last = steps.last().unwrap();
        assert_eq!(last.label, "Claim Rejected");
        assert_eq!(last.id, "rejected");
        assert_eq!(last.state, StepState::Current);
        assert!(steps.iter().all(|s| s.state != StepState::Pending));
    }

    #[test]
    fn test_approved_fills_every_step() {
        let record = record_through(&[
            ClaimStatus::ProofGenerated,
            ClaimStatus::ClaimSubmitted,
            ClaimStatus::UnderReview,
            ClaimStatus::Verified,
            ClaimStatus::Approved,
        ]);
        let steps = project(&record);

        assert_eq!(steps.last().unwrap().state, StepState::Current);
        assert!(steps.iter().all(|s| s.state != StepState::Pending));
    }

    #[test]
    fn test_empty_record_projects_all_pending() {
        let steps = project(&ClaimRecord::new("c-1"));
        assert_eq!(steps.len(), 5);
        assert!(steps.iter().all(|s| s.state == StepState::Pending));
    }

    #[test]
    fn test_reviewer_notes_override_description() {
        let mut record = record_through(&[
            ClaimStatus::ProofGenerated,
            ClaimStatus::ClaimSubmitted,
            ClaimStatus::UnderReview,
            ClaimStatus::Verified,
        ]);
        record.apply(
            ClaimStatusUpdate::new("c-1", ClaimStatus::Approved)
                .at(Utc::now() + Duration::seconds(60))
                .with_decision(crate::record::DecisionData {
                    reference_number: Some("REF-9".to_string()),
                    reviewer_notes: Some("Approved after manual review.".to_string()),
                    ..Default::default()
                }),
        );

        let steps = project(&record);
        let last = steps.last().unwrap();
        assert_eq!(last.description, "Approved after manual review.");
        assert_eq!(
            last.decision.as_ref().unwrap().reference_number.as_deref(),
            Some("REF-9")
        );
    }

    #[test]
    fn test_steps_carry_history_timestamps() {
        let record = record_through(&[ClaimStatus::ProofGenerated, ClaimStatus::ClaimSubmitted]);
        let steps = project(&record);

        assert!(steps[0].timestamp.is_some());
        assert!(steps[1].timestamp.is_some());
        assert!(steps[2].timestamp.is_none());
    }
}
