//! Insurer-side verification workflow.
//!
//! AWAITING → PARSING → PARSED → VERIFYING → {VALID|INVALID} →
//! {APPROVED|REJECTED}. Verification runs every check and reports each one
//! even when an earlier check fails, so the reviewer gets full diagnostic
//! detail.

use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use tokio::time::{Duration, sleep};
use tracing::{info, warn};

use proof_engine::engine::ProofEngine;

use crate::bundle::ClaimBundle;
use crate::errors::ClaimError;
use crate::record::{ClaimStatus, ClaimStatusUpdate, DecisionData};
use crate::sync::SyncChannel;
use crate::transport;

/// Pause between the `verified` update and the decision, so the patient's
/// projection observes them in order.
pub const DECISION_DELAY: Duration = Duration::from_millis(1_200);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsurerState {
    Awaiting,
    Parsing,
    Parsed,
    Verifying,
    Valid,
    Invalid,
    Approved,
    Rejected,
}

impl std::fmt::Display for InsurerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Awaiting => "AWAITING",
            Self::Parsing => "PARSING",
            Self::Parsed => "PARSED",
            Self::Verifying => "VERIFYING",
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// One independent verification check with a human-readable detail.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

pub struct InsurerFlow<'a, E> {
    engine: E,
    channel: &'a SyncChannel,
    state: InsurerState,
    bundle: Option<ClaimBundle>,
    checks: Vec<VerificationCheck>,
    reference_number: Option<String>,
}

impl<'a, E: ProofEngine> InsurerFlow<'a, E> {
    pub fn new(engine: E, channel: &'a SyncChannel) -> Self {
        Self {
            engine,
            channel,
            state: InsurerState::Awaiting,
            bundle: None,
            checks: Vec::new(),
            reference_number: None,
        }
    }

    pub fn state(&self) -> InsurerState {
        self.state
    }

    pub fn bundle(&self) -> Option<&ClaimBundle> {
        self.bundle.as_ref()
    }

    pub fn checks(&self) -> &[VerificationCheck] {
        &self.checks
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    /// Parse and validate an incoming bundle payload (any transport form).
    ///
    /// Malformed or structurally invalid payloads revert to AWAITING. An
    /// expired bundle still loads, for inspection; expiry is reported by
    /// `verify`.
    pub fn load_bundle(&mut self, raw: &str) -> Result<(), ClaimError> {
        self.require(InsurerState::Awaiting, "PARSING")?;
        self.state = InsurerState::Parsing;

        let bundle = match transport::decode_payload(raw) {
            Ok(bundle) => bundle,
            Err(e) => {
                self.state = InsurerState::Awaiting;
                return Err(e);
            }
        };

        let structural = bundle.validate_structure();
        if !structural.is_empty() {
            self.state = InsurerState::Awaiting;
            return Err(ClaimError::InvalidBundle(structural));
        }

        if bundle.is_expired() {
            warn!(claim_id = %bundle.claim_id, "loaded expired claim bundle");
        }

        info!(claim_id = %bundle.claim_id, submitter = %bundle.submitter_id, "claim bundle loaded");
        self.bundle = Some(bundle);
        self.state = InsurerState::Parsed;
        Ok(())
    }

    /// Run the full check sequence and settle on VALID or INVALID.
    pub async fn verify(&mut self) -> Result<bool, ClaimError> {
        self.require(InsurerState::Parsed, "VERIFYING")?;
        let bundle = match self.bundle.clone() {
            Some(b) => b,
            None => {
                return Err(ClaimError::InvalidTransition {
                    from: self.state.to_string(),
                    to: "VERIFYING".to_string(),
                });
            }
        };

        self.state = InsurerState::Verifying;
        let published = self
            .channel
            .publish(ClaimStatusUpdate::new(&bundle.claim_id, ClaimStatus::UnderReview))
            .await;
        if let Err(e) = published {
            self.state = InsurerState::Parsed;
            return Err(e);
        }

        let mut checks = Vec::with_capacity(5);

        let structural = bundle.validate_structure();
        checks.push(VerificationCheck {
            name: "structure",
            passed: structural.is_empty(),
            detail: if structural.is_empty() {
                "all required fields present".to_string()
            } else {
                structural.join("; ")
            },
        });

        checks.push(VerificationCheck {
            name: "expiry",
            passed: !bundle.is_expired(),
            detail: if bundle.is_expired() {
                format!("expired on {}", bundle.expires_at.to_rfc3339())
            } else {
                format!("{} day(s) remaining", bundle.expiry_days_remaining())
            },
        });

        checks.push(VerificationCheck {
            name: "circuit",
            passed: !bundle.proof.circuit_id.is_empty(),
            detail: if bundle.proof.circuit_id.is_empty() {
                "missing circuit identifier".to_string()
            } else {
                bundle.proof.circuit_id.clone()
            },
        });

        // Engine failure becomes a failed check, not an early return.
        let crypto = self
            .engine
            .verify_proof(&bundle.proof.hash, &bundle.proof.verification_key)
            .await;
        checks.push(match crypto {
            Ok(true) => VerificationCheck {
                name: "proof",
                passed: true,
                detail: "proof verified against verification key".to_string(),
            },
            Ok(false) => VerificationCheck {
                name: "proof",
                passed: false,
                detail: "proof did not verify".to_string(),
            },
            Err(e) => VerificationCheck {
                name: "proof",
                passed: false,
                detail: format!("verifier error: {e}"),
            },
        });

        let expected_inputs = bundle.public_params.thresholds.len();
        let got_inputs = bundle.proof.public_inputs.len();
        checks.push(VerificationCheck {
            name: "public_inputs",
            passed: got_inputs > 0 && got_inputs == expected_inputs,
            detail: format!("{got_inputs} public input(s), expected {expected_inputs}"),
        });

        let is_valid = checks.iter().all(|c| c.passed);
        self.checks = checks;
        self.state = if is_valid {
            InsurerState::Valid
        } else {
            InsurerState::Invalid
        };
        info!(claim_id = %bundle.claim_id, is_valid, "verification finished");
        Ok(is_valid)
    }

    /// Approve a verified claim and publish the decision.
    pub async fn approve_claim(&mut self, reviewer_notes: &str) -> Result<String, ClaimError> {
        self.decide(ClaimStatus::Approved, InsurerState::Approved, reviewer_notes)
            .await
    }

    /// Reject a verified claim and publish the decision.
    pub async fn reject_claim(&mut self, reviewer_notes: &str) -> Result<String, ClaimError> {
        self.decide(ClaimStatus::Rejected, InsurerState::Rejected, reviewer_notes)
            .await
    }

    async fn decide(
        &mut self,
        status: ClaimStatus,
        target: InsurerState,
        reviewer_notes: &str,
    ) -> Result<String, ClaimError> {
        self.require(InsurerState::Valid, &target.to_string())?;
        let claim_id = match &self.bundle {
            Some(b) => b.claim_id.clone(),
            None => {
                return Err(ClaimError::InvalidTransition {
                    from: self.state.to_string(),
                    to: target.to_string(),
                });
            }
        };

        let verified_at = Utc::now();
        self.channel
            .publish(
                ClaimStatusUpdate::new(&claim_id, ClaimStatus::Verified).with_decision(
                    DecisionData {
                        verified_at: Some(verified_at),
                        ..Default::default()
                    },
                ),
            )
            .await?;

        sleep(DECISION_DELAY).await;

        let reference = new_reference_number();
        let decision = DecisionData {
            reference_number: Some(reference.clone()),
            reviewer_notes: (!reviewer_notes.is_empty()).then(|| reviewer_notes.to_string()),
            decided_at: Some(Utc::now()),
            verified_at: Some(verified_at),
        };
        self.channel
            .publish(ClaimStatusUpdate::new(&claim_id, status).with_decision(decision))
            .await?;

        info!(%claim_id, %status, %reference, "decision published");
        self.state = target;
        self.reference_number = Some(reference.clone());
        Ok(reference)
    }

    /// Full reset back to AWAITING.
    pub fn reset(&mut self) {
        self.state = InsurerState::Awaiting;
        self.bundle = None;
        self.checks.clear();
        self.reference_number = None;
    }

    fn require(&self, expected: InsurerState, target: &str) -> Result<(), ClaimError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ClaimError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            })
        }
    }
}

fn new_reference_number() -> String {
    let mut buf = [0u8; 2];
    rand::thread_rng().fill_bytes(&mut buf);
    format!(
        "REF-{}-{}",
        Utc::now().format("%Y%m%d"),
        hex::encode(buf).to_uppercase()
    )
}
