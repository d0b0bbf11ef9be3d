//! Patient-side claim workflow.
//!
//! IDLE → GENERATING_WITNESS → WITNESS_READY → PROVING → PROOF_GENERATED
//! → CLAIM_READY → SHARED. Each forward transition is an explicit user
//! action; engine failures revert to the prior stable state and surface
//! the error, never leaving the machine in a transitional state.

use std::collections::BTreeMap;

use tokio::time::{Duration, sleep};
use tracing::info;

use proof_engine::engine::ProofEngine;
use proof_engine::types::{EligibilityInput, ProofArtifact, Witness};

use crate::bundle::{ClaimBundle, PolicyDetails};
use crate::errors::ClaimError;
use crate::progress::ProgressTicker;
use crate::record::{ClaimStatus, ClaimStatusUpdate};
use crate::sync::SyncChannel;

/// Pause between the submission updates and `under_review`, so the insurer
/// side appears to pick the claim up.
pub const UNDER_REVIEW_DELAY: Duration = Duration::from_millis(1_500);

const PROGRESS_PERIOD: Duration = Duration::from_millis(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatientState {
    Idle,
    GeneratingWitness,
    WitnessReady,
    Proving,
    ProofGenerated,
    ClaimReady,
    Shared,
}

impl std::fmt::Display for PatientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::GeneratingWitness => "GENERATING_WITNESS",
            Self::WitnessReady => "WITNESS_READY",
            Self::Proving => "PROVING",
            Self::ProofGenerated => "PROOF_GENERATED",
            Self::ClaimReady => "CLAIM_READY",
            Self::Shared => "SHARED",
        };
        f.write_str(s)
    }
}

pub struct PatientFlow<'a, E> {
    engine: E,
    channel: &'a SyncChannel,
    state: PatientState,
    input: Option<EligibilityInput>,
    witness: Option<Witness>,
    artifact: Option<ProofArtifact>,
    bundle: Option<ClaimBundle>,
    progress: Option<ProgressTicker>,
}

impl<'a, E: ProofEngine> PatientFlow<'a, E> {
    pub fn new(engine: E, channel: &'a SyncChannel) -> Self {
        Self {
            engine,
            channel,
            state: PatientState::Idle,
            input: None,
            witness: None,
            artifact: None,
            bundle: None,
            progress: None,
        }
    }

    pub fn state(&self) -> PatientState {
        self.state
    }

    pub fn bundle(&self) -> Option<&ClaimBundle> {
        self.bundle.as_ref()
    }

    pub fn artifact(&self) -> Option<&ProofArtifact> {
        self.artifact.as_ref()
    }

    /// Progress of the in-flight (or just-finished) engine operation.
    pub fn progress_percent(&self) -> u8 {
        self.progress.as_ref().map(|p| p.percent()).unwrap_or(0)
    }

    /// Ingest the lab report values and generate a witness.
    pub async fn upload_report(&mut self, input: EligibilityInput) -> Result<(), ClaimError> {
        self.require(PatientState::Idle, "GENERATING_WITNESS")?;
        self.state = PatientState::GeneratingWitness;
        self.begin_progress();

        let init = self.engine.initialize_circuit().await;
        if let Err(e) = init {
            self.fail_back_to(PatientState::Idle);
            return Err(e.into());
        }

        let generated = self.engine.generate_witness(&input).await;
        match generated {
            Ok(witness) => {
                self.finish_progress();
                self.witness = Some(witness);
                self.input = Some(input);
                self.state = PatientState::WitnessReady;
                info!("witness generated");
                Ok(())
            }
            Err(e) => {
                self.fail_back_to(PatientState::Idle);
                Err(e.into())
            }
        }
    }

    pub async fn generate_proof(&mut self) -> Result<(), ClaimError> {
        self.require(PatientState::WitnessReady, "PROVING")?;
        let witness = self.witness.clone().ok_or_else(|| ClaimError::InvalidTransition {
            from: self.state.to_string(),
            to: "PROVING".to_string(),
        })?;

        self.state = PatientState::Proving;
        self.begin_progress();

        let proved = self.engine.generate_proof(&witness).await;
        match proved {
            Ok(artifact) => {
                self.finish_progress();
                info!(proving_time_ms = artifact.proving_time_ms, "proof generated");
                self.artifact = Some(artifact);
                self.state = PatientState::ProofGenerated;
                Ok(())
            }
            Err(e) => {
                self.fail_back_to(PatientState::WitnessReady);
                Err(e.into())
            }
        }
    }

    /// Assemble the immutable claim bundle from the proof artifact.
    pub fn build_claim(&mut self, policy: PolicyDetails, lab_id: &str) -> Result<(), ClaimError> {
        self.require(PatientState::ProofGenerated, "CLAIM_READY")?;
        let artifact = self.artifact.as_ref().ok_or_else(|| ClaimError::InvalidTransition {
            from: self.state.to_string(),
            to: "CLAIM_READY".to_string(),
        })?;
        let thresholds: BTreeMap<String, f64> = self
            .input
            .as_ref()
            .map(|i| i.thresholds.clone())
            .unwrap_or_default();

        let bundle = ClaimBundle::build(artifact, policy, thresholds, lab_id);
        info!(claim_id = %bundle.claim_id, "claim bundle built");
        self.bundle = Some(bundle);
        self.state = PatientState::ClaimReady;
        Ok(())
    }

    /// Record that the bundle left the device and publish the initial
    /// lifecycle updates.
    pub async fn mark_shared(&mut self) -> Result<(), ClaimError> {
        self.require(PatientState::ClaimReady, "SHARED")?;
        let claim_id = match &self.bundle {
            Some(b) => b.claim_id.clone(),
            None => {
                return Err(ClaimError::InvalidTransition {
                    from: self.state.to_string(),
                    to: "SHARED".to_string(),
                });
            }
        };

        self.channel
            .publish(ClaimStatusUpdate::new(&claim_id, ClaimStatus::ProofGenerated))
            .await?;
        self.channel
            .publish(ClaimStatusUpdate::new(&claim_id, ClaimStatus::ClaimSubmitted))
            .await?;
        self.state = PatientState::Shared;
        info!(%claim_id, "claim shared");

        sleep(UNDER_REVIEW_DELAY).await;
        self.channel
            .publish(ClaimStatusUpdate::new(&claim_id, ClaimStatus::UnderReview))
            .await?;
        Ok(())
    }

    /// Full reset back to IDLE for a new claim.
    pub fn reset(&mut self) {
        self.state = PatientState::Idle;
        self.input = None;
        self.witness = None;
        self.artifact = None;
        self.bundle = None;
        self.progress = None;
    }

    fn begin_progress(&mut self) {
        // Dropping any previous ticker first; its timer must not outlive
        // the operation that owned it.
        self.progress = None;
        self.progress = Some(ProgressTicker::start(PROGRESS_PERIOD));
    }

    fn finish_progress(&mut self) {
        if let Some(ticker) = &self.progress {
            ticker.complete();
        }
    }

    fn fail_back_to(&mut self, state: PatientState) {
        self.progress = None;
        self.state = state;
    }

    fn require(&self, expected: PatientState, target: &str) -> Result<(), ClaimError> {
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
