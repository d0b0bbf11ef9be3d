//! The proof oracle interface and its simulated implementation.
//!
//! The workflow core treats the engine as opaque: four async operations with
//! realistic latency that may fail at any call. The simulation derives every
//! artifact from SHA-256 digests of the canonical input encoding, so repeated
//! runs over the same input are reproducible.

use std::ops::RangeInclusive;

use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::time::{Duration, sleep};

use crate::constants::{
    PROOF_DOMAIN, PROVING_LATENCY_MS, SETUP_LATENCY_MS, VERIFY_LATENCY_MS, WITNESS_LATENCY_MS,
};
use crate::types::{EligibilityInput, EngineError, ProofArtifact, Witness};

/// Async proof oracle consumed by the claim workflow.
pub trait ProofEngine {
    async fn initialize_circuit(&self) -> Result<(), EngineError>;

    /// Produce a witness, failing if the input does not satisfy the circuit
    /// constraints (a measurement at or below its threshold).
    async fn generate_witness(&self, input: &EligibilityInput) -> Result<Witness, EngineError>;

    async fn generate_proof(&self, witness: &Witness) -> Result<ProofArtifact, EngineError>;

    async fn verify_proof(
        &self,
        proof: &str,
        verification_key: &str,
    ) -> Result<bool, EngineError>;
}

/// Latency profile for the simulated engine.
#[derive(Clone, Copy, Debug, Default)]
pub enum EngineTiming {
    /// Sampled from the ranges in `constants` — hundreds of ms to seconds.
    #[default]
    Realistic,
    /// Zero latency, for tests.
    Instant,
}

impl EngineTiming {
    fn sample(&self, range: RangeInclusive<u64>) -> Duration {
        match self {
            Self::Realistic => Duration::from_millis(rand::thread_rng().gen_range(range)),
            Self::Instant => Duration::ZERO,
        }
    }
}

/// Simulated prover/verifier.
///
/// Performs no cryptography: proofs are domain-separated digests and
/// verification recomputes the expected verification key.
#[derive(Debug, Default)]
pub struct SimulatedProofEngine {
    timing: EngineTiming,
    force_invalid: bool,
}

impl SimulatedProofEngine {
    pub fn new(timing: EngineTiming) -> Self {
        Self {
            timing,
            force_invalid: false,
        }
    }

    /// An engine whose `verify_proof` always reports an invalid proof.
    pub fn failing_verification(timing: EngineTiming) -> Self {
        Self {
            timing,
            force_invalid: true,
        }
    }

    /// The verification key the simulated circuit setup would emit.
    pub fn verification_key() -> String {
        digest_hex(&["vk", crate::constants::CIRCUIT_ID])
    }
}

fn digest_hex(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Render a threshold as a public signal string ("126", not "126.0").
fn signal(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl ProofEngine for SimulatedProofEngine {
    async fn initialize_circuit(&self) -> Result<(), EngineError> {
        sleep(self.timing.sample(SETUP_LATENCY_MS)).await;
        Ok(())
    }

    async fn generate_witness(&self, input: &EligibilityInput) -> Result<Witness, EngineError> {
        sleep(self.timing.sample(WITNESS_LATENCY_MS)).await;

        for (name, threshold) in &input.thresholds {
            let Some(value) = input.measurements.get(name) else {
                return Err(EngineError::Witness(format!("missing measurement '{name}'")));
            };
            if value <= threshold {
                return Err(EngineError::Witness(format!(
                    "constraint not satisfied: {name} <= {threshold}"
                )));
            }
        }

        let canonical =
            serde_json::to_string(input).map_err(|e| EngineError::Circuit(e.to_string()))?;

        Ok(Witness {
            input: input.clone(),
            digest: digest_hex(&["witness", &canonical]),
        })
    }

    async fn generate_proof(&self, witness: &Witness) -> Result<ProofArtifact, EngineError> {
        let proving_time = self.timing.sample(PROVING_LATENCY_MS);
        sleep(proving_time).await;

        let public_signals = witness
            .input
            .thresholds
            .values()
            .map(|v| signal(*v))
            .collect();

        Ok(ProofArtifact {
            proof: digest_hex(&[PROOF_DOMAIN, &witness.digest]),
            public_signals,
            verification_key: Self::verification_key(),
            proving_time_ms: proving_time.as_millis() as u64,
        })
    }

    async fn verify_proof(
        &self,
        proof: &str,
        verification_key: &str,
    ) -> Result<bool, EngineError> {
        sleep(self.timing.sample(VERIFY_LATENCY_MS)).await;

        if self.force_invalid {
            return Ok(false);
        }

        let well_formed = proof.len() == 64 && proof.bytes().all(|b| b.is_ascii_hexdigit());
        Ok(well_formed && verification_key == Self::verification_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(measured: f64, threshold: f64) -> EligibilityInput {
        let mut i = EligibilityInput::default();
        i.measurements.insert("sugar".to_string(), measured);
        i.thresholds.insert("sugar".to_string(), threshold);
        i
    }

    fn engine() -> SimulatedProofEngine {
        SimulatedProofEngine::new(EngineTiming::Instant)
    }

    #[tokio::test]
    async fn test_witness_fails_below_threshold() {
        let err = engine().generate_witness(&input(120.0, 126.0)).await;
        assert!(matches!(err, Err(EngineError::Witness(_))));
    }

    #[tokio::test]
    async fn test_witness_fails_at_threshold() {
        let err = engine().generate_witness(&input(126.0, 126.0)).await;
        assert!(matches!(err, Err(EngineError::Witness(_))));
    }

    #[tokio::test]
    async fn test_witness_fails_on_missing_measurement() {
        let mut i = EligibilityInput::default();
        i.thresholds.insert("sugar".to_string(), 126.0);
        let err = engine().generate_witness(&i).await;
        assert!(matches!(err, Err(EngineError::Witness(_))));
    }

    #[tokio::test]
    async fn test_proof_round_trip_verifies() {
        let e = engine();
        let w = e.generate_witness(&input(131.0, 126.0)).await.unwrap();
        let artifact = e.generate_proof(&w).await.unwrap();

        assert_eq!(artifact.public_signals, vec!["126".to_string()]);
        let ok = e
            .verify_proof(&artifact.proof, &artifact.verification_key)
            .await
            .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn test_proof_is_deterministic_for_same_input() {
        let e = engine();
        let w1 = e.generate_witness(&input(131.0, 126.0)).await.unwrap();
        let w2 = e.generate_witness(&input(131.0, 126.0)).await.unwrap();
        assert_eq!(w1.digest, w2.digest);

        let p1 = e.generate_proof(&w1).await.unwrap();
        let p2 = e.generate_proof(&w2).await.unwrap();
        assert_eq!(p1.proof, p2.proof);
    }

    #[tokio::test]
    async fn test_forced_verification_failure() {
        let e = SimulatedProofEngine::failing_verification(EngineTiming::Instant);
        let w = e.generate_witness(&input(131.0, 126.0)).await.unwrap();
        let artifact = e.generate_proof(&w).await.unwrap();
        let ok = e
            .verify_proof(&artifact.proof, &artifact.verification_key)
            .await
            .unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn test_garbage_proof_does_not_verify() {
        let ok = engine()
            .verify_proof("not-a-proof", &SimulatedProofEngine::verification_key())
            .await
            .unwrap();
        assert!(!ok);
    }
}
