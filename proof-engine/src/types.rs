//! Types crossing the engine boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("circuit error: {0}")]
    Circuit(String),

    #[error("witness does not satisfy constraints: {0}")]
    Witness(String),

    #[error("prover error: {0}")]
    Prover(String),

    #[error("verification error: {0}")]
    Verification(String),
}

/// Input to witness generation: named measurements and the thresholds they
/// are attested against.
///
/// `BTreeMap` keeps the canonical JSON stable so digests are deterministic.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EligibilityInput {
    /// Private medical measurements, e.g. `{"sugar": 131.0}`. Never leave
    /// this crate except inside an opaque witness.
    pub measurements: BTreeMap<String, f64>,
    /// Public thresholds, e.g. `{"sugar": 126.0}`.
    pub thresholds: BTreeMap<String, f64>,
}

/// Opaque witness handle.
///
/// Carries the private input only so the prover can recompute its digest;
/// nothing derived from `input` beyond the digest ever reaches a proof
/// artifact.
#[derive(Clone, Debug)]
pub struct Witness {
    pub(crate) input: EligibilityInput,
    /// Digest of the full assignment, used as the proof preimage.
    pub digest: String,
}

/// The artifact handed back to the claim workflow.
///
/// Contains no private data: the proof string is a digest, the public
/// signals are the disclosed threshold values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ProofArtifact {
    pub proof: String,
    pub public_signals: Vec<String>,
    pub verification_key: String,
    pub proving_time_ms: u64,
}
