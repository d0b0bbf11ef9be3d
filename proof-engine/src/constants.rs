//! Crate-wide constants shared by the simulated engine and the claim workflow.

use std::ops::RangeInclusive;

/// Identifier of the (simulated) eligibility circuit.
///
/// The insurer checks this tag is present in a bundle before accepting the
/// attached proof material.
pub const CIRCUIT_ID: &str = "eligibility_threshold_v1";

/// Constraint count reported for the simulated circuit.
///
/// Chosen to look like a small comparison circuit; the value is metadata
/// only and never enforced.
pub const CONSTRAINT_COUNT: u64 = 18_432;

/// Domain separator mixed into simulated proof digests.
pub const PROOF_DOMAIN: &str = "claim-proof-sim-v1";

/// Latency ranges (milliseconds) for the realistic timing profile.
///
/// These approximate a browser-side WASM prover: witness generation is
/// sub-second, proving takes seconds, verification is in between.
pub const WITNESS_LATENCY_MS: RangeInclusive<u64> = 400..=900;
pub const PROVING_LATENCY_MS: RangeInclusive<u64> = 1_500..=4_000;
pub const VERIFY_LATENCY_MS: RangeInclusive<u64> = 600..=1_200;
pub const SETUP_LATENCY_MS: RangeInclusive<u64> = 200..=500;
