//! Proof oracle for the privacy-preserving claim workflow.
//!
//! This crate contains:
//! - The async `ProofEngine` interface the claim workflow suspends on.
//! - A simulated engine with realistic latency and deterministic, digest-based
//!   artifacts. It performs no real proof computation.
//! - The circuit metadata and input/witness/artifact types that cross the
//!   engine boundary.

pub mod constants;
pub mod engine;
pub mod types;
