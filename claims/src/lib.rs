//! Core of the privacy-preserving insurance-claim workflow.
//!
//! This crate contains:
//! - The immutable claim bundle shared between patient and insurer.
//! - A synchronization channel that converges independent contexts on a
//!   shared, ordered view of a claim's lifecycle (durable log + best-effort
//!   live broadcast).
//! - The projection that turns a claim's update history into a display-ready
//!   step list.
//! - The patient-side and insurer-side workflow state machines.

pub mod bundle;
pub mod errors;
pub mod insurer;
pub mod patient;
pub mod progress;
pub mod projection;
pub mod record;
pub mod store;
pub mod sync;
pub mod transport;
