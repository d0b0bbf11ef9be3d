use proof_engine::types::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("malformed claim bundle: {0}")]
    MalformedBundle(String),

    #[error("claim bundle failed validation: {}", .0.join("; "))]
    InvalidBundle(Vec<String>),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("proof engine failed: {0}")]
    Engine(#[from] EngineError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
