//! The claim bundle: the one artifact that crosses the trust boundary.
//!
//! Bundles are immutable once built. Status changes live entirely in the
//! per-claim update log (`record`), never in the bundle. The proof material
//! carried here contains no private data by construction: it is a digest,
//! the disclosed thresholds, and circuit metadata.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use proof_engine::constants::{CIRCUIT_ID, CONSTRAINT_COUNT};
use proof_engine::types::ProofArtifact;

use crate::errors::ClaimError;

/// Schema tag; must match exactly for a bundle to be accepted.
pub const SCHEMA_VERSION: &str = "1.0";

/// Fixed validity window from creation.
pub const VALIDITY_DAYS: i64 = 30;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    OutpatientCare,
    LabDiagnostics,
    Pharmacy,
    PreventiveScreening,
    SpecialistReferral,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyDetails {
    pub number: String,
    pub claim_type: Option<ClaimType>,
    pub insurer_name: String,
    pub notes: String,
}

/// Opaque verification material.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProofMaterial {
    pub hash: String,
    pub public_inputs: Vec<String>,
    pub verification_key: String,
    pub circuit_id: String,
    pub constraint_count: u64,
    pub proving_time_ms: u64,
}

/// The disclosed thresholds being attested, plus the source lab.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublicParams {
    pub thresholds: BTreeMap<String, f64>,
    pub lab_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBundle {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub claim_id: String,
    #[serde(default)]
    pub policy: PolicyDetails,
    #[serde(default)]
    pub proof: ProofMaterial,
    #[serde(default)]
    pub public_params: PublicParams,
    #[serde(default = "unix_epoch")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "unix_epoch")]
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub submitter_id: String,
}

/// Result of structural + expiry validation.
///
/// Every violation is enumerated rather than short-circuiting on the first,
/// so a reviewer sees all problems at once.
#[derive(Clone, Debug)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ClaimBundle {
    /// Assemble a bundle from a finished proof artifact and claim metadata.
    ///
    /// The claim id and submitter token are generated here, once, and never
    /// reassigned.
    pub fn build(
        artifact: &ProofArtifact,
        policy: PolicyDetails,
        thresholds: BTreeMap<String, f64>,
        lab_id: &str,
    ) -> Self {
        let created_at = Utc::now();

        Self {
            version: SCHEMA_VERSION.to_string(),
            claim_id: format!(
                "CLM-{}-{}",
                created_at.format("%Y%m%d"),
                random_hex(3).to_uppercase()
            ),
            policy,
            proof: ProofMaterial {
                hash: artifact.proof.clone(),
                public_inputs: artifact.public_signals.clone(),
                verification_key: artifact.verification_key.clone(),
                circuit_id: CIRCUIT_ID.to_string(),
                constraint_count: CONSTRAINT_COUNT,
                proving_time_ms: artifact.proving_time_ms,
            },
            public_params: PublicParams {
                thresholds,
                lab_id: lab_id.to_string(),
            },
            created_at,
            expires_at: created_at + Duration::days(VALIDITY_DAYS),
            // Pseudonymous, unrelated to any real identity.
            submitter_id: format!("anon-{}", random_hex(6)),
        }
    }

    /// Pretty-printed JSON wire form.
    pub fn to_json(&self) -> Result<String, ClaimError> {
        serde_json::to_string_pretty(self).map_err(|e| ClaimError::Serialization(e.to_string()))
    }

    /// Parse a bundle from its wire form.
    ///
    /// Permissive about unknown and missing non-signature fields, strict
    /// about malformed JSON and the signature fields (`version`, `claimId`,
    /// `proof.hash`).
    pub fn from_json(raw: &str) -> Result<Self, ClaimError> {
        let bundle: ClaimBundle =
            serde_json::from_str(raw).map_err(|e| ClaimError::MalformedBundle(e.to_string()))?;

        let mut missing = Vec::new();
        if bundle.version.is_empty() {
            missing.push("version");
        }
        if bundle.claim_id.is_empty() {
            missing.push("claimId");
        }
        if bundle.proof.hash.is_empty() {
            missing.push("proof.hash");
        }
        if !missing.is_empty() {
            return Err(ClaimError::MalformedBundle(format!(
                "missing signature field(s): {}",
                missing.join(", ")
            )));
        }

        Ok(bundle)
    }

    /// Required-field checks only, no expiry.
    pub fn validate_structure(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.version != SCHEMA_VERSION {
            errors.push(format!("version: must be \"{SCHEMA_VERSION}\""));
        }
        if self.claim_id.is_empty() {
            errors.push("claimId: required".to_string());
        }
        if self.proof.hash.is_empty() {
            errors.push("proof.hash: required".to_string());
        }
        if self.proof.verification_key.is_empty() {
            errors.push("proof.verificationKey: required".to_string());
        }
        if self.proof.public_inputs.is_empty() {
            errors.push("proof.publicInputs: must not be empty".to_string());
        }
        if self.policy.number.is_empty() {
            errors.push("policy.number: required".to_string());
        }
        if self.policy.claim_type.is_none() {
            errors.push("policy.claimType: required".to_string());
        }

        errors
    }

    pub fn validate(&self) -> ValidationReport {
        let mut errors = self.validate_structure();
        if self.is_expired() {
            errors.push(format!("claim expired on {}", self.expires_at.to_rfc3339()));
        }

        ValidationReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whole days until expiry, rounded up, floored at zero.
    pub fn expiry_days_remaining(&self) -> i64 {
        let remaining_ms = (self.expires_at - Utc::now()).num_milliseconds();
        if remaining_ms <= 0 {
            0
        } else {
            (remaining_ms as f64 / 86_400_000.0).ceil() as i64
        }
    }
}

fn unix_epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact() -> ProofArtifact {
        ProofArtifact {
            proof: "ab".repeat(32),
            public_signals: vec!["126".to_string()],
            verification_key: "cd".repeat(32),
            proving_time_ms: 2_310,
        }
    }

    fn policy() -> PolicyDetails {
        PolicyDetails {
            number: "POL-2024-00123".to_string(),
            claim_type: Some(ClaimType::LabDiagnostics),
            insurer_name: "Aurora Mutual".to_string(),
            notes: "Quarterly screening".to_string(),
        }
    }

    fn bundle() -> ClaimBundle {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("sugar".to_string(), 126.0);
        ClaimBundle::build(&artifact(), policy(), thresholds, "lab-042")
    }

    #[test]
    fn test_round_trip_identity() {
        let b = bundle();
        let parsed = ClaimBundle::from_json(&b.to_json().unwrap()).unwrap();
        assert_eq!(parsed, b);
    }

    #[test]
    fn test_fresh_bundle_is_valid() {
        let report = bundle().validate();
        assert!(report.valid, "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let mut value: serde_json::Value = serde_json::from_str(&bundle().to_json().unwrap()).unwrap();
        value["futureField"] = serde_json::json!({"nested": true});
        let parsed = ClaimBundle::from_json(&value.to_string());
        assert!(parsed.is_ok());
    }

    #[test]
    fn test_missing_signature_fields_reject_the_payload() {
        for field in ["version", "claimId"] {
            let mut value: serde_json::Value =
                serde_json::from_str(&bundle().to_json().unwrap()).unwrap();
            value.as_object_mut().unwrap().remove(field);
            let parsed = ClaimBundle::from_json(&value.to_string());
            assert!(matches!(parsed, Err(ClaimError::MalformedBundle(_))), "{field}");
        }

        let mut value: serde_json::Value = serde_json::from_str(&bundle().to_json().unwrap()).unwrap();
        value["proof"].as_object_mut().unwrap().remove("hash");
        assert!(matches!(
            ClaimBundle::from_json(&value.to_string()),
            Err(ClaimError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            ClaimBundle::from_json("{not json"),
            Err(ClaimError::MalformedBundle(_))
        ));
    }

    #[test]
    fn test_validation_reports_each_missing_field_once() {
        let cases: Vec<(&str, Box<dyn Fn(&mut ClaimBundle)>)> = vec![
            ("version", Box::new(|b| b.version.clear())),
            ("claimId", Box::new(|b| b.claim_id.clear())),
            ("proof.hash", Box::new(|b| b.proof.hash.clear())),
            (
                "proof.verificationKey",
                Box::new(|b| b.proof.verification_key.clear()),
            ),
            (
                "proof.publicInputs",
                Box::new(|b| b.proof.public_inputs.clear()),
            ),
            ("policy.number", Box::new(|b| b.policy.number.clear())),
            ("policy.claimType", Box::new(|b| b.policy.claim_type = None)),
        ];

        for (name, clear) in &cases {
            let mut b = bundle();
            clear(&mut b);
            let report = b.validate();
            assert!(!report.valid);
            assert_eq!(report.errors.len(), 1, "{name}: {:?}", report.errors);
            assert!(report.errors[0].starts_with(name), "{name}: {:?}", report.errors);
        }
    }

    #[test]
    fn test_validation_accumulates_multiple_errors() {
        let mut b = bundle();
        b.policy.number.clear();
        b.proof.verification_key.clear();
        let report = b.validate();
        assert!(report.errors.len() >= 2);
    }

    #[test]
    fn test_expiry_monotonicity() {
        let fresh = bundle();
        assert!(!fresh.is_expired());
        assert_eq!(fresh.expiry_days_remaining(), VALIDITY_DAYS);

        let mut old = bundle();
        old.created_at = Utc::now() - Duration::days(VALIDITY_DAYS + 1);
        old.expires_at = old.created_at + Duration::days(VALIDITY_DAYS);
        assert!(old.is_expired());
        assert_eq!(old.expiry_days_remaining(), 0);

        let mut halfway = bundle();
        halfway.created_at = Utc::now() - Duration::days(10);
        halfway.expires_at = halfway.created_at + Duration::days(VALIDITY_DAYS);
        assert!(!halfway.is_expired());
        assert!(halfway.expiry_days_remaining() <= VALIDITY_DAYS - 10);
        assert!(halfway.expiry_days_remaining() > 0);
    }

    #[test]
    fn test_expired_bundle_reports_expiry_error() {
        let mut b = bundle();
        b.expires_at = Utc::now() - Duration::seconds(1);
        let report = b.validate();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("expired"));
    }

    #[test]
    fn test_generated_identifiers_are_fresh_per_bundle() {
        let a = bundle();
        let b = bundle();
        assert_ne!(a.claim_id, b.claim_id);
        assert_ne!(a.submitter_id, b.submitter_id);
        assert!(a.claim_id.starts_with("CLM-"));
        assert!(a.submitter_id.starts_with("anon-"));
    }
}
