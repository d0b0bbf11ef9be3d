//! End-to-end demo: a patient context proves eligibility and shares a
//! claim bundle; an insurer context verifies it and publishes a decision;
//! the patient's projection converges on the final lifecycle view.

use std::path::PathBuf;

use tracing::info;
use tracing_subscriber::EnvFilter;

use claims::bundle::{ClaimType, PolicyDetails};
use claims::errors::ClaimError;
use claims::insurer::InsurerFlow;
use claims::patient::PatientFlow;
use claims::projection;
use claims::store::ClaimStore;
use claims::sync::{SyncChannel, broadcast_channel};
use claims::transport;

use proof_engine::engine::SimulatedProofEngine;
use proof_engine::types::EligibilityInput;

#[tokio::main]
async fn main() -> Result<(), ClaimError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Tab-local persistence lives under claims/data (ignored by git).
    let data_dir = PathBuf::from("data");
    std::fs::create_dir_all(&data_dir).map_err(|e| ClaimError::Storage(e.to_string()))?;

    let db_path = data_dir.join("claims.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let store = ClaimStore::connect(&db_url).await?;
    store.init_schema().await?;

    // Two independent contexts sharing the durable log and a live path.
    let live = broadcast_channel(32);
    let patient_ctx = SyncChannel::open(store.clone(), Some(live.clone()));
    let insurer_ctx = SyncChannel::open(store, Some(live));

    let mut patient = PatientFlow::new(SimulatedProofEngine::default(), &patient_ctx);

    let mut input = EligibilityInput::default();
    input.measurements.insert("sugar".to_string(), 131.0);
    input.thresholds.insert("sugar".to_string(), 126.0);

    info!("generating witness");
    patient.upload_report(input).await?;
    info!("generating proof");
    patient.generate_proof().await?;

    patient.build_claim(
        PolicyDetails {
            number: "POL-2024-00123".to_string(),
            claim_type: Some(ClaimType::LabDiagnostics),
            insurer_name: "Aurora Mutual".to_string(),
            notes: "Quarterly eligibility screening".to_string(),
        },
        "lab-042",
    )?;

    let bundle = match patient.bundle() {
        Some(b) => b.clone(),
        None => return Err(ClaimError::Storage("bundle missing after build".to_string())),
    };
    let claim_id = bundle.claim_id.clone();

    let _watch = patient_ctx.subscribe(&claim_id, |update| {
        info!(status = %update.status, "patient saw status update");
    });

    patient.mark_shared().await?;

    // Bundle leaves the patient context out-of-band.
    let link = transport::to_share_link(&bundle, "https://claims.example/verify")?;
    info!(%link, "bundle shared via link");
    let bundle_path = PathBuf::from("data").join("claim-bundle.json");
    transport::write_bundle_file(&bundle, &bundle_path)?;

    let mut insurer = InsurerFlow::new(SimulatedProofEngine::default(), &insurer_ctx);
    let raw = std::fs::read_to_string(&bundle_path).map_err(|e| ClaimError::Storage(e.to_string()))?;
    insurer.load_bundle(&raw)?;

    let is_valid = insurer.verify().await?;
    for check in insurer.checks() {
        info!(check = check.name, passed = check.passed, detail = %check.detail, "verification check");
    }

    if is_valid {
        let reference = insurer
            .approve_claim("Eligibility proof verified; approved.")
            .await?;
        info!(%reference, "claim approved");
    } else {
        info!("claim is not valid; no decision published");
    }

    // Give the live path a moment to fan out before reading the final view.
    tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;

    if let Some(record) = patient_ctx.record(&claim_id).await? {
        for step in projection::project(&record) {
            info!(step = step.id, state = ?step.state, "final projection");
        }
    }

    Ok(())
}
