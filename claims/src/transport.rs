//! Out-of-band bundle transport helpers.
//!
//! The serialized bundle crosses the trust boundary four ways: file
//! download/upload, clipboard, base64-encoded link parameter, and QR
//! payload. Clipboard and QR carry the raw JSON; `decode_payload` accepts
//! every form interchangeably.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};

use crate::bundle::ClaimBundle;
use crate::errors::ClaimError;

/// Query parameter carrying the encoded bundle in a share link.
pub const LINK_PARAM: &str = "claim";

/// Accept a bundle payload from any transport path: raw JSON or
/// base64-encoded JSON.
pub fn decode_payload(raw: &str) -> Result<ClaimBundle, ClaimError> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') {
        return ClaimBundle::from_json(trimmed);
    }

    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(trimmed))
        .map_err(|_| ClaimError::MalformedBundle("payload is neither JSON nor base64".to_string()))?;
    let json = String::from_utf8(bytes)
        .map_err(|_| ClaimError::MalformedBundle("payload is not valid UTF-8".to_string()))?;
    ClaimBundle::from_json(&json)
}

pub fn to_share_link(bundle: &ClaimBundle, base_url: &str) -> Result<String, ClaimError> {
    let encoded = URL_SAFE_NO_PAD.encode(bundle.to_json()?);
    Ok(format!("{base_url}?{LINK_PARAM}={encoded}"))
}

pub fn from_share_link(link: &str) -> Result<ClaimBundle, ClaimError> {
    let marker = format!("{LINK_PARAM}=");
    let payload = link
        .split_once(&marker)
        .map(|(_, rest)| rest)
        .ok_or_else(|| {
            ClaimError::MalformedBundle(format!("link has no '{LINK_PARAM}' parameter"))
        })?;
    let payload = payload
        .split(['&', '#'])
        .next()
        .unwrap_or(payload);
    decode_payload(payload)
}

pub fn write_bundle_file(bundle: &ClaimBundle, path: &Path) -> Result<(), ClaimError> {
    std::fs::write(path, bundle.to_json()?).map_err(|e| ClaimError::Storage(e.to_string()))
}

pub fn read_bundle_file(path: &Path) -> Result<ClaimBundle, ClaimError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ClaimError::Storage(e.to_string()))?;
    decode_payload(&raw)
}
