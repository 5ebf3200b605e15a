//! # Webhook Signature Verification
//!
//! HMAC-SHA256 signature checks for ticketing provider webhooks, compared in
//! constant time.
//!
//! - Eventbrite style: `X-Eventbrite-Signature: <hex>` over the raw body.
//! - Ticket Tailor style: `Tailor-Signature: t=<unix>,v1=<hex>` over `"{t}.{body}"`,
//!   with a timestamp tolerance window.

use axum::http::StatusCode;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

pub const EVENTBRITE_SIGNATURE_HEADER: &str = "x-eventbrite-signature";
pub const TICKET_TAILOR_SIGNATURE_HEADER: &str = "tailor-signature";

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("Missing required signature header: {header}")]
    MissingSignature { header: String },

    #[error("Invalid signature format: {header}")]
    InvalidSignatureFormat { header: String },

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid timestamp format: {header}")]
    InvalidTimestamp { header: String },

    #[error("Timestamp too old: {seconds}s old, max allowed: {max_seconds}s")]
    TimestampTooOld { seconds: u64, max_seconds: u64 },

    #[error("Timestamp too far in future: {seconds}s in future, max allowed: {max_seconds}s")]
    TimestampTooFuture { seconds: u64, max_seconds: u64 },
}

impl VerificationError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

pub type VerificationResult<T> = Result<T, VerificationError>;

/// Hex-encoded HMAC-SHA256 of `data` under `secret`.
pub fn hmac_sha256_hex(secret: &str, data: &[u8]) -> String {
    hex::encode(hmac_sha256(secret, data))
}

fn hmac_sha256(secret: &str, data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return Vec::new(),
    };
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_matches(expected: &[u8], provided_hex: &str, header: &str) -> VerificationResult<()> {
    let provided =
        hex::decode(provided_hex.trim()).map_err(|_| VerificationError::InvalidSignatureFormat {
            header: format!("{} contains invalid hex", header),
        })?;

    if !expected.is_empty() && bool::from(subtle::ConstantTimeEq::ct_eq(expected, &provided[..])) {
        Ok(())
    } else {
        Err(VerificationError::VerificationFailed)
    }
}

/// Verifies an Eventbrite-style body signature.
pub fn verify_eventbrite_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
) -> VerificationResult<()> {
    debug!(body_size = body.len(), "Verifying Eventbrite webhook signature");

    if signature_header.trim().is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "X-Eventbrite-Signature".to_string(),
        });
    }

    let provided_hex = signature_header
        .trim()
        .strip_prefix("sha256=")
        .unwrap_or(signature_header.trim());

    constant_time_matches(
        &hmac_sha256(secret, body),
        provided_hex,
        "X-Eventbrite-Signature",
    )
}

/// Verifies a Ticket Tailor-style timestamped signature relative to `now_unix`.
pub fn verify_ticket_tailor_signature(
    body: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_seconds: u64,
    now_unix: i64,
) -> VerificationResult<()> {
    debug!(
        body_size = body.len(),
        tolerance_seconds, "Verifying Ticket Tailor webhook signature"
    );

    if signature_header.trim().is_empty() {
        return Err(VerificationError::MissingSignature {
            header: "Tailor-Signature".to_string(),
        });
    }

    let mut timestamp = None;
    let mut signature = None;
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value.trim()),
            Some(("v1", value)) => signature = Some(value.trim()),
            _ => {}
        }
    }

    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return Err(VerificationError::InvalidSignatureFormat {
            header: "Tailor-Signature must be 't=<unix>,v1=<hex>'".to_string(),
        });
    };

    let ts = timestamp
        .parse::<i64>()
        .map_err(|_| VerificationError::InvalidTimestamp {
            header: "Tailor-Signature timestamp must be a Unix timestamp".to_string(),
        })?;

    let diff = now_unix.abs_diff(ts);
    if diff > tolerance_seconds {
        return Err(if now_unix > ts {
            VerificationError::TimestampTooOld {
                seconds: diff,
                max_seconds: tolerance_seconds,
            }
        } else {
            VerificationError::TimestampTooFuture {
                seconds: diff,
                max_seconds: tolerance_seconds,
            }
        });
    }

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed.extend_from_slice(timestamp.as_bytes());
    signed.push(b'.');
    signed.extend_from_slice(body);

    constant_time_matches(&hmac_sha256(secret, &signed), signature, "Tailor-Signature")
}
