use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use time::OffsetDateTime;

use crate::domain::events::{SIGNATURE_HEADER, TIMESTAMP_HEADER};

type HmacSha256 = Hmac<Sha256>;

/// Default replay window, in seconds
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 300;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Why an inbound request failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("Signature header is missing")]
    MissingSignature,

    #[error("Timestamp header is missing")]
    MissingTimestamp,

    #[error("Timestamp header is not a Unix timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Timestamp outside freshness window: {skew} seconds (max: {window})")]
    StaleTimestamp { skew: u64, window: u64 },

    #[error("Invalid signature")]
    BadSignature,
}

impl VerificationError {
    /// Machine-readable reason returned to the caller
    pub fn reason(&self) -> &'static str {
        match self {
            VerificationError::MissingSignature => "missing_signature",
            VerificationError::MissingTimestamp => "missing_timestamp",
            VerificationError::InvalidTimestamp(_) => "invalid_timestamp",
            VerificationError::StaleTimestamp { .. } => "stale_timestamp",
            VerificationError::BadSignature => "bad_signature",
        }
    }
}

/// HMAC-SHA256 signer for webhook authentication.
///
/// The signed message is the decimal timestamp immediately followed by the
/// exact body bytes that go on the wire.
#[derive(Clone)]
pub struct HmacSigner {
    secret: String,
}

impl HmacSigner {
    /// New HMAC signer with the given secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Sign a body, returning the `sha256=<hex>` header value
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        let mac = self.mac(timestamp, body);
        format_signature_header(&hex::encode(mac.finalize().into_bytes()))
    }

    /// Verify a signature header against a body.
    ///
    /// Freshness is checked before the MAC so a replayed request is rejected
    /// as stale even when its signature is valid.
    pub fn verify(
        &self,
        timestamp: i64,
        body: &[u8],
        signature_header: &str,
        now: i64,
        window_secs: u64,
    ) -> Result<(), VerificationError> {
        let skew = now.abs_diff(timestamp);
        if skew > window_secs {
            return Err(VerificationError::StaleTimestamp {
                skew,
                window: window_secs,
            });
        }

        let provided = parse_signature_header(signature_header)
            .and_then(|sig| hex::decode(sig).ok())
            .ok_or(VerificationError::BadSignature)?;

        self.mac(timestamp, body)
            .verify_slice(&provided)
            .map_err(|_| VerificationError::BadSignature)
    }

    fn mac(&self, timestamp: i64, body: &[u8]) -> HmacSha256 {
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(body);
        mac
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

/// Verifier used by the inbound gateway: one shared secret plus a replay window
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    signer: HmacSigner,
    window_secs: u64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, window_secs: u64) -> Self {
        Self {
            signer: HmacSigner::new(secret),
            window_secs,
        }
    }

    /// Verify signature and timestamp headers against the raw request body
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), VerificationError> {
        self.verify_headers_at(headers, body, OffsetDateTime::now_utc().unix_timestamp())
    }

    pub fn verify_headers_at(
        &self,
        headers: &HeaderMap,
        body: &[u8],
        now: i64,
    ) -> Result<(), VerificationError> {
        let signature = header_str(headers, SIGNATURE_HEADER)
            .ok_or(VerificationError::MissingSignature)?;
        let raw_timestamp = header_str(headers, TIMESTAMP_HEADER)
            .ok_or(VerificationError::MissingTimestamp)?;
        let timestamp = raw_timestamp
            .trim()
            .parse::<i64>()
            .map_err(|_| VerificationError::InvalidTimestamp(raw_timestamp.to_string()))?;

        self.signer
            .verify(timestamp, body, signature, now, self.window_secs)
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// Generate a random 32-byte hex secret
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Helper function to format signature for HTTP header
pub fn format_signature_header(signature: &str) -> String {
    format!("{SIGNATURE_PREFIX}{signature}")
}

/// Helper function to parse signature from HTTP header
pub fn parse_signature_header(header: &str) -> Option<&str> {
    header.trim().strip_prefix(SIGNATURE_PREFIX)
}
