//! Slack request signing (`v0` scheme).
//!
//! `X-Slack-Signature = "v0=" + hex(HMAC-SHA256(signing_secret, "v0:{timestamp}:{raw_body}"))`
//! <https://api.slack.com/authentication/verifying-requests-from-slack>

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
const VERSION_PREFIX: &str = "v0=";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing `{0}` header")]
    MissingHeader(&'static str),
    #[error("request timestamp `{0}` is not a unix timestamp")]
    InvalidTimestamp(String),
    #[error("request timestamp is {age_secs}s away from server time")]
    Stale { age_secs: u64 },
    #[error("signature is not a `v0=` hex digest")]
    Malformed,
    #[error("signature mismatch")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    signing_secret: SecretString,
    max_age_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("signing_secret", &"[REDACTED]")
            .field("max_age_secs", &self.max_age_secs)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(signing_secret: SecretString, max_age_secs: u64) -> Self {
        Self { signing_secret, max_age_secs }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(timestamp, signature, body, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
        let signature = signature.ok_or(SignatureError::MissingHeader(SIGNATURE_HEADER))?;

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::InvalidTimestamp(timestamp.to_owned()))?;
        let age_secs = now.abs_diff(sent_at);
        if age_secs > self.max_age_secs {
            return Err(SignatureError::Stale { age_secs });
        }

        let digest = signature
            .strip_prefix(VERSION_PREFIX)
            .and_then(|hex_digest| hex::decode(hex_digest).ok())
            .ok_or(SignatureError::Malformed)?;

        self.mac(timestamp, body).verify_slice(&digest).map_err(|_| SignatureError::Mismatch)
    }

    /// Produces the header value Slack would send for `body` at `timestamp`.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let digest = self.mac(timestamp, body).finalize().into_bytes();
        format!("{VERSION_PREFIX}{}", hex::encode(digest))
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length, so construction cannot fail.
        let mut mac = match HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
        {
            Ok(mac) => mac,
            Err(error) => unreachable!("hmac key of any length is valid: {error}"),
        };
        mac.update(b"v0:");
        mac.update(timestamp.as_bytes());
        mac.update(b":");
        mac.update(body);
        mac
    }
}
