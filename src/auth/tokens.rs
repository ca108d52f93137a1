//! Identity tokens
//!
//! Wire format: `b64(header).b64(payload).b64(signature)` where the signature is
//! HMAC-SHA256 over the first two segments exactly as they appear on the wire,
//! and every segment is base64url without padding.
//!
//! Tokens are stateless. Nothing is stored when one is issued; validity is
//! re-derived from the token's own fields, the revocation registry and the clock.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;

use crate::config::GatekeepConfig;
use crate::subject::SubjectKey;

/// Header `typ` value
pub const TOKEN_TYPE: &str = "IDTOKEN";
/// Header `alg` value
pub const TOKEN_ALGORITHM: &str = "HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// base64url, unpadded on encode, padding optional on decode
const B64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature mismatch")]
    Tampered,

    #[error("token expired")]
    Expired,

    #[error("identity has no remaining validity window")]
    EmptyValidity,

    #[error("rate budget must be a positive number")]
    InvalidRateBudget,

    #[error("token encoding error: {0}")]
    Encoding(String),
}

/// HMAC signing secret
#[derive(Clone, Deserialize)]
#[serde(from = "String")]
pub struct TokenSecret {
    bytes: Vec<u8>,
}

impl TokenSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Generate a random 256-bit secret, returned in its base64url text form
    pub fn generate() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill(&mut bytes);
        B64.encode(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.bytes).expect("HMAC can take key of any size")
    }
}

impl From<String> for TokenSecret {
    fn from(s: String) -> Self {
        Self::new(s.into_bytes())
    }
}

impl fmt::Debug for TokenSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenSecret([REDACTED])")
    }
}

/// Admin key guarding administrative endpoints
#[derive(Clone)]
pub struct AdminKey {
    key: String,
}

impl AdminKey {
    pub fn new(key: String) -> Self {
        Self { key }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        // Constant-time comparison to prevent timing attacks
        if candidate.len() != self.key.len() {
            return false;
        }

        let mut result = 0u8;
        for (a, b) in candidate.bytes().zip(self.key.bytes()) {
            result |= a ^ b;
        }
        result == 0
    }
}

impl fmt::Debug for AdminKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdminKey([REDACTED])")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub typ: String,
    pub alg: String,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            typ: TOKEN_TYPE.to_string(),
            alg: TOKEN_ALGORITHM.to_string(),
        }
    }
}

/// Claims carried by a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub subject_id: String,
    pub tenant_type: String,
    pub role: String,
    /// Allowed requests per second
    pub rate_budget: f64,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Payload {
    pub fn subject(&self) -> SubjectKey {
        SubjectKey::new(self.tenant_type.clone(), self.subject_id.clone())
    }
}

/// A caller identity as supplied by the user store
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject_id: String,
    pub tenant_type: String,
    pub role: String,
    pub rate_budget: f64,
    /// Start of the caller's own access window
    pub valid_from: DateTime<Utc>,
    /// End of the caller's own access window
    pub valid_until: DateTime<Utc>,
}

/// An issued token
#[derive(Debug, Clone)]
pub struct Token {
    wire: String,
    payload: Payload,
}

impl Token {
    pub fn as_str(&self) -> &str {
        &self.wire
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_string(self) -> String {
        self.wire
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire)
    }
}

/// Sign a header and payload into the wire form
pub fn sign(header: &Header, payload: &Payload, secret: &TokenSecret) -> Result<String, TokenError> {
    let header_b64 = encode_segment(header)?;
    let payload_b64 = encode_segment(payload)?;

    let mut mac = secret.mac();
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    let signature_b64 = B64.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}.{}", header_b64, payload_b64, signature_b64))
}

/// Parse a wire token and check its signature. Expiry is not checked here.
pub fn verify(wire: &str, secret: &TokenSecret) -> Result<(Header, Payload), TokenError> {
    let mut parts = wire.split('.');
    let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header: Header = decode_segment(header_b64)?;
    let payload: Payload = decode_segment(payload_b64)?;

    if header.typ != TOKEN_TYPE || header.alg != TOKEN_ALGORITHM {
        return Err(TokenError::Malformed);
    }

    let signature = B64
        .decode(signature_b64)
        .map_err(|_| TokenError::Tampered)?;

    let mut mac = secret.mac();
    mac.update(header_b64.as_bytes());
    mac.update(b".");
    mac.update(payload_b64.as_bytes());
    // verify_slice compares in constant time
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::Tampered)?;

    Ok((header, payload))
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|e| TokenError::Encoding(e.to_string()))?;
    Ok(B64.encode(json))
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let json = B64.decode(segment).map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&json).map_err(|_| TokenError::Malformed)
}

/// Issues and decodes identity tokens with one secret
#[derive(Debug, Clone)]
pub struct TokenCodec {
    secret: TokenSecret,
    max_lifetime: Duration,
}

impl TokenCodec {
    pub fn new(secret: TokenSecret, max_lifetime: Duration) -> Self {
        Self {
            secret,
            max_lifetime,
        }
    }

    pub fn from_config(config: &GatekeepConfig) -> Self {
        Self::new(config.secret.clone(), config.max_token_lifetime())
    }

    pub fn max_lifetime(&self) -> Duration {
        self.max_lifetime
    }

    /// Issue a token for `identity`
    ///
    /// The token starts no earlier than `now` or the identity's own window and
    /// ends no later than the identity's window or `now + max_lifetime`.
    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<Token, TokenError> {
        if !(identity.rate_budget.is_finite() && identity.rate_budget > 0.0) {
            return Err(TokenError::InvalidRateBudget);
        }

        let expires_at = match now.checked_add_signed(self.max_lifetime) {
            Some(cap) => cap.min(identity.valid_until),
            None => identity.valid_until,
        };
        let issued_at = identity.valid_from.max(now);

        if expires_at <= issued_at {
            return Err(TokenError::EmptyValidity);
        }

        let payload = Payload {
            subject_id: identity.subject_id.clone(),
            tenant_type: identity.tenant_type.clone(),
            role: identity.role.clone(),
            rate_budget: identity.rate_budget,
            issued_at,
            expires_at,
        };
        let wire = sign(&Header::default(), &payload, &self.secret)?;

        Ok(Token { wire, payload })
    }

    /// Decode and validate a wire token at `now`
    pub fn decode(&self, wire: &str, now: DateTime<Utc>) -> Result<Payload, TokenError> {
        let (_, payload) = verify(wire, &self.secret)?;

        if now >= payload.expires_at {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }
}
