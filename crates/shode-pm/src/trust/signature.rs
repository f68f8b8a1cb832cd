//! Detached signatures and content digests

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidEncoding(String),

    #[error("Signature does not match content")]
    Mismatch,
}

/// Signature algorithm named by an artifact's algorithm tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureAlgorithm {
    #[default]
    Ed25519,
}

impl SignatureAlgorithm {
    /// Parse an algorithm tag; the empty tag means Ed25519
    pub fn from_tag(tag: &str) -> Result<Self, SignatureError> {
        match tag.trim() {
            "" | "ed25519" => Ok(SignatureAlgorithm::Ed25519),
            other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignatureAlgorithm::Ed25519 => "ed25519",
        }
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_tag(s)
    }
}

/// Hex SHA-256 of the content
pub fn checksum(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Decode a base64 Ed25519 public key
pub fn decode_public_key(public_key_b64: &str) -> Result<VerifyingKey, SignatureError> {
    let bytes = STANDARD
        .decode(public_key_b64.trim())
        .map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))?;
    let bytes: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
        SignatureError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
    })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SignatureError::InvalidPublicKey(e.to_string()))
}

/// Base64 form of a public key, as stored in the trust store
pub fn encode_public_key(key: &VerifyingKey) -> String {
    STANDARD.encode(key.as_bytes())
}

/// Verify a detached base64 signature over `data`
pub fn verify_signature(
    data: &[u8],
    signature_b64: &str,
    algorithm: SignatureAlgorithm,
    public_key_b64: &str,
) -> Result<(), SignatureError> {
    match algorithm {
        SignatureAlgorithm::Ed25519 => {
            let key = decode_public_key(public_key_b64)?;
            let bytes = STANDARD
                .decode(signature_b64.trim())
                .map_err(|e| SignatureError::InvalidEncoding(e.to_string()))?;
            let signature = Signature::from_slice(&bytes).map_err(|_| {
                SignatureError::InvalidEncoding(format!("expected 64 bytes, got {}", bytes.len()))
            })?;
            key.verify(data, &signature)
                .map_err(|_| SignatureError::Mismatch)
        }
    }
}

/// Produce a detached base64 Ed25519 signature over `data`
pub fn sign_detached(key: &SigningKey, data: &[u8]) -> String {
    STANDARD.encode(key.sign(data).to_bytes())
}
