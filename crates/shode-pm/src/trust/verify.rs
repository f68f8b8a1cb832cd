//! Artifact verification
//!
//! The check a registry runs before accepting a published archive. Steps
//! run in order and the first failure is the one reported:
//!
//! 1. recompute the content digest and compare it to the claimed checksum
//! 2. without a signature or signer id, accept only if unsigned artifacts
//!    are allowed
//! 3. look up the signer's public key in the trust store
//! 4. verify the signature with the named algorithm

use super::signature::{checksum, verify_signature, SignatureAlgorithm, SignatureError};
use super::store::{TrustError, TrustStore};
use crate::config::PmConfig;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Signature and signer id are required")]
    MissingSignature,

    #[error("Signer not trusted: {0}")]
    UntrustedSigner(String),

    #[error("Unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid signature from {signer}: {reason}")]
    InvalidSignature { signer: String, reason: SignatureError },
}

/// What the publisher claims about an archive
#[derive(Debug, Clone, Copy)]
pub struct ArtifactClaim<'a> {
    pub bytes: &'a [u8],

    /// Hex SHA-256 of `bytes`
    pub checksum: &'a str,

    /// Base64 detached signature
    pub signature: Option<&'a str>,

    /// Algorithm tag, empty for the default
    pub algorithm: &'a str,

    pub signer_id: Option<&'a str>,
}

impl<'a> ArtifactClaim<'a> {
    /// Claim for an unsigned archive
    pub fn unsigned(bytes: &'a [u8], checksum: &'a str) -> Self {
        Self {
            bytes,
            checksum,
            signature: None,
            algorithm: "",
            signer_id: None,
        }
    }

    pub fn with_signature(mut self, signer_id: &'a str, signature: &'a str) -> Self {
        self.signer_id = Some(signer_id);
        self.signature = Some(signature);
        self
    }

    pub fn with_algorithm(mut self, algorithm: &'a str) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// An accepted archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    /// Hex SHA-256 of the content
    pub checksum: String,

    pub signer_id: Option<String>,

    /// False only when an unsigned archive was let through
    pub verified: bool,
}

/// Run the four verification steps against a trust store
pub fn verify_artifact(
    store: &TrustStore,
    claim: &ArtifactClaim<'_>,
    allow_unsigned: bool,
) -> Result<VerifiedArtifact, VerifyError> {
    let actual = checksum(claim.bytes);
    if !actual.eq_ignore_ascii_case(claim.checksum.trim()) {
        tracing::warn!(expected = claim.checksum, actual = %actual, "artifact checksum mismatch");
        return Err(VerifyError::ChecksumMismatch {
            expected: claim.checksum.to_string(),
            actual,
        });
    }

    let signature = claim.signature.filter(|s| !s.trim().is_empty());
    let signer_id = claim.signer_id.filter(|s| !s.trim().is_empty());
    let (Some(signature), Some(signer_id)) = (signature, signer_id) else {
        if allow_unsigned {
            tracing::debug!(checksum = %actual, "accepting unsigned artifact");
            return Ok(VerifiedArtifact {
                checksum: actual,
                signer_id: None,
                verified: false,
            });
        }
        tracing::warn!("rejecting unsigned artifact");
        return Err(VerifyError::MissingSignature);
    };

    let Some(public_key) = store.get_public_key(signer_id) else {
        tracing::warn!(signer = signer_id, "artifact signed by untrusted signer");
        return Err(VerifyError::UntrustedSigner(signer_id.to_string()));
    };

    let algorithm = SignatureAlgorithm::from_tag(claim.algorithm)
        .map_err(|_| VerifyError::UnsupportedAlgorithm(claim.algorithm.to_string()))?;

    verify_signature(claim.bytes, signature, algorithm, &public_key).map_err(|reason| {
        tracing::warn!(signer = signer_id, %reason, "artifact signature rejected");
        VerifyError::InvalidSignature {
            signer: signer_id.to_string(),
            reason,
        }
    })?;

    tracing::debug!(signer = signer_id, checksum = %actual, "artifact verified");
    Ok(VerifiedArtifact {
        checksum: actual,
        signer_id: Some(signer_id.to_string()),
        verified: true,
    })
}

/// A trust store bundled with the unsigned-artifact policy
#[derive(Debug, Clone)]
pub struct ArtifactVerifier {
    store: Arc<TrustStore>,
    allow_unsigned: bool,
}

impl ArtifactVerifier {
    pub fn new(store: Arc<TrustStore>, allow_unsigned: bool) -> Self {
        Self {
            store,
            allow_unsigned,
        }
    }

    /// Open the configured trust store
    pub fn from_config(config: &PmConfig) -> Result<Self, TrustError> {
        let store = TrustStore::load_or_create(config.trust_store_path()?)?;
        Ok(Self::new(Arc::new(store), config.allow_unsigned))
    }

    pub fn verify(&self, claim: &ArtifactClaim<'_>) -> Result<VerifiedArtifact, VerifyError> {
        verify_artifact(&self.store, claim, self.allow_unsigned)
    }

    pub fn store(&self) -> &Arc<TrustStore> {
        &self.store
    }

    pub fn allows_unsigned(&self) -> bool {
        self.allow_unsigned
    }
}
