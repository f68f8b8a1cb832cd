//! Trusted signer store (trusted_signers.json)

use super::signature::decode_public_key;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error("Failed to access trust store: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse trust store: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Signer id cannot be empty")]
    EmptySignerId,

    #[error("Invalid public key for signer {id}: {reason}")]
    InvalidPublicKey { id: String, reason: String },

    #[error("Unknown signer: {0}")]
    UnknownSigner(String),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

/// A signer whose signatures are accepted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrustedSigner {
    pub id: String,

    /// Base64 Ed25519 public key
    pub public_key: String,

    #[serde(default)]
    pub description: String,

    pub added_at: DateTime<Utc>,
}

/// Durable set of trusted signers
///
/// Reads and writes go through one reader/writer lock, and every mutation
/// rewrites the whole file while the write lock is held. Separate
/// processes sharing the same file are not coordinated.
#[derive(Debug)]
pub struct TrustStore {
    path: PathBuf,
    signers: RwLock<BTreeMap<String, TrustedSigner>>,
}

impl TrustStore {
    /// Open the store at `path`, starting empty if the file is absent
    pub fn load_or_create(path: impl Into<PathBuf>) -> Result<Self, TrustError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let signers = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), signers = signers.len(), "opened trust store");
        Ok(Self {
            path,
            signers: RwLock::new(signers),
        })
    }

    /// Trust a signer, replacing any existing entry with the same id
    pub fn add_signer(
        &self,
        id: &str,
        public_key_b64: &str,
        description: &str,
    ) -> Result<(), TrustError> {
        if id.trim().is_empty() {
            return Err(TrustError::EmptySignerId);
        }
        decode_public_key(public_key_b64).map_err(|e| TrustError::InvalidPublicKey {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let signer = TrustedSigner {
            id: id.to_string(),
            public_key: public_key_b64.trim().to_string(),
            description: description.to_string(),
            added_at: Utc::now(),
        };

        let mut signers = self.signers.write();
        let previous = signers.insert(id.to_string(), signer);
        if let Err(e) = self.persist(&signers) {
            match previous {
                Some(previous) => signers.insert(id.to_string(), previous),
                None => signers.remove(id),
            };
            return Err(e);
        }

        tracing::info!(signer = id, "trusted signer added");
        Ok(())
    }

    /// Stop trusting a signer
    pub fn remove_signer(&self, id: &str) -> Result<TrustedSigner, TrustError> {
        let mut signers = self.signers.write();
        let removed = signers
            .remove(id)
            .ok_or_else(|| TrustError::UnknownSigner(id.to_string()))?;

        if let Err(e) = self.persist(&signers) {
            signers.insert(id.to_string(), removed);
            return Err(e);
        }

        tracing::info!(signer = id, "trusted signer removed");
        Ok(removed)
    }

    /// Base64 public key of a trusted signer
    pub fn get_public_key(&self, id: &str) -> Option<String> {
        self.signers.read().get(id).map(|s| s.public_key.clone())
    }

    pub fn get(&self, id: &str) -> Option<TrustedSigner> {
        self.signers.read().get(id).cloned()
    }

    /// All trusted signers, ordered by id
    pub fn list_signers(&self) -> Vec<TrustedSigner> {
        self.signers.read().values().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.signers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.signers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, signers: &BTreeMap<String, TrustedSigner>) -> Result<(), TrustError> {
        let content = serde_json::to_string_pretty(signers)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}
