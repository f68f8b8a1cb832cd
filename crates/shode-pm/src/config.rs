//! Package manager configuration (~/.shode/config.toml)

use crate::lockfile::LOCKFILE_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.shode.io";

/// Per-user directory under the home directory
pub const CONFIG_DIR: &str = ".shode";

pub const CONFIG_FILE: &str = "config.toml";

/// Default trust store file inside [`CONFIG_DIR`]
pub const TRUST_STORE_FILE: &str = "trusted_signers.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Package manager settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "kebab-case")]
pub struct PmConfig {
    /// Base URL used for lock file locators
    pub registry_url: String,

    /// Trust store location, `~/.shode/trusted_signers.json` when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store_path: Option<PathBuf>,

    /// Accept artifacts that carry no signature
    pub allow_unsigned: bool,

    pub lockfile_name: String,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            trust_store_path: None,
            allow_unsigned: false,
            lockfile_name: LOCKFILE_NAME.to_string(),
        }
    }
}

impl PmConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `~/.shode/config.toml`, falling back to defaults when absent
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = config_dir()?.join(CONFIG_FILE);
        if path.exists() {
            tracing::debug!(path = %path.display(), "loading config");
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Effective trust store location
    pub fn trust_store_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.trust_store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(TRUST_STORE_FILE)),
        }
    }
}

/// `~/.shode`
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR))
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PmConfig::from_str("").unwrap();
        assert_eq!(config, PmConfig::default());
        assert_eq!(config.lockfile_name, "shode-lock.json");
        assert!(!config.allow_unsigned);
    }

    #[test]
    fn test_parse_config() {
        let config = PmConfig::from_str(
            r#"
registry-url = "https://mirror.example.com"
trust-store-path = "/etc/shode/signers.json"
allow-unsigned = true
"#,
        )
        .unwrap();
        assert_eq!(config.registry_url, "https://mirror.example.com");
        assert!(config.allow_unsigned);
        assert_eq!(
            config.trust_store_path().unwrap(),
            PathBuf::from("/etc/shode/signers.json")
        );
    }

    #[test]
    fn test_reject_unknown_types() {
        assert!(PmConfig::from_str("allow-unsigned = \"yes\"").is_err());
    }
}
