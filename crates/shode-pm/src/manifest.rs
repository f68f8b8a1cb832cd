//! Package manifest parsing (shode.json)
//!
//! The declared-dependencies document of a project: its identity, runtime
//! and development dependency ranges, and named scripts.

use crate::semver::{Range, Version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Manifest file name
pub const MANIFEST_FILE: &str = "shode.json";

/// Errors that can occur during manifest handling
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Failed to read or write the manifest file
    #[error("Failed to read manifest file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON
    #[error("Failed to parse manifest: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Validation error
    #[error("Invalid manifest: {0}")]
    ValidationError(String),

    /// Dependency is not declared
    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),

    /// Script is not declared
    #[error("Script not found: {0}")]
    ScriptNotFound(String),
}

/// Package manifest (shode.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Package name (must be unique)
    pub name: String,

    /// Semver version
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Runtime dependencies (name → range expression)
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Development-only dependencies
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dev_dependencies: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,
}

impl Manifest {
    /// Create a manifest with no dependencies
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Parse a manifest from a file
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a manifest from a string
    pub fn from_str(content: &str) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Write manifest to a file
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;
        tracing::debug!(path = %path.display(), "wrote manifest");
        Ok(())
    }

    /// Validate the manifest
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.is_empty() {
            return Err(ManifestError::ValidationError(
                "Package name cannot be empty".to_string(),
            ));
        }

        if !is_valid_package_name(&self.name) {
            return Err(ManifestError::ValidationError(format!(
                "Invalid package name: {}. Must contain only alphanumeric characters, hyphens, underscores, dots, and optional @org/ prefix",
                self.name
            )));
        }

        Version::parse(&self.version).map_err(|e| {
            ManifestError::ValidationError(format!("Invalid version {}: {}", self.version, e))
        })?;

        for (name, range) in self.dependencies.iter().chain(&self.dev_dependencies) {
            validate_dependency(name, range)?;
        }

        Ok(())
    }

    /// Declare a dependency, replacing any previous range for it
    pub fn add_dependency(
        &mut self,
        name: &str,
        range: &str,
        dev: bool,
    ) -> Result<(), ManifestError> {
        validate_dependency(name, range)?;
        let target = if dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        };
        target.insert(name.to_string(), range.to_string());
        Ok(())
    }

    /// Remove a dependency, returning its range
    pub fn remove_dependency(&mut self, name: &str, dev: bool) -> Result<String, ManifestError> {
        let target = if dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        };
        target
            .remove(name)
            .ok_or_else(|| ManifestError::DependencyNotFound(name.to_string()))
    }

    pub fn add_script(&mut self, name: &str, command: &str) {
        self.scripts.insert(name.to_string(), command.to_string());
    }

    pub fn remove_script(&mut self, name: &str) -> Result<String, ManifestError> {
        self.scripts
            .remove(name)
            .ok_or_else(|| ManifestError::ScriptNotFound(name.to_string()))
    }

    /// Get all dependencies, runtime first then dev
    ///
    /// A name declared in both sections appears twice.
    pub fn all_dependencies(&self) -> Vec<(String, String)> {
        self.dependencies
            .iter()
            .chain(&self.dev_dependencies)
            .map(|(n, r)| (n.clone(), r.clone()))
            .collect()
    }
}

/// Validate a package name
fn is_valid_package_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    // Scoped packages (@org/package)
    if let Some(scoped) = name.strip_prefix('@') {
        return match scoped.split_once('/') {
            Some((org, pkg)) => is_valid_name_part(org) && is_valid_name_part(pkg),
            None => false,
        };
    }

    is_valid_name_part(name)
}

fn is_valid_name_part(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

fn validate_dependency(name: &str, range: &str) -> Result<(), ManifestError> {
    if !is_valid_package_name(name) {
        return Err(ManifestError::ValidationError(format!(
            "Invalid dependency name: '{}'",
            name
        )));
    }

    Range::parse(range).map_err(|e| {
        ManifestError::ValidationError(format!("Dependency '{}': {}", name, e))
    })?;

    Ok(())
}
