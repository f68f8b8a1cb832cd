//! Lockfile management (shode-lock.json)
//!
//! A lock file is a reproducible snapshot of one resolution: every reached
//! package with its exact version, content digest and download locator,
//! plus the runtime/dev split of the project's dependencies.

use crate::graph::DependencyNode;
use crate::semver::{Range, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lockfile format version
pub const LOCKFILE_VERSION: u32 = 1;

/// Default lock file name, written next to the manifest
pub const LOCKFILE_NAME: &str = "shode-lock.json";

/// Shortest integrity string accepted by [`LockFile::verify`]
pub const MIN_INTEGRITY_LEN: usize = 10;

/// Errors that can occur during lockfile operations
#[derive(Debug, Error)]
pub enum LockfileError {
    /// No lock file at the given path
    #[error("Lockfile not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Failed to read or write lockfile
    #[error("Failed to read lockfile: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse or serialize JSON
    #[error("Failed to parse lockfile: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Schema version other than [`LOCKFILE_VERSION`]
    #[error("Unsupported lockfile version: {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    /// Locked versions do not satisfy the declared constraints
    #[error("Lockfile does not satisfy declared dependencies: {}", format_issues(.0))]
    Validation(Vec<ValidationIssue>),

    /// Structurally broken entry
    #[error("Invalid lockfile entry for {package}: {reason}")]
    InvalidEntry { package: String, reason: String },

    /// Package is not in the lock file
    #[error("Package not found in lockfile: {0}")]
    PackageNotFound(String),
}

/// One offending package found by [`LockFile::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub package: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Declared but not locked
    Missing,

    /// Locked version does not parse
    InvalidVersion { version: String },

    /// Declared constraint does not parse
    InvalidConstraint { constraint: String },

    /// Locked version falls outside the declared range
    Unsatisfied { version: String, constraint: String },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{} is not locked", self.package),
            IssueKind::InvalidVersion { version } => {
                write!(f, "{} has unparseable locked version {}", self.package, version)
            }
            IssueKind::InvalidConstraint { constraint } => {
                write!(f, "{} has unparseable constraint {}", self.package, constraint)
            }
            IssueKind::Unsatisfied {
                version,
                constraint,
            } => write!(
                f,
                "{}@{} does not satisfy {}",
                self.package, version, constraint
            ),
        }
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Lockfile (shode-lock.json)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockFile {
    /// Lockfile format version
    pub lockfile_version: u32,

    pub generated_at: DateTime<Utc>,

    /// Every reached package, once per name
    #[serde(default)]
    pub resolved: BTreeMap<String, LockEntry>,

    /// Packages reached from runtime dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, DepEntry>,

    /// Packages reached only from development dependencies
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, DepEntry>,
}

/// A locked package
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LockEntry {
    /// Exact version
    pub version: String,

    /// `sha256-<hex>` digest, empty when the content was never verified
    #[serde(default)]
    pub integrity: String,

    /// Download locator
    #[serde(default)]
    pub resolved: String,

    /// Direct dependencies (name → exact version)
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DepEntry {
    pub version: String,

    /// Direct dependencies as `name@version`
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaHeader {
    #[serde(default)]
    lockfile_version: u32,
}

impl Default for LockFile {
    fn default() -> Self {
        Self::new()
    }
}

impl LockFile {
    /// Create a new empty lockfile
    pub fn new() -> Self {
        Self {
            lockfile_version: LOCKFILE_VERSION,
            generated_at: Utc::now(),
            resolved: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
        }
    }

    /// Flatten resolved dependency trees into a lock file
    ///
    /// Each package is recorded once; a package reached from both runtime
    /// and dev roots is listed under whichever was visited first, runtime
    /// roots going first.
    pub fn generate(
        runtime: &[DependencyNode],
        dev: &[DependencyNode],
        registry_url: &str,
    ) -> Self {
        let mut lockfile = Self::new();
        for node in runtime {
            lockfile.flatten(node, false, registry_url);
        }
        for node in dev {
            lockfile.flatten(node, true, registry_url);
        }
        lockfile
    }

    fn flatten(&mut self, node: &DependencyNode, dev: bool, registry_url: &str) {
        if self.resolved.contains_key(&node.name) {
            return;
        }

        let version = node.version.to_string();
        let children: BTreeMap<String, String> = node
            .dependencies
            .iter()
            .map(|child| (child.name.clone(), child.version.to_string()))
            .collect();
        let requires = children
            .iter()
            .map(|(name, version)| format!("{}@{}", name, version))
            .collect();

        self.resolved.insert(
            node.name.clone(),
            LockEntry {
                version: version.clone(),
                integrity: node
                    .integrity
                    .as_ref()
                    .map(|digest| format!("sha256-{}", digest))
                    .unwrap_or_default(),
                resolved: tarball_url(registry_url, &node.name, &version),
                dependencies: children,
            },
        );

        for child in &node.dependencies {
            self.flatten(child, dev, registry_url);
        }

        let target = if dev {
            &mut self.dev_dependencies
        } else {
            &mut self.dependencies
        };
        target.insert(node.name.clone(), DepEntry { version, requires });
    }

    /// Load a lockfile from disk
    pub fn load(path: &Path) -> Result<Self, LockfileError> {
        if !path.exists() {
            return Err(LockfileError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a lockfile from a string
    pub fn from_str(content: &str) -> Result<Self, LockfileError> {
        // Check the schema first so a future layout is reported as such
        let header: SchemaHeader = serde_json::from_str(content)?;
        if header.lockfile_version != LOCKFILE_VERSION {
            return Err(LockfileError::UnsupportedSchema {
                found: header.lockfile_version,
                expected: LOCKFILE_VERSION,
            });
        }

        Ok(serde_json::from_str(content)?)
    }

    /// Write the lockfile, replacing any previous file
    ///
    /// Not crash-atomic: an interrupted write can leave a truncated file.
    pub fn save(&self, path: &Path) -> Result<(), LockfileError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), packages = self.resolved.len(), "saved lockfile");
        Ok(())
    }

    /// Check locked versions against declared constraints
    ///
    /// Every offending package is reported, not just the first.
    pub fn validate(&self, declared: &BTreeMap<String, String>) -> Result<(), LockfileError> {
        let mut issues = Vec::new();

        for (name, constraint) in declared {
            let issue = |kind| ValidationIssue {
                package: name.clone(),
                kind,
            };

            let Some(entry) = self.resolved.get(name) else {
                issues.push(issue(IssueKind::Missing));
                continue;
            };

            let Ok(range) = Range::parse(constraint) else {
                issues.push(issue(IssueKind::InvalidConstraint {
                    constraint: constraint.clone(),
                }));
                continue;
            };

            match Version::parse(&entry.version) {
                Ok(version) if range.matches(&version) => {}
                Ok(_) => issues.push(issue(IssueKind::Unsatisfied {
                    version: entry.version.clone(),
                    constraint: constraint.clone(),
                })),
                Err(_) => issues.push(issue(IssueKind::InvalidVersion {
                    version: entry.version.clone(),
                })),
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(LockfileError::Validation(issues))
        }
    }

    /// Change the locked version of one package
    pub fn update(&mut self, name: &str, new_version: &str) -> Result<(), LockfileError> {
        let version = Version::parse(new_version).map_err(|e| LockfileError::InvalidEntry {
            package: name.to_string(),
            reason: e.to_string(),
        })?;

        let entry = self
            .resolved
            .get_mut(name)
            .ok_or_else(|| LockfileError::PackageNotFound(name.to_string()))?;
        let version = version.to_string();
        entry.version = version.clone();

        for deps in [&mut self.dependencies, &mut self.dev_dependencies] {
            if let Some(dep) = deps.get_mut(name) {
                dep.version = version.clone();
            }
        }

        self.generated_at = Utc::now();
        tracing::debug!(package = name, version = %version, "updated lockfile entry");
        Ok(())
    }

    /// Structural sanity check
    ///
    /// Versions must parse, integrity strings must be empty or plausibly
    /// long, and everything an entry depends on must itself be resolved.
    /// Content is not re-hashed.
    pub fn verify(&self) -> Result<(), LockfileError> {
        for (name, entry) in &self.resolved {
            Version::parse(&entry.version).map_err(|e| LockfileError::InvalidEntry {
                package: name.clone(),
                reason: e.to_string(),
            })?;

            if !entry.integrity.is_empty() && entry.integrity.len() < MIN_INTEGRITY_LEN {
                return Err(LockfileError::InvalidEntry {
                    package: name.clone(),
                    reason: format!("integrity '{}' is too short", entry.integrity),
                });
            }

            for child in entry.dependencies.keys() {
                self.require_resolved(name, child)?;
            }
        }

        for (name, dep) in self.dependencies.iter().chain(&self.dev_dependencies) {
            self.require_resolved(name, name)?;
            for requirement in &dep.requires {
                let child = requirement
                    .rsplit_once('@')
                    .map(|(child, _)| child)
                    .filter(|child| !child.is_empty())
                    .ok_or_else(|| LockfileError::InvalidEntry {
                        package: name.clone(),
                        reason: format!("malformed requirement '{}'", requirement),
                    })?;
                self.require_resolved(name, child)?;
            }
        }

        Ok(())
    }

    fn require_resolved(&self, package: &str, name: &str) -> Result<(), LockfileError> {
        if self.resolved.contains_key(name) {
            Ok(())
        } else {
            Err(LockfileError::InvalidEntry {
                package: package.to_string(),
                reason: format!("{} is not resolved", name),
            })
        }
    }

    /// Look up a locked package
    pub fn get(&self, name: &str) -> Option<&LockEntry> {
        self.resolved.get(name)
    }

    /// Lock file location for a manifest
    pub fn path_for(manifest_path: &Path, lockfile_name: &str) -> PathBuf {
        manifest_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(lockfile_name)
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }
}

/// `<registry>/<name>/-/<basename>-<version>.tgz`
fn tarball_url(registry_url: &str, name: &str, version: &str) -> String {
    let basename = name.rsplit('/').next().unwrap_or(name);
    format!(
        "{}/{}/-/{}-{}.tgz",
        registry_url.trim_end_matches('/'),
        name,
        basename,
        version
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, version: &str, deps: Vec<DependencyNode>) -> DependencyNode {
        DependencyNode {
            name: name.to_string(),
            version: Version::parse(version).unwrap(),
            constraint: format!("^{}", version),
            integrity: None,
            dependencies: deps,
        }
    }

    #[test]
    fn test_generate_flattens_once() {
        let shared = node("json", "1.3.0", vec![]);
        let runtime = vec![
            node("http", "2.1.0", vec![shared.clone()]),
            node("cli", "0.4.0", vec![shared]),
        ];
        let dev = vec![node("test-kit", "1.0.0", vec![])];

        let lockfile = LockFile::generate(&runtime, &dev, "https://registry.shode.io/");

        assert_eq!(lockfile.resolved.len(), 4);
        let http = &lockfile.resolved["http"];
        assert_eq!(http.dependencies["json"], "1.3.0");
        assert_eq!(
            http.resolved,
            "https://registry.shode.io/http/-/http-2.1.0.tgz"
        );
        assert_eq!(lockfile.dependencies["http"].requires, vec!["json@1.3.0"]);
        assert!(lockfile.dependencies.contains_key("json"));
        assert!(lockfile.dev_dependencies.contains_key("test-kit"));
        assert!(lockfile.verify().is_ok());
    }

    #[test]
    fn test_scoped_tarball_url() {
        assert_eq!(
            tarball_url("https://r.io", "@org/util", "1.0.0"),
            "https://r.io/@org/util/-/util-1.0.0.tgz"
        );
    }

    #[test]
    fn test_integrity_prefix() {
        let mut verified = node("http", "2.1.0", vec![]);
        verified.integrity = Some("ab".repeat(32));
        let lockfile = LockFile::generate(&[verified], &[], "https://r.io");
        assert_eq!(
            lockfile.resolved["http"].integrity,
            format!("sha256-{}", "ab".repeat(32))
        );
    }

    #[test]
    fn test_reject_future_schema() {
        let json = r#"{ "lockfileVersion": 2, "generatedAt": "2024-01-01T00:00:00Z" }"#;
        assert!(matches!(
            LockFile::from_str(json),
            Err(LockfileError::UnsupportedSchema {
                found: 2,
                expected: 1
            })
        ));
    }

    #[test]
    fn test_validate_enumerates_all() {
        let lockfile = LockFile::generate(&[node("a", "1.0.0", vec![])], &[], "https://r.io");
        let declared: BTreeMap<String, String> = [("a", "^2.0.0"), ("b", "*")]
            .iter()
            .map(|(n, c)| (n.to_string(), c.to_string()))
            .collect();

        match lockfile.validate(&declared) {
            Err(LockfileError::Validation(issues)) => {
                assert_eq!(issues.len(), 2);
                assert_eq!(issues[1].kind, IssueKind::Missing);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_update() {
        let mut lockfile =
            LockFile::generate(&[node("a", "1.0.0", vec![])], &[], "https://r.io");
        let before = lockfile.generated_at;
        lockfile.update("a", "1.1.0").unwrap();
        assert_eq!(lockfile.resolved["a"].version, "1.1.0");
        assert_eq!(lockfile.dependencies["a"].version, "1.1.0");
        assert!(lockfile.generated_at >= before);
        assert!(lockfile.update("a", "1.1").is_err());
        assert!(matches!(
            lockfile.update("zzz", "1.0.0"),
            Err(LockfileError::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_verify_short_integrity() {
        let mut lockfile =
            LockFile::generate(&[node("a", "1.0.0", vec![])], &[], "https://r.io");
        lockfile.resolved.get_mut("a").unwrap().integrity = "sha256-".to_string();
        assert!(matches!(
            lockfile.verify(),
            Err(LockfileError::InvalidEntry { .. })
        ));
    }

    #[test]
    fn test_verify_closure() {
        let mut lockfile =
            LockFile::generate(&[node("a", "1.0.0", vec![])], &[], "https://r.io");
        lockfile
            .dependencies
            .get_mut("a")
            .unwrap()
            .requires
            .push("@org/missing@2.0.0".to_string());
        let err = lockfile.verify().unwrap_err();
        assert!(err.to_string().contains("@org/missing is not resolved"));
    }

    #[test]
    fn test_path_for() {
        assert_eq!(
            LockFile::path_for(Path::new("/work/app/shode.json"), LOCKFILE_NAME),
            PathBuf::from("/work/app/shode-lock.json")
        );
    }
}
