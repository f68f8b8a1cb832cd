//! Local package links (shode-links.json)
//!
//! A link points a dependency at a package directory on disk instead of
//! the registry copy. Links live next to the project manifest and are
//! consulted during resolution through [`LinkedCatalog`].

use crate::lockfile::LockFile;
use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::resolver::PackageCatalog;
use crate::semver::{SemverError, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Link file name, stored in the project root
pub const LINKS_FILE: &str = "shode-links.json";

/// Locator prefix written into the lock file for linked packages
pub const LINK_PREFIX: &str = "link:";

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to access link file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse link file: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Local path does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Not a package directory (missing shode.json): {}", .0.display())]
    NotAPackage(PathBuf),

    #[error("Package name mismatch: expected {expected}, found {found}")]
    NameMismatch { expected: String, found: String },

    #[error("Invalid linked manifest: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Linked package {package} has an invalid version: {error}")]
    InvalidVersion { package: String, error: SemverError },

    #[error("Package is not linked: {0}")]
    NotLinked(String),
}

/// One persisted link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LinkEntry {
    pub package_name: String,
    pub local_path: PathBuf,
}

/// Project-local set of package links
///
/// Same locking and persistence model as the trust store: one
/// reader/writer lock, whole-file rewrite on every change.
#[derive(Debug)]
pub struct LinkManager {
    path: PathBuf,
    links: RwLock<BTreeMap<String, PathBuf>>,
}

impl LinkManager {
    /// Open the links of the project rooted at `project_root`
    pub fn open(project_root: &Path) -> Result<Self, LinkError> {
        let path = project_root.join(LINKS_FILE);

        let links = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => {
                let entries: Vec<LinkEntry> = serde_json::from_str(&content)?;
                entries
                    .into_iter()
                    .map(|e| (e.package_name, e.local_path))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), links = links.len(), "opened link file");
        Ok(Self {
            path,
            links: RwLock::new(links),
        })
    }

    /// Link `name` to a package directory
    ///
    /// The directory must hold a manifest declaring the same name.
    /// Relinking replaces the previous path.
    pub fn link(&self, name: &str, local_path: impl Into<PathBuf>) -> Result<(), LinkError> {
        let local_path = local_path.into();
        read_package(name, &local_path)?;

        let mut links = self.links.write();
        let previous = links.insert(name.to_string(), local_path.clone());
        if let Err(e) = self.persist(&links) {
            match previous {
                Some(previous) => links.insert(name.to_string(), previous),
                None => links.remove(name),
            };
            return Err(e);
        }

        tracing::info!(package = name, path = %local_path.display(), "linked package");
        Ok(())
    }

    /// Remove a link, returning the path it pointed at
    pub fn unlink(&self, name: &str) -> Result<PathBuf, LinkError> {
        let mut links = self.links.write();
        let removed = links
            .remove(name)
            .ok_or_else(|| LinkError::NotLinked(name.to_string()))?;

        if let Err(e) = self.persist(&links) {
            links.insert(name.to_string(), removed);
            return Err(e);
        }

        tracing::info!(package = name, "unlinked package");
        Ok(removed)
    }

    pub fn get_link(&self, name: &str) -> Option<PathBuf> {
        self.links.read().get(name).cloned()
    }

    /// All links, ordered by package name
    pub fn list_links(&self) -> Vec<LinkEntry> {
        self.links
            .read()
            .iter()
            .map(|(name, path)| LinkEntry {
                package_name: name.clone(),
                local_path: path.clone(),
            })
            .collect()
    }

    pub fn is_linked(&self, name: &str) -> bool {
        self.links.read().contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    /// Where a package's files live: its link, or `<modules_path>/<name>`
    pub fn resolve_link(&self, name: &str, modules_path: &Path) -> PathBuf {
        self.get_link(name).unwrap_or_else(|| modules_path.join(name))
    }

    /// Point locked entries of linked packages at their directories
    ///
    /// The registry locator becomes `link:<path>` and the integrity is
    /// cleared since local content is never hashed. Returns how many
    /// entries changed.
    pub fn apply_to_lockfile(&self, lockfile: &mut LockFile) -> usize {
        let links = self.links.read();
        let mut changed = 0;
        for (name, path) in links.iter() {
            if let Some(entry) = lockfile.resolved.get_mut(name) {
                entry.resolved = format!("{}{}", LINK_PREFIX, path.display());
                entry.integrity.clear();
                changed += 1;
            }
        }
        if changed > 0 {
            tracing::debug!(entries = changed, "applied links to lockfile");
        }
        changed
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, links: &BTreeMap<String, PathBuf>) -> Result<(), LinkError> {
        let entries: Vec<LinkEntry> = links
            .iter()
            .map(|(name, path)| LinkEntry {
                package_name: name.clone(),
                local_path: path.clone(),
            })
            .collect();
        let content = serde_json::to_string_pretty(&entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Load and check the manifest of a linked directory
fn read_package(name: &str, local_path: &Path) -> Result<Manifest, LinkError> {
    if !local_path.exists() {
        return Err(LinkError::PathNotFound(local_path.to_path_buf()));
    }

    let manifest_path = local_path.join(MANIFEST_FILE);
    if !manifest_path.is_file() {
        return Err(LinkError::NotAPackage(local_path.to_path_buf()));
    }

    let manifest = Manifest::load(&manifest_path)?;
    if manifest.name != name {
        return Err(LinkError::NameMismatch {
            expected: name.to_string(),
            found: manifest.name,
        });
    }
    Ok(manifest)
}

/// A catalog where linked packages shadow the inner catalog
///
/// A linked package offers exactly one version, the one in its local
/// manifest, and depends on that manifest's runtime dependencies.
#[derive(Debug)]
pub struct LinkedCatalog<'a, C> {
    inner: &'a C,
    linked: BTreeMap<String, (Version, BTreeMap<String, String>)>,
}

impl<'a, C: PackageCatalog> LinkedCatalog<'a, C> {
    /// Snapshot the manifests of every current link
    pub fn new(inner: &'a C, links: &LinkManager) -> Result<Self, LinkError> {
        let mut linked = BTreeMap::new();
        for entry in links.list_links() {
            let manifest = read_package(&entry.package_name, &entry.local_path)?;
            let version =
                Version::parse(&manifest.version).map_err(|error| LinkError::InvalidVersion {
                    package: entry.package_name.clone(),
                    error,
                })?;
            linked.insert(entry.package_name, (version, manifest.dependencies));
        }
        Ok(Self { inner, linked })
    }
}

impl<C: PackageCatalog> PackageCatalog for LinkedCatalog<'_, C> {
    fn versions(&self, name: &str) -> Option<Vec<Version>> {
        match self.linked.get(name) {
            Some((version, _)) => Some(vec![version.clone()]),
            None => self.inner.versions(name),
        }
    }

    fn dependencies(&self, name: &str, version: &Version) -> BTreeMap<String, String> {
        match self.linked.get(name) {
            Some((local, deps)) if local == version => deps.clone(),
            Some(_) => BTreeMap::new(),
            None => self.inner.dependencies(name, version),
        }
    }
}
