//! Shode Package Manager Library
//!
//! The offline core of the Shode package manager:
//! - Semver version parsing, ordering and range expressions
//! - Dependency graph ordering, cycle detection and conflict resolution
//! - Resolution of declared dependencies against a package catalog
//! - Package manifest parsing (shode.json)
//! - Lockfile management (shode-lock.json)
//! - Local package links (shode-links.json)
//! - Trusted signer store and detached signature verification
//!
//! Registry transport, archive handling and the command line live elsewhere.

pub mod config;
pub mod graph;
pub mod links;
pub mod lockfile;
pub mod manifest;
pub mod resolver;
pub mod semver;
pub mod trust;

pub use config::{ConfigError, PmConfig};
pub use graph::{DependencyGraph, DependencyNode, GraphError, GraphNode, GraphState, Requirement};
pub use links::{LinkEntry, LinkError, LinkManager, LinkedCatalog};
pub use lockfile::{DepEntry, IssueKind, LockEntry, LockFile, LockfileError, ValidationIssue};
pub use manifest::{Manifest, ManifestError};
pub use resolver::{
    find_latest, outdated, resolve, resolve_project, resolve_roots, resolve_roots_within,
    InMemoryCatalog, OutdatedPackage, PackageCatalog, ProjectResolution, ResolvedTree,
    ResolverError,
};
pub use semver::{Constraint, Identifier, Op, Range, SemverError, Version};
pub use trust::{
    verify_artifact, ArtifactClaim, ArtifactVerifier, SignatureAlgorithm, TrustError,
    TrustStore, TrustedSigner, VerifiedArtifact, VerifyError,
};
