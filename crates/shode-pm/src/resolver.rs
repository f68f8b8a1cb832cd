//! Dependency resolution
//!
//! Turns declared range constraints plus a catalog of available versions
//! into one version per package and a resolved dependency tree.

use crate::graph::{DependencyGraph, DependencyNode, GraphError};
use crate::lockfile::LockFile;
use crate::manifest::Manifest;
use crate::semver::{Range, SemverError, Version};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Upper bound on refinement rounds before giving up
pub const MAX_ROUNDS: usize = 256;

/// Errors that can occur during dependency resolution
#[derive(Debug, Error)]
pub enum ResolverError {
    /// A declared constraint failed to parse
    #[error("Failed to parse version constraint for {package}: {error}")]
    InvalidConstraint {
        package: String,
        error: SemverError,
    },

    /// The catalog knows nothing about a package
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    /// Cycle or version conflict
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Choices kept changing between rounds
    #[error("Resolution did not settle after {0} rounds")]
    DidNotConverge(usize),

    /// A reached package ended up without a chosen version
    #[error("No version selected for {0}")]
    Unselected(String),
}

/// Source of available versions and per-version dependency declarations
///
/// Implemented by whatever fetches registry metadata; resolution itself
/// never touches the network.
pub trait PackageCatalog {
    /// All published versions of a package, `None` if it is unknown
    fn versions(&self, name: &str) -> Option<Vec<Version>>;

    /// Dependencies declared by one version (name → range expression)
    fn dependencies(&self, _name: &str, _version: &Version) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

/// Catalog held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    packages: BTreeMap<String, Vec<(Version, BTreeMap<String, String>)>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one version with its dependency declarations
    pub fn add_version(&mut self, name: &str, version: Version, dependencies: &[(&str, &str)]) {
        let deps = dependencies
            .iter()
            .map(|(n, c)| (n.to_string(), c.to_string()))
            .collect();
        let versions = self.packages.entry(name.to_string()).or_default();
        versions.retain(|(v, _)| *v != version);
        versions.push((version, deps));
    }

    /// Builder form of [`Self::add_version`]
    pub fn with_package(
        mut self,
        name: &str,
        version: Version,
        dependencies: &[(&str, &str)],
    ) -> Self {
        self.add_version(name, version, dependencies);
        self
    }

    /// Add several dependency-free versions at once
    pub fn with_versions(mut self, name: &str, versions: Vec<Version>) -> Self {
        for version in versions {
            self.add_version(name, version, &[]);
        }
        self
    }
}

impl PackageCatalog for InMemoryCatalog {
    fn versions(&self, name: &str) -> Option<Vec<Version>> {
        self.packages
            .get(name)
            .map(|entries| entries.iter().map(|(v, _)| v.clone()).collect())
    }

    fn dependencies(&self, name: &str, version: &Version) -> BTreeMap<String, String> {
        self.packages
            .get(name)
            .and_then(|entries| entries.iter().find(|(v, _)| v == version))
            .map(|(_, deps)| deps.clone())
            .unwrap_or_default()
    }
}

/// Result of a successful resolution
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    /// One node per declared dependency, in declaration order
    pub roots: Vec<DependencyNode>,

    /// Chosen version for every reached package
    pub versions: BTreeMap<String, Version>,

    /// Dependencies before dependents
    pub install_order: Vec<String>,
}

/// A project resolution split by dependency kind
#[derive(Debug, Clone)]
pub struct ProjectResolution {
    pub runtime: Vec<DependencyNode>,
    pub dev: Vec<DependencyNode>,
    pub tree: ResolvedTree,
}

/// A dependency whose locked version is behind what the catalog offers
#[derive(Debug, Clone, PartialEq)]
pub struct OutdatedPackage {
    pub name: String,

    /// Locked version, `None` when the lock file lacks the package
    pub current: Option<String>,

    /// Newest version inside the declared range
    pub wanted: Option<Version>,

    /// Newest published version
    pub latest: Version,

    pub dev: bool,
}

/// Resolve declared dependencies against a catalog
pub fn resolve(
    declared: &BTreeMap<String, String>,
    catalog: &impl PackageCatalog,
) -> Result<ResolvedTree, ResolverError> {
    let roots: Vec<(String, String)> = declared
        .iter()
        .map(|(n, c)| (n.clone(), c.clone()))
        .collect();
    resolve_roots(&roots, catalog)
}

/// Resolve runtime and development dependencies of a manifest together
///
/// Both sets share one version per package; the roots are split again so
/// the lock file can record them separately.
pub fn resolve_project(
    manifest: &Manifest,
    catalog: &impl PackageCatalog,
) -> Result<ProjectResolution, ResolverError> {
    let roots = manifest.all_dependencies();
    let tree = resolve_roots(&roots, catalog)?;

    let runtime_count = manifest.dependencies.len();
    let runtime = tree.roots[..runtime_count].to_vec();
    let dev = tree.roots[runtime_count..].to_vec();

    Ok(ProjectResolution { runtime, dev, tree })
}

/// Resolve an ordered list of root requirements
///
/// The same name may appear more than once; all of its constraints apply.
pub fn resolve_roots(
    roots: &[(String, String)],
    catalog: &impl PackageCatalog,
) -> Result<ResolvedTree, ResolverError> {
    resolve_roots_within(roots, catalog, MAX_ROUNDS)
}

/// [`resolve_roots`] with an explicit bound on refinement rounds
///
/// Each round rebuilds the graph from the previous round's choices and
/// picks the highest version per package again. When a choice map repeats
/// without settling, the states of that loop are checked and the best one
/// that satisfies its own graph wins; if none does, the first package that
/// keeps changing is reported.
pub fn resolve_roots_within(
    roots: &[(String, String)],
    catalog: &impl PackageCatalog,
    max_rounds: usize,
) -> Result<ResolvedTree, ResolverError> {
    for (name, constraint) in roots {
        Range::parse(constraint).map_err(|error| ResolverError::InvalidConstraint {
            package: name.clone(),
            error,
        })?;
    }

    let mut chosen: BTreeMap<String, Version> = BTreeMap::new();
    let mut history: Vec<BTreeMap<String, Version>> = Vec::new();

    for round in 0..max_rounds {
        let mut graph = build_graph(roots, &chosen, catalog)?;
        let picks = graph.resolve_conflicts()?;
        tracing::debug!(round, packages = picks.len(), "resolution round");

        if picks == chosen {
            tracing::info!(packages = picks.len(), rounds = round + 1, "resolved dependencies");
            return finish(graph, picks, roots);
        }

        if let Some(start) = history.iter().position(|state| *state == picks) {
            tracing::warn!(
                round,
                period = history.len() - start,
                "resolution oscillates, checking visited states"
            );
            let (graph, picks) = settle(roots, &history[start..], catalog)?;
            return finish(graph, picks, roots);
        }

        history.push(picks.clone());
        chosen = picks;
    }

    Err(ResolverError::DidNotConverge(max_rounds))
}

/// Pick the best self-consistent state out of an oscillation
fn settle(
    roots: &[(String, String)],
    states: &[BTreeMap<String, Version>],
    catalog: &impl PackageCatalog,
) -> Result<(DependencyGraph, BTreeMap<String, Version>), ResolverError> {
    let mut best: Option<(DependencyGraph, BTreeMap<String, Version>)> = None;

    for state in states {
        let graph = build_graph(roots, state, catalog)?;
        if !graph.accepts(state)? {
            continue;
        }

        let picks: BTreeMap<String, Version> = state
            .iter()
            .filter(|(name, _)| graph.node(name).is_some())
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect();

        let better = match &best {
            Some((_, current)) => picks.iter().cmp(current.iter()) == Ordering::Greater,
            None => true,
        };
        if better {
            best = Some((graph, picks));
        }
    }

    best.ok_or_else(|| unstable_package(states).into())
}

/// The first package whose choice differs between oscillating states
fn unstable_package(states: &[BTreeMap<String, Version>]) -> GraphError {
    let names: BTreeSet<&String> = states.iter().flat_map(|state| state.keys()).collect();

    for name in names {
        let choices: Vec<Option<&Version>> = states.iter().map(|state| state.get(name)).collect();
        if choices.windows(2).all(|pair| pair[0] == pair[1]) {
            continue;
        }

        let mut versions: Vec<&Version> = choices.into_iter().flatten().collect();
        versions.sort();
        versions.dedup();
        return GraphError::UnstableSelection {
            package: name.clone(),
            versions: versions.iter().map(ToString::to_string).collect(),
        };
    }

    // Oscillating states always differ somewhere
    GraphError::UnstableSelection {
        package: String::new(),
        versions: Vec::new(),
    }
}

fn finish(
    mut graph: DependencyGraph,
    picks: BTreeMap<String, Version>,
    roots: &[(String, String)],
) -> Result<ResolvedTree, ResolverError> {
    let install_order = graph.install_order()?;
    let roots = roots
        .iter()
        .map(|(name, constraint)| build_node(&graph, &picks, name, constraint))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ResolvedTree {
        roots,
        versions: picks,
        install_order,
    })
}

/// Graph of everything reachable from the roots through the current choices
fn build_graph(
    roots: &[(String, String)],
    chosen: &BTreeMap<String, Version>,
    catalog: &impl PackageCatalog,
) -> Result<DependencyGraph, ResolverError> {
    let mut graph = DependencyGraph::new();
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::new();

    for (name, constraint) in roots {
        if seen.insert(name.clone()) {
            graph.add_candidates(name, available(catalog, name)?);
            queue.push_back(name.clone());
        }
        graph.constrain(name, constraint);
    }

    while let Some(name) = queue.pop_front() {
        let Some(version) = chosen.get(&name) else {
            continue;
        };

        for (dep, constraint) in catalog.dependencies(&name, version) {
            if seen.insert(dep.clone()) {
                graph.add_candidates(&dep, available(catalog, &dep)?);
                queue.push_back(dep.clone());
            }
            graph.require(&name, &dep, &constraint);
        }
    }

    Ok(graph)
}

fn available(catalog: &impl PackageCatalog, name: &str) -> Result<Vec<Version>, ResolverError> {
    catalog
        .versions(name)
        .ok_or_else(|| ResolverError::PackageNotFound(name.to_string()))
}

/// Build the resolved subtree below `name`; the graph is known to be acyclic
fn build_node(
    graph: &DependencyGraph,
    versions: &BTreeMap<String, Version>,
    name: &str,
    constraint: &str,
) -> Result<DependencyNode, ResolverError> {
    let version = versions
        .get(name)
        .cloned()
        .ok_or_else(|| ResolverError::Unselected(name.to_string()))?;

    let dependencies = graph
        .dependencies_of(name)
        .iter()
        .map(|child| {
            let child_constraint = graph
                .node(child)
                .and_then(|node| {
                    node.requirements
                        .iter()
                        .find(|r| r.requirer.as_deref() == Some(name))
                })
                .map(|r| r.constraint.as_str())
                .unwrap_or("*");
            build_node(graph, versions, child, child_constraint)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DependencyNode {
        name: name.to_string(),
        version,
        constraint: constraint.to_string(),
        integrity: None,
        dependencies,
    })
}

impl ResolvedTree {
    /// Attach a verified content digest to every node of a package
    pub fn record_integrity(&mut self, name: &str, checksum: &str) {
        fn walk(node: &mut DependencyNode, name: &str, checksum: &str) {
            if node.name == name {
                node.integrity = Some(checksum.to_string());
            }
            for child in &mut node.dependencies {
                walk(child, name, checksum);
            }
        }

        for root in &mut self.roots {
            walk(root, name, checksum);
        }
    }
}

/// Newest version of a package inside a range
pub fn find_latest(
    name: &str,
    constraint: &str,
    catalog: &impl PackageCatalog,
) -> Result<Option<Version>, ResolverError> {
    let range = Range::parse(constraint).map_err(|error| ResolverError::InvalidConstraint {
        package: name.to_string(),
        error,
    })?;
    let versions = available(catalog, name)?;
    Ok(range.max_satisfying(&versions).cloned())
}

/// Compare locked versions with what the catalog offers
///
/// Packages the catalog does not know are skipped.
pub fn outdated(
    manifest: &Manifest,
    lockfile: &LockFile,
    catalog: &impl PackageCatalog,
) -> Result<Vec<OutdatedPackage>, ResolverError> {
    let declared = manifest
        .dependencies
        .iter()
        .map(|(n, c)| (n, c, false))
        .chain(manifest.dev_dependencies.iter().map(|(n, c)| (n, c, true)));

    let mut report = Vec::new();
    for (name, constraint, dev) in declared {
        let Some(versions) = catalog.versions(name) else {
            tracing::warn!(package = %name, "package missing from catalog, skipping");
            continue;
        };
        let Some(latest) = versions.iter().max().cloned() else {
            continue;
        };

        let wanted = find_latest(name, constraint, catalog)?;
        let current = lockfile.get(name).map(|entry| entry.version.clone());
        let up_to_date = current
            .as_deref()
            .and_then(|c| Version::parse(c).ok())
            .is_some_and(|c| c == latest);

        if !up_to_date {
            report.push(OutdatedPackage {
                name: name.clone(),
                current,
                wanted,
                latest,
                dev,
            });
        }
    }

    Ok(report)
}
