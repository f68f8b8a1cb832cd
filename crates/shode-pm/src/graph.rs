//! Dependency graph
//!
//! Named package nodes plus a directed "depends on" edge map. A single
//! resolution pass moves through [`GraphState`]: nodes and edges are added
//! (`Building`), an order is computed (`Sorted`), and version conflicts are
//! settled (`Resolved`). Any error leaves the pass `Failed`.

use crate::semver::{Range, SemverError, Version};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Errors that can occur while ordering or resolving the graph
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph is not a DAG
    #[error("circular dependency detected among: {}", .0.join(", "))]
    CircularDependency(Vec<String>),

    /// A recorded constraint could not be parsed
    #[error("invalid constraint '{constraint}' for {package}: {error}")]
    InvalidConstraint {
        package: String,
        constraint: String,
        error: SemverError,
    },

    /// The accumulated constraints admit no version at all
    #[error("no common range for {package}: {}", .constraints.join(", "))]
    NoCommonRange {
        package: String,
        constraints: Vec<String>,
    },

    /// The common range is satisfiable, but no known candidate is in it
    #[error("no version of {package} satisfies {range} (required: {})", .constraints.join(", "))]
    NoMatchingVersion {
        package: String,
        range: String,
        constraints: Vec<String>,
    },

    /// Refinement keeps flipping a package with no consistent choice
    #[error("no stable version of {package}: selection alternates between {}", .versions.join(", "))]
    UnstableSelection {
        package: String,
        versions: Vec<String>,
    },
}

/// Progress of a resolution pass over the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Building,
    Sorted,
    Resolved,
    Failed,
}

/// One recorded requirement on a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    /// Package that asked for it; `None` for the project root
    pub requirer: Option<String>,

    /// Range expression as written by the requirer
    pub constraint: String,
}

/// Resolver bookkeeping for one package name
#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    pub name: String,

    /// Versions known to exist for this package
    pub candidates: Vec<Version>,

    /// Every constraint placed on this package, in insertion order
    pub requirements: Vec<Requirement>,
}

/// A node of a resolved dependency tree
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
    pub name: String,
    pub version: Version,

    /// Constraint the parent (or the project) declared for this package
    pub constraint: String,

    /// Verified content digest (hex SHA-256), if the artifact was checked
    pub integrity: Option<String>,

    /// Already-resolved children
    pub dependencies: Vec<DependencyNode>,
}

/// Dependency graph for one resolution pass
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: BTreeMap<String, Vec<String>>,
    state: GraphState,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
            state: GraphState::Building,
        }
    }

    /// Register a package with a candidate version and a root constraint
    ///
    /// Calling this again for the same name accumulates: the version joins
    /// the candidates and the constraint joins the requirements.
    pub fn add_node(&mut self, name: &str, version: Version, constraint: &str) {
        self.add_candidates(name, [version]);
        self.constrain(name, constraint);
    }

    /// Record a project-level constraint on a package
    pub fn constrain(&mut self, name: &str, constraint: &str) {
        self.entry(name).requirements.push(Requirement {
            requirer: None,
            constraint: constraint.to_string(),
        });
    }

    /// Add known versions for a package without constraining it
    pub fn add_candidates(&mut self, name: &str, versions: impl IntoIterator<Item = Version>) {
        let node = self.entry(name);
        for version in versions {
            if !node.candidates.contains(&version) {
                node.candidates.push(version);
            }
        }
    }

    /// Record that `from` requires `to` within `constraint`
    pub fn require(&mut self, from: &str, to: &str, constraint: &str) {
        self.entry(to).requirements.push(Requirement {
            requirer: Some(from.to_string()),
            constraint: constraint.to_string(),
        });
        self.add_edge(from, to);
    }

    /// Record that `from` depends on `to`
    ///
    /// `to` does not have to be a known node yet.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        self.state = GraphState::Building;
        let targets = self.edges.entry(from.to_string()).or_default();
        if !targets.iter().any(|t| t == to) {
            targets.push(to.to_string());
        }
    }

    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.get(name)
    }

    /// Direct dependencies of a package (edge targets)
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.edges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topological order using Kahn's algorithm
    ///
    /// Dependents come before their dependencies. A cycle fails the whole
    /// sort; no partial order is returned.
    pub fn topological_sort(&mut self) -> Result<Vec<String>, GraphError> {
        let vertices = self.vertices();
        let mut in_degree: BTreeMap<&str, usize> = vertices.iter().map(|v| (*v, 0)).collect();
        for targets in self.edges.values() {
            for to in targets {
                *in_degree.entry(to.as_str()).or_default() += 1;
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(name, _)| *name)
            .collect();

        let mut order = Vec::with_capacity(vertices.len());
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());
            for neighbor in self.dependencies_of(current) {
                if let Some(degree) = in_degree.get_mut(neighbor.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(neighbor.as_str());
                    }
                }
            }
        }

        if order.len() < vertices.len() {
            let stuck: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            self.state = GraphState::Failed;
            return Err(GraphError::CircularDependency(stuck));
        }

        self.state = GraphState::Sorted;
        Ok(order)
    }

    /// Order in which packages can be installed: every dependency comes
    /// before its dependents. Exactly the reverse of [`Self::topological_sort`].
    pub fn install_order(&mut self) -> Result<Vec<String>, GraphError> {
        let mut order = self.topological_sort()?;
        order.reverse();
        Ok(order)
    }

    /// Find cycles with a depth-first search
    ///
    /// Each cycle is reported as the path slice from the first visit of the
    /// repeated node to the node that closes the loop. A self-loop is a
    /// one-element cycle.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut visited = BTreeSet::new();
        let mut cycles = Vec::new();
        // Current DFS path; each frame keeps the index of its next edge
        let mut stack: Vec<(&str, usize)> = Vec::new();
        let mut on_path: BTreeSet<&str> = BTreeSet::new();

        for vertex in self.vertices() {
            if !visited.insert(vertex) {
                continue;
            }
            stack.push((vertex, 0));
            on_path.insert(vertex);

            while let Some(frame) = stack.last_mut() {
                let Some(neighbor) = self.dependencies_of(frame.0).get(frame.1) else {
                    on_path.remove(frame.0);
                    stack.pop();
                    continue;
                };
                frame.1 += 1;
                let neighbor = neighbor.as_str();

                if on_path.contains(neighbor) {
                    let start = stack.iter().rposition(|(p, _)| *p == neighbor).unwrap_or(0);
                    cycles.push(stack[start..].iter().map(|(p, _)| p.to_string()).collect());
                } else if visited.insert(neighbor) {
                    stack.push((neighbor, 0));
                    on_path.insert(neighbor);
                }
            }
        }
        cycles
    }

    pub fn has_cycle(&self) -> bool {
        !self.detect_cycles().is_empty()
    }

    /// Pick one version per package
    ///
    /// All requirements on a name are intersected into one range and the
    /// highest candidate inside it wins. The first package that cannot be
    /// satisfied fails the pass.
    pub fn resolve_conflicts(&mut self) -> Result<BTreeMap<String, Version>, GraphError> {
        match self.select_versions() {
            Ok(resolved) => {
                self.state = GraphState::Resolved;
                Ok(resolved)
            }
            Err(e) => {
                self.state = GraphState::Failed;
                Err(e)
            }
        }
    }

    fn select_versions(&self) -> Result<BTreeMap<String, Version>, GraphError> {
        let mut resolved = BTreeMap::new();

        for (name, node) in &self.nodes {
            let constraints: Vec<String> = node
                .requirements
                .iter()
                .map(|r| r.constraint.clone())
                .collect();

            let mut common = Range::new(Vec::new());
            for constraint in &constraints {
                common = common.intersect(&parse_requirement(name, constraint)?);
            }

            if !common.is_satisfiable() {
                return Err(GraphError::NoCommonRange {
                    package: name.clone(),
                    constraints,
                });
            }

            let best = common.max_satisfying(&node.candidates).ok_or_else(|| {
                GraphError::NoMatchingVersion {
                    package: name.clone(),
                    range: common.to_string(),
                    constraints: constraints.clone(),
                }
            })?;

            tracing::debug!(package = %name, version = %best, "selected version");
            resolved.insert(name.clone(), best.clone());
        }

        Ok(resolved)
    }

    fn entry(&mut self, name: &str) -> &mut GraphNode {
        self.state = GraphState::Building;
        self.nodes
            .entry(name.to_string())
            .or_insert_with(|| GraphNode {
                name: name.to_string(),
                ..GraphNode::default()
            })
    }

    /// Known nodes plus any name mentioned by an edge, in name order
    /// Whether a selection satisfies every recorded requirement
    ///
    /// Every node needs a pick that is one of its candidates and lies inside
    /// each of its constraints. Picks for names outside the graph are ignored.
    pub fn accepts(&self, picks: &BTreeMap<String, Version>) -> Result<bool, GraphError> {
        for (name, node) in &self.nodes {
            let Some(version) = picks.get(name) else {
                return Ok(false);
            };
            if !node.candidates.contains(version) {
                return Ok(false);
            }
            for requirement in &node.requirements {
                if !parse_requirement(name, &requirement.constraint)?.matches(version) {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn vertices(&self) -> BTreeSet<&str> {
        let mut vertices: BTreeSet<&str> = self.nodes.keys().map(String::as_str).collect();
        for (from, targets) in &self.edges {
            vertices.insert(from);
            vertices.extend(targets.iter().map(String::as_str));
        }
        vertices
    }
}

fn parse_requirement(package: &str, constraint: &str) -> Result<Range, GraphError> {
    Range::parse(constraint).map_err(|error| GraphError::InvalidConstraint {
        package: package.to_string(),
        constraint: constraint.to_string(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(edges: &[(&str, &str)]) -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        for (from, to) in edges {
            graph.add_edge(from, to);
        }
        graph
    }

    #[test]
    fn test_install_order_chain() {
        let mut graph = chain(&[("a", "b"), ("b", "c")]);
        assert_eq!(graph.topological_sort().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(graph.install_order().unwrap(), vec!["c", "b", "a"]);
        assert_eq!(graph.state(), GraphState::Sorted);
    }

    #[test]
    fn test_cycle_fails_sort() {
        let mut graph = chain(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let err = graph.topological_sort().unwrap_err();
        assert!(matches!(err, GraphError::CircularDependency(_)));
        assert!(err.to_string().starts_with("circular dependency detected"));
        assert_eq!(graph.state(), GraphState::Failed);

        let cycles = graph.detect_cycles();
        assert_eq!(cycles, vec![vec!["a", "b", "c"]]);
    }

    #[test]
    fn test_self_loop() {
        let graph = chain(&[("a", "a")]);
        assert_eq!(graph.detect_cycles(), vec![vec!["a"]]);
        assert!(graph.has_cycle());
    }

    #[test]
    fn test_accumulates_constraints() {
        let mut graph = DependencyGraph::new();
        graph.add_node("log", Version::new(1, 4, 0), "^1.0.0");
        graph.add_node("log", Version::new(1, 2, 0), "<1.3.0");
        let node = graph.node("log").unwrap();
        assert_eq!(node.requirements.len(), 2);
        assert_eq!(node.candidates.len(), 2);

        let resolved = graph.resolve_conflicts().unwrap();
        assert_eq!(resolved["log"], Version::new(1, 2, 0));
        assert_eq!(graph.state(), GraphState::Resolved);
    }

    #[test]
    fn test_no_common_range() {
        let mut graph = DependencyGraph::new();
        graph.add_candidates("json", [Version::new(1, 5, 0), Version::new(2, 1, 0)]);
        graph.require("app", "json", "^1.0.0");
        graph.require("web", "json", "^2.0.0");

        let err = graph.resolve_conflicts().unwrap_err();
        match err {
            GraphError::NoCommonRange { package, constraints } => {
                assert_eq!(package, "json");
                assert_eq!(constraints, vec!["^1.0.0", "^2.0.0"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(graph.state(), GraphState::Failed);
    }
}
