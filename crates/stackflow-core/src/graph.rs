//! Dependency graph over resource specs
//!
//! Edges point from a dependency to its dependent, so a topological order
//! lists every dependency before anything that needs it.

use crate::error::{ReconcileError, Result};
use crate::spec::ResourceSpec;
use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet};

/// A validated set of specs keyed by name
#[derive(Debug, Clone)]
pub struct SpecGraph {
    specs: Vec<ResourceSpec>,
    graph: DiGraph<usize, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl SpecGraph {
    /// Builds the graph, rejecting duplicate names, self-dependencies and
    /// dependencies on unknown specs
    pub fn new(specs: impl IntoIterator<Item = ResourceSpec>) -> Result<Self> {
        let specs: Vec<ResourceSpec> = specs.into_iter().collect();
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for (index, spec) in specs.iter().enumerate() {
            if node_map.contains_key(spec.name()) {
                return Err(ReconcileError::DuplicateSpec(spec.name().to_string()));
            }
            node_map.insert(spec.name().to_string(), graph.add_node(index));
        }

        for spec in &specs {
            let dependent = node_map[spec.name()];
            for dependency in spec.dependencies() {
                if dependency == spec.name() {
                    return Err(ReconcileError::Cycle(vec![
                        spec.name().to_string(),
                        spec.name().to_string(),
                    ]));
                }
                let from = node_map.get(dependency).ok_or_else(|| {
                    ReconcileError::UnknownDependency {
                        spec: spec.name().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                graph.add_edge(*from, dependent, ());
            }
        }

        Ok(Self {
            specs,
            graph,
            node_map,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.node_map
            .get(name)
            .map(|index| &self.specs[self.graph[*index]])
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceSpec> {
        self.specs.iter()
    }

    /// Specs reachable from `roots`, dependencies first
    ///
    /// An empty `roots` selects every spec. Fails with
    /// [`ReconcileError::Cycle`] when the reachable specs are not acyclic.
    pub fn plan(&self, roots: &[&str]) -> Result<Vec<&ResourceSpec>> {
        let reachable = self.reachable(roots)?;

        // Re-index the reachable part so an unrelated cycle elsewhere in the
        // blueprint does not fail this run.
        let mut subgraph: DiGraph<usize, ()> = DiGraph::new();
        let mut sub_nodes = HashMap::new();
        for node in self.graph.node_indices() {
            if reachable.contains(&node) {
                sub_nodes.insert(node, subgraph.add_node(self.graph[node]));
            }
        }
        for edge in self.graph.raw_edges() {
            if let (Some(from), Some(to)) = (sub_nodes.get(&edge.source()), sub_nodes.get(&edge.target())) {
                subgraph.add_edge(*from, *to, ());
            }
        }

        match toposort(&subgraph, None) {
            Ok(order) => Ok(order
                .into_iter()
                .map(|node| &self.specs[subgraph[node]])
                .collect()),
            Err(cycle) => Err(ReconcileError::Cycle(
                self.cycle_members(&subgraph, cycle.node_id()),
            )),
        }
    }

    fn reachable(&self, roots: &[&str]) -> Result<HashSet<NodeIndex>> {
        if roots.is_empty() {
            return Ok(self.graph.node_indices().collect());
        }

        let mut seen = HashSet::new();
        let mut stack = Vec::new();
        for root in roots {
            let node = self.node_map.get(*root).ok_or_else(|| {
                ReconcileError::Configuration(format!("unknown resource: {}", root))
            })?;
            stack.push(*node);
        }

        while let Some(node) = stack.pop() {
            if seen.insert(node) {
                stack.extend(self.graph.neighbors_directed(node, Direction::Incoming));
            }
        }
        Ok(seen)
    }

    /// Names of the strongly connected component containing `node`, closed
    /// into a loop for display (a -> b -> a)
    fn cycle_members(&self, subgraph: &DiGraph<usize, ()>, node: NodeIndex) -> Vec<String> {
        let component = tarjan_scc(subgraph)
            .into_iter()
            .find(|scc| scc.contains(&node))
            .unwrap_or_else(|| vec![node]);

        let mut names: Vec<String> = component
            .iter()
            .map(|n| self.specs[subgraph[*n]].name().to_string())
            .collect();
        names.sort();
        if let Some(first) = names.first().cloned() {
            names.push(first);
        }
        names
    }
}
