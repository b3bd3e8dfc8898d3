//! SW-004: Dependency graph — explicit and reference-derived edges.
//!
//! Edges point from dependent to dependency. Three sources feed the graph:
//! explicit `depends_on` declarations, dependencies a kind declares through
//! its configuration (a resolver's `dependsOnSchema`), and every attribute
//! reference found in a resource's configuration tree.

use super::error::StackError;
use super::resolver;
use super::types::*;
use crate::resources;
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet};

/// Directed graph over resource names.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<String>,
    /// dependent -> dependencies
    deps: BTreeMap<String, BTreeSet<String>>,
    /// dependency -> dependents
    dependents: BTreeMap<String, BTreeSet<String>>,
    origins: BTreeMap<(String, String), EdgeOrigin>,
}

impl DependencyGraph {
    /// Build and cycle-check the graph of a resource set.
    pub fn build(
        resources: &IndexMap<String, Resource>,
        explicit: &[(String, String)],
    ) -> Result<Self, StackError> {
        let mut graph = Self::default();
        for name in resources.keys() {
            graph.add_node(name);
        }

        for (dependent, dependency) in explicit {
            graph.checked_edge(resources, dependent, dependency, EdgeOrigin::Explicit)?;
        }

        for (name, resource) in resources {
            for dependency in resources::declared_dependencies(resource) {
                graph.checked_edge(resources, name, &dependency, EdgeOrigin::Explicit)?;
            }
            for reference in resolver::config_references(&resource.config) {
                graph.checked_edge(resources, name, &reference.resource, EdgeOrigin::Reference)?;
            }
        }

        if let Some(path) = graph.find_cycle() {
            return Err(StackError::Cycle { path });
        }

        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.origins.len(),
            "dependency graph built"
        );
        Ok(graph)
    }

    fn checked_edge(
        &mut self,
        resources: &IndexMap<String, Resource>,
        dependent: &str,
        dependency: &str,
        origin: EdgeOrigin,
    ) -> Result<(), StackError> {
        for name in [dependent, dependency] {
            if !resources.contains_key(name) {
                return Err(StackError::UnknownResource {
                    name: name.to_string(),
                    referenced_by: dependent.to_string(),
                });
            }
        }
        self.add_edge(dependent, dependency, origin);
        Ok(())
    }

    pub fn add_node(&mut self, name: &str) {
        self.nodes.insert(name.to_string());
    }

    /// Add an edge; a pair seen twice keeps one edge with merged origin.
    pub fn add_edge(&mut self, dependent: &str, dependency: &str, origin: EdgeOrigin) {
        self.add_node(dependent);
        self.add_node(dependency);
        self.deps
            .entry(dependent.to_string())
            .or_default()
            .insert(dependency.to_string());
        self.dependents
            .entry(dependency.to_string())
            .or_default()
            .insert(dependent.to_string());
        self.origins
            .entry((dependent.to_string(), dependency.to_string()))
            .and_modify(|o| *o = o.merge(origin))
            .or_insert(origin);
    }

    /// All node names, sorted.
    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependencies of `name`, sorted.
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.deps
            .get(name)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Direct dependents of `name`, sorted.
    pub fn dependents(&self, name: &str) -> Vec<&str> {
        self.dependents
            .get(name)
            .map(|d| d.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn has_edge(&self, dependent: &str, dependency: &str) -> bool {
        self.deps
            .get(dependent)
            .is_some_and(|d| d.contains(dependency))
    }

    /// Deduplicated edges, sorted by (dependent, dependency).
    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.origins
            .iter()
            .map(|((dependent, dependency), origin)| DependencyEdge {
                dependent: dependent.clone(),
                dependency: dependency.clone(),
                origin: *origin,
            })
            .collect()
    }

    /// First cycle found by a depth-first walk in name order.
    ///
    /// The path starts and ends at the same resource; a self edge on `X`
    /// yields `[X, X]`.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: BTreeSet<&str> = BTreeSet::new();
        for root in &self.nodes {
            if done.contains(root.as_str()) {
                continue;
            }
            // Explicit frames so long chains cannot exhaust the thread stack
            let mut frames: Vec<(&str, std::vec::IntoIter<&str>)> =
                vec![(root.as_str(), self.dependencies(root).into_iter())];
            let mut path: Vec<&str> = vec![root.as_str()];
            let mut on_path: BTreeSet<&str> = BTreeSet::from([root.as_str()]);

            while let Some((node, deps)) = frames.last_mut() {
                let node = *node;
                let Some(dep) = deps.next() else {
                    frames.pop();
                    path.pop();
                    on_path.remove(node);
                    done.insert(node);
                    continue;
                };
                if on_path.contains(dep) {
                    let pos = path.iter().position(|n| *n == dep).unwrap_or_default();
                    let mut cycle: Vec<String> =
                        path[pos..].iter().map(|s| s.to_string()).collect();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
                if !done.contains(dep) {
                    frames.push((dep, self.dependencies(dep).into_iter()));
                    path.push(dep);
                    on_path.insert(dep);
                }
            }
        }
        None
    }
}
