//! SW-005: Leveled topological scheduling and plan generation.

use super::error::StackError;
use super::graph::DependencyGraph;
use super::types::*;
use crate::resources;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Order the graph into levels with Kahn's algorithm.
///
/// Level 0 holds every node without dependencies; level *i* holds the nodes
/// whose dependencies all sit in levels `< i`. Each level is sorted by name
/// so the result is deterministic.
pub fn schedule(graph: &DependencyGraph) -> Result<Vec<Vec<String>>, StackError> {
    let mut in_degree: BTreeMap<&str, usize> = graph
        .nodes()
        .map(|n| (n, graph.dependencies(n).len()))
        .collect();

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(n, _)| *n)
        .collect();

    let mut levels: Vec<Vec<String>> = Vec::new();
    let mut scheduled = 0usize;

    while !ready.is_empty() {
        ready.sort_unstable();
        let mut next: Vec<&str> = Vec::new();
        for node in &ready {
            in_degree.remove(node);
            for dependent in graph.dependents(node) {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent);
                    }
                }
            }
        }
        scheduled += ready.len();
        levels.push(ready.iter().map(|s| s.to_string()).collect());
        ready = next;
    }

    if scheduled != graph.len() {
        let path = graph
            .find_cycle()
            .unwrap_or_else(|| in_degree.keys().map(|s| s.to_string()).collect());
        return Err(StackError::Cycle { path });
    }

    Ok(levels)
}

/// Build a creation plan from a scheduled graph.
pub fn plan(
    name: &str,
    resources: &IndexMap<String, Resource>,
    graph: &DependencyGraph,
) -> Result<ExecutionPlan, StackError> {
    let levels = schedule(graph)?;
    let mut changes = Vec::new();
    for (level, members) in levels.iter().enumerate() {
        for id in members {
            let Some(resource) = resources.get(id) else {
                continue;
            };
            changes.push(PlannedChange {
                resource_id: id.clone(),
                kind: resource.kind,
                level,
                action: PlanAction::Create,
                description: resources::describe(resource),
            });
        }
    }

    Ok(ExecutionPlan {
        name: name.to_string(),
        levels,
        edges: graph.edges(),
        changes,
    })
}

/// Teardown plan for a creation plan: same levels, last level first.
///
/// Only live resources (created, or left over by a failed delete) are listed.
pub fn teardown_plan(plan: &ExecutionPlan, resources: &IndexMap<String, Resource>) -> ExecutionPlan {
    let depth = plan.levels.len();
    let mut levels = Vec::new();
    let mut changes = Vec::new();

    for (level, members) in plan.levels.iter().enumerate().rev() {
        let present: Vec<String> = members
            .iter()
            .filter(|id| resources.get(id.as_str()).is_some_and(|r| r.status.is_live()))
            .cloned()
            .collect();
        for id in &present {
            if let Some(resource) = resources.get(id) {
                changes.push(PlannedChange {
                    resource_id: id.clone(),
                    kind: resource.kind,
                    level: depth - 1 - level,
                    action: PlanAction::Destroy,
                    description: format!("{}: delete {}", id, resource.kind),
                });
            }
        }
        if !present.is_empty() {
            levels.push(present);
        }
    }

    ExecutionPlan {
        name: plan.name.clone(),
        levels,
        edges: plan.edges.clone(),
        changes,
    }
}
