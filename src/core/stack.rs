//! SW-008: Stack — the resource set of one deployable unit.
//!
//! Construction is pure in-memory assembly. `plan` never calls out;
//! `apply` and `destroy` hand the plan to the executor.

use super::error::StackError;
use super::executor::{self, ApplyConfig};
use super::graph::DependencyGraph;
use super::planner;
use super::types::*;
use crate::provider::Provisioner;
use indexmap::IndexMap;

/// Handle returned by [`Stack::add_resource`], used to build references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceHandle {
    name: String,
}

impl ResourceHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference to one of this resource's outputs.
    pub fn attr(&self, attribute: &str) -> ConfigValue {
        reference(self.name.as_str(), attribute)
    }
}

/// Owns every resource and explicit edge of a deployable unit.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    resources: IndexMap<String, Resource>,
    explicit_edges: Vec<(String, String)>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: IndexMap::new(),
            explicit_edges: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a resource. Names are unique within a stack.
    pub fn add_resource(
        &mut self,
        name: &str,
        kind: ResourceKind,
        config: ConfigMap,
    ) -> Result<ResourceHandle, StackError> {
        if self.resources.contains_key(name) {
            return Err(StackError::DuplicateName(name.to_string()));
        }
        self.resources
            .insert(name.to_string(), Resource::new(name, kind, config));
        Ok(ResourceHandle {
            name: name.to_string(),
        })
    }

    /// Declare that `dependent` must be created after `dependency`.
    pub fn add_explicit_dependency(
        &mut self,
        dependent: &str,
        dependency: &str,
    ) -> Result<(), StackError> {
        for name in [dependent, dependency] {
            if !self.resources.contains_key(name) {
                return Err(StackError::UnknownResource {
                    name: name.to_string(),
                    referenced_by: dependent.to_string(),
                });
            }
        }
        let edge = (dependent.to_string(), dependency.to_string());
        if !self.explicit_edges.contains(&edge) {
            self.explicit_edges.push(edge);
        }
        Ok(())
    }

    pub fn resources(&self) -> &IndexMap<String, Resource> {
        &self.resources
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.get(name)
    }

    pub fn explicit_edges(&self) -> &[(String, String)] {
        &self.explicit_edges
    }

    /// Resources that currently exist at the provider.
    pub fn live_resources(&self) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|r| r.status.is_live())
            .collect()
    }

    /// Derive the dependency graph.
    pub fn graph(&self) -> Result<DependencyGraph, StackError> {
        DependencyGraph::build(&self.resources, &self.explicit_edges)
    }

    /// Derive graph and leveled order. Side-effect free.
    pub fn plan(&self) -> Result<ExecutionPlan, StackError> {
        let graph = self.graph()?;
        planner::plan(&self.name, &self.resources, &graph)
    }

    /// Teardown plan over the resources that are currently live.
    pub fn teardown_plan(&self) -> Result<ExecutionPlan, StackError> {
        Ok(planner::teardown_plan(&self.plan()?, &self.resources))
    }

    /// Create every resource in dependency order, rolling back on failure.
    pub async fn apply(
        &mut self,
        provider: &dyn Provisioner,
        cfg: &ApplyConfig<'_>,
    ) -> Result<ApplyResult, StackError> {
        executor::apply(self, provider, cfg).await
    }

    /// Delete every live resource in reverse dependency order.
    pub async fn destroy(
        &mut self,
        provider: &dyn Provisioner,
        cfg: &ApplyConfig<'_>,
    ) -> Result<DestroyResult, StackError> {
        executor::destroy(self, provider, cfg).await
    }

    pub(crate) fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.resources.get_mut(name)
    }

    pub(crate) fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// Insert a resource restored from a state lock.
    pub(crate) fn restore_resource(&mut self, resource: Resource) -> Result<(), StackError> {
        if self.resources.contains_key(&resource.name) {
            return Err(StackError::DuplicateName(resource.name));
        }
        self.resources.insert(resource.name.clone(), resource);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sw008_duplicate_name() {
        let mut stack = Stack::new("s");
        stack
            .add_resource("events", ResourceKind::Table, ConfigMap::new())
            .unwrap();
        let err = stack
            .add_resource("events", ResourceKind::Role, ConfigMap::new())
            .unwrap_err();
        assert!(matches!(err, StackError::DuplicateName(ref n) if n == "events"));
        assert_eq!(stack.resources().len(), 1);
        assert_eq!(stack.resource("events").unwrap().kind, ResourceKind::Table);
    }

    #[test]
    fn test_sw008_explicit_dependency_unknown() {
        let mut stack = Stack::new("s");
        stack
            .add_resource("a", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        let err = stack.add_explicit_dependency("a", "ghost").unwrap_err();
        assert!(matches!(err, StackError::UnknownResource { ref name, .. } if name == "ghost"));
        let err = stack.add_explicit_dependency("ghost", "a").unwrap_err();
        assert!(err.is_plan_time());
    }

    #[test]
    fn test_sw008_explicit_dependency_deduplicated() {
        let mut stack = Stack::new("s");
        stack
            .add_resource("a", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        stack
            .add_resource("b", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        stack.add_explicit_dependency("b", "a").unwrap();
        stack.add_explicit_dependency("b", "a").unwrap();
        assert_eq!(stack.explicit_edges().len(), 1);
    }

    #[test]
    fn test_sw008_handle_attr_builds_reference() {
        let mut stack = Stack::new("s");
        let table = stack
            .add_resource("events", ResourceKind::Table, ConfigMap::new())
            .unwrap();
        let ds = stack
            .add_resource(
                "ds",
                ResourceKind::DataSource,
                config_map([("backingTableName", table.attr("tableName"))]),
            )
            .unwrap();
        assert_eq!(ds.name(), "ds");
        let plan = stack.plan().unwrap();
        assert_eq!(
            plan.levels,
            vec![vec!["events".to_string()], vec!["ds".to_string()]]
        );
    }

    #[test]
    fn test_sw008_plan_idempotent() {
        let mut stack = Stack::new("s");
        let api = stack
            .add_resource("api", ResourceKind::GraphApi, ConfigMap::new())
            .unwrap();
        stack
            .add_resource(
                "key",
                ResourceKind::ApiKey,
                config_map([("apiId", api.attr("apiId"))]),
            )
            .unwrap();
        stack
            .add_resource("role", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        let first = stack.plan().unwrap();
        let second = stack.plan().unwrap();
        assert_eq!(first.levels, second.levels);
        assert_eq!(first.edges, second.edges);
    }

    #[test]
    fn test_sw008_teardown_plan_empty_before_apply() {
        let mut stack = Stack::new("s");
        stack
            .add_resource("a", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        assert!(stack.teardown_plan().unwrap().levels.is_empty());
        assert!(stack.live_resources().is_empty());
    }
}
