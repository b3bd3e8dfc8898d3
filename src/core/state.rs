//! SW-013: Lock file management — load, save (atomic), path derivation,
//! and conversion between a stack and its lock.

use super::error::StackError;
use super::graph::DependencyGraph;
use super::stack::Stack;
use super::types::*;
use crate::tripwire::{eventlog, hasher};
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Derive the lock file path for a stack within the state directory.
pub fn lock_file_path(state_dir: &Path, stack: &str) -> PathBuf {
    state_dir.join(stack).join("state.lock.yaml")
}

/// Load a stack's lock file. Returns None if the file doesn't exist.
pub fn load_lock(state_dir: &Path, stack: &str) -> Result<Option<StackLock>, String> {
    let path = lock_file_path(state_dir, stack);
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(&path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let lock: StackLock = serde_yaml_ng::from_str(&content)
        .map_err(|e| format!("invalid lock file {}: {}", path.display(), e))?;
    Ok(Some(lock))
}

/// Save a lock file atomically (write to temp, then rename).
pub fn save_lock(state_dir: &Path, lock: &StackLock) -> Result<(), String> {
    let path = lock_file_path(state_dir, &lock.stack);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
    }

    let yaml = serde_yaml_ng::to_string(lock).map_err(|e| format!("serialize error: {}", e))?;

    let tmp_path = path.with_extension("lock.yaml.tmp");
    std::fs::write(&tmp_path, &yaml)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, &path).map_err(|e| {
        format!(
            "cannot rename {} -> {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}

/// Delete a stack's lock file if present.
pub fn remove_lock(state_dir: &Path, stack: &str) -> Result<(), String> {
    let path = lock_file_path(state_dir, stack);
    if path.exists() {
        std::fs::remove_file(&path)
            .map_err(|e| format!("cannot remove {}: {}", path.display(), e))?;
    }
    Ok(())
}

/// Every stack with a lock under `state_dir`, sorted by name.
pub fn list_locks(state_dir: &Path) -> Result<Vec<StackLock>, String> {
    if !state_dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(state_dir)
        .map_err(|e| format!("cannot read dir {}: {}", state_dir.display(), e))?;
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    names.sort();

    let mut locks = Vec::new();
    for name in names {
        if let Some(lock) = load_lock(state_dir, &name)? {
            locks.push(lock);
        }
    }
    Ok(locks)
}

/// Snapshot the live resources of a stack.
pub fn lock_from_stack(stack: &Stack) -> Result<StackLock, StackError> {
    let graph = stack.graph()?;
    let plan = stack.plan()?;
    let live: BTreeSet<&str> = stack
        .live_resources()
        .iter()
        .map(|r| r.name.as_str())
        .collect();

    let mut resources = IndexMap::new();
    for id in plan.levels.iter().flatten() {
        let Some(resource) = stack.resource(id).filter(|r| r.status.is_live()) else {
            continue;
        };
        resources.insert(
            id.clone(),
            ResourceLock {
                kind: resource.kind,
                status: resource.status,
                level: plan.level_of(id).unwrap_or_default(),
                applied_at: resource.applied_at.clone(),
                config_hash: resource.config_hash.clone(),
                depends_on: live_dependencies(&graph, id, &live),
                outputs: resource.outputs.clone(),
            },
        );
    }

    let hashes: Vec<&str> = resources
        .values()
        .filter_map(|r: &ResourceLock| r.config_hash.as_deref())
        .collect();

    Ok(StackLock {
        schema: "1.0".to_string(),
        stack: stack.name().to_string(),
        generated_at: eventlog::now_iso8601(),
        generator: format!("stackwright {}", env!("CARGO_PKG_VERSION")),
        digest: hasher::composite_hash(&hashes),
        resources,
    })
}

/// Nearest live resources reachable through the dependency edges of `name`.
///
/// Deleted resources in between are looked through, so teardown order
/// survives a partial rollback.
fn live_dependencies(graph: &DependencyGraph, name: &str, live: &BTreeSet<&str>) -> Vec<String> {
    let mut found = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut frontier: Vec<&str> = graph.dependencies(name);
    while let Some(dep) = frontier.pop() {
        if !seen.insert(dep) {
            continue;
        }
        if live.contains(dep) {
            found.insert(dep.to_string());
        } else {
            frontier.extend(graph.dependencies(dep));
        }
    }
    found.into_iter().collect()
}

/// Rebuild a stack from its lock alone, ready for `destroy`.
pub fn stack_from_lock(lock: &StackLock) -> Result<Stack, StackError> {
    let mut stack = Stack::new(lock.stack.as_str());
    for (name, entry) in &lock.resources {
        let mut resource = Resource::new(name.as_str(), entry.kind, ConfigMap::new());
        resource.status = entry.status;
        resource.outputs = entry.outputs.clone();
        resource.config_hash = entry.config_hash.clone();
        resource.applied_at = entry.applied_at.clone();
        stack.restore_resource(resource)?;
    }
    for (name, entry) in &lock.resources {
        for dep in &entry.depends_on {
            if lock.resources.contains_key(dep) {
                stack.add_explicit_dependency(name, dep)?;
            }
        }
    }
    Ok(stack)
}
