//! SW-007: Executor — materializes a stack level by level.
//!
//! apply: plan → for each level: resolve → create (bounded concurrency) →
//! barrier → record outputs. A failure stops new starts, lets in-flight
//! siblings settle, then deletes everything created so far in reverse
//! level order.
//!
//! destroy: for each level, last first: delete every live resource;
//! failures are collected, never abort the loop.

use super::error::{DeleteFailure, RollbackOutcome, StackError};
use super::resolver::{self, OutputTable};
use super::stack::Stack;
use super::types::*;
use crate::provider::{ProviderError, Provisioner, ResolvedConfig};
use crate::resources;
use crate::tripwire::{eventlog, hasher};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Configuration for an apply or destroy run.
#[derive(Debug, Clone)]
pub struct ApplyConfig<'a> {
    /// Maximum provider calls in flight within one level
    pub concurrency: usize,
    /// Timeout for each provider call
    pub timeout: Duration,
    /// Where the event log lives; `None` disables it
    pub state_dir: Option<&'a Path>,
    pub tripwire: bool,
    pub run_id: String,
}

impl ApplyConfig<'_> {
    pub fn from_policy(policy: &Policy) -> Self {
        Self {
            concurrency: policy.concurrency.max(1),
            timeout: policy.timeout(),
            state_dir: None,
            tripwire: policy.tripwire,
            run_id: eventlog::generate_run_id(),
        }
    }
}

impl<'a> ApplyConfig<'a> {
    pub fn with_state_dir(mut self, state_dir: &'a Path) -> Self {
        self.state_dir = Some(state_dir);
        self
    }
}

impl Default for ApplyConfig<'_> {
    fn default() -> Self {
        Self::from_policy(&Policy::default())
    }
}

/// What happened to one resource of a level.
enum CreateOutcome {
    /// Not started because a sibling had already failed.
    Skipped,
    Created {
        outputs: Outputs,
        hash: String,
        seconds: f64,
    },
    /// The resource exists but broke the output contract.
    Incomplete {
        outputs: Outputs,
        hash: String,
        error: ProviderError,
    },
    Failed {
        error: ProviderError,
    },
}

/// Execute the apply loop.
pub async fn apply(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
) -> Result<ApplyResult, StackError> {
    let span = tracing::info_span!(
        "apply",
        stack = %stack.name(),
        run_id = %cfg.run_id,
        provider = provider.name()
    );
    apply_levels(stack, provider, cfg).instrument(span).await
}

async fn apply_levels(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
) -> Result<ApplyResult, StackError> {
    let start = Instant::now();
    // Plan-time errors surface before any provider call
    let plan = stack.plan()?;
    let stack_name = stack.name().to_string();

    for resource in stack.resources_mut() {
        resource.status = ResourceStatus::Pending;
        resource.outputs.clear();
        resource.config_hash = None;
        resource.applied_at = None;
    }

    log_tripwire(
        cfg,
        &stack_name,
        ProvenanceEvent::ApplyStarted {
            stack: stack_name.clone(),
            run_id: cfg.run_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    );
    tracing::info!(
        levels = plan.levels.len(),
        resources = plan.resource_count(),
        "apply started"
    );

    let mut outputs = OutputTable::new();
    let mut created: Vec<String> = Vec::new();

    for (index, level) in plan.levels.iter().enumerate() {
        tracing::debug!(level = index, members = ?level, "level started");

        // Resolve every member against earlier levels before starting any create
        let mut jobs: Vec<(String, ResourceKind, ResolvedConfig)> = Vec::new();
        for name in level {
            let Some(resource) = stack.resource_mut(name) else {
                continue;
            };
            transition(resource, ResourceStatus::Resolving);
            match resolver::resolve_config(name, &resource.config, &outputs) {
                Ok(config) => jobs.push((name.clone(), resource.kind, config)),
                Err(err) => {
                    transition(resource, ResourceStatus::Failed);
                    log_tripwire(
                        cfg,
                        &stack_name,
                        ProvenanceEvent::ResourceFailed {
                            stack: stack_name.clone(),
                            resource: name.clone(),
                            error: err.to_string(),
                        },
                    );
                    for (pending, _, _) in &jobs {
                        if let Some(r) = stack.resource_mut(pending) {
                            transition(r, ResourceStatus::Pending);
                        }
                    }
                    tracing::error!(resource = %name, error = %err, "scheduler invariant violated");
                    let rollback = roll_back(stack, provider, cfg, &plan, &created).await;
                    tracing::warn!(%rollback, "rollback finished");
                    return Err(match err {
                        StackError::UnresolvedReference {
                            resource,
                            reference,
                            ..
                        } => StackError::UnresolvedReference {
                            resource,
                            reference,
                            rollback,
                        },
                        other => other,
                    });
                }
            }
        }

        let mut settled = create_level(&stack_name, provider, cfg, jobs).await;

        // Barrier: every member of this level has settled
        let mut failures: Vec<(String, ResourceKind, ProviderError)> = Vec::new();
        for name in level {
            let Some(outcome) = settled.remove(name) else {
                continue;
            };
            let Some(resource) = stack.resource_mut(name) else {
                continue;
            };
            match outcome {
                CreateOutcome::Skipped => transition(resource, ResourceStatus::Pending),
                CreateOutcome::Created {
                    outputs: produced,
                    hash,
                    seconds,
                } => {
                    transition(resource, ResourceStatus::Creating);
                    record_created(resource, &produced, &hash);
                    outputs.insert(name.clone(), produced);
                    created.push(name.clone());
                    log_tripwire(
                        cfg,
                        &stack_name,
                        ProvenanceEvent::ResourceCreated {
                            stack: stack_name.clone(),
                            resource: name.clone(),
                            duration_seconds: seconds,
                            hash,
                        },
                    );
                }
                CreateOutcome::Incomplete {
                    outputs: produced,
                    hash,
                    error,
                } => {
                    transition(resource, ResourceStatus::Creating);
                    record_created(resource, &produced, &hash);
                    created.push(name.clone());
                    failures.push((name.clone(), resource.kind, error));
                }
                CreateOutcome::Failed { error } => {
                    transition(resource, ResourceStatus::Creating);
                    transition(resource, ResourceStatus::Failed);
                    failures.push((name.clone(), resource.kind, error));
                }
            }
        }

        if failures.is_empty() {
            continue;
        }

        for (name, _, error) in &failures {
            tracing::warn!(resource = %name, %error, "resource failed");
            log_tripwire(
                cfg,
                &stack_name,
                ProvenanceEvent::ResourceFailed {
                    stack: stack_name.clone(),
                    resource: name.clone(),
                    error: error.to_string(),
                },
            );
        }

        let rollback = roll_back(stack, provider, cfg, &plan, &created).await;
        let created_count = created.len() as u32;
        log_tripwire(
            cfg,
            &stack_name,
            ProvenanceEvent::ApplyCompleted {
                stack: stack_name.clone(),
                run_id: cfg.run_id.clone(),
                resources_created: created_count,
                resources_failed: failures.len() as u32,
                total_seconds: start.elapsed().as_secs_f64(),
            },
        );

        let mut failures = failures.into_iter();
        let Some((resource, kind, source)) = failures.next() else {
            continue;
        };
        return Err(StackError::CreationFailed {
            resource,
            kind,
            source,
            also_failed: failures.map(|(name, _, _)| name).collect(),
            rollback,
        });
    }

    let total_duration = start.elapsed();
    log_tripwire(
        cfg,
        &stack_name,
        ProvenanceEvent::ApplyCompleted {
            stack: stack_name.clone(),
            run_id: cfg.run_id.clone(),
            resources_created: created.len() as u32,
            resources_failed: 0,
            total_seconds: total_duration.as_secs_f64(),
        },
    );
    tracing::info!(
        created = created.len(),
        seconds = total_duration.as_secs_f64(),
        "apply completed"
    );

    Ok(ApplyResult {
        stack: stack_name,
        levels: plan.levels.len(),
        resources_created: created.len() as u32,
        total_duration,
    })
}

/// Run the creates of one level with bounded concurrency.
///
/// Once any create fails no further create is started; creates already
/// started run to completion.
async fn create_level(
    stack_name: &str,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
    jobs: Vec<(String, ResourceKind, ResolvedConfig)>,
) -> HashMap<String, CreateOutcome> {
    let abort = AtomicBool::new(false);
    let abort = &abort;

    stream::iter(jobs)
        .map(|(name, kind, config)| async move {
            if abort.load(Ordering::SeqCst) {
                tracing::debug!(resource = %name, "not started");
                return (name, CreateOutcome::Skipped);
            }
            tracing::debug!(resource = %name, %kind, "creating");
            log_tripwire(
                cfg,
                stack_name,
                ProvenanceEvent::ResourceStarted {
                    stack: stack_name.to_string(),
                    resource: name.clone(),
                    action: PlanAction::Create.to_string(),
                },
            );

            let hash = hasher::hash_json(&serde_json::Value::Object(config.clone()));
            let started = Instant::now();
            let result = match tokio::time::timeout(cfg.timeout, provider.create(kind, &name, &config))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(cfg.timeout)),
            };

            let outcome = match result {
                Ok(outputs) => match missing_output(kind, &outputs) {
                    None => CreateOutcome::Created {
                        outputs,
                        hash,
                        seconds: started.elapsed().as_secs_f64(),
                    },
                    Some(attribute) => {
                        abort.store(true, Ordering::SeqCst);
                        CreateOutcome::Incomplete {
                            outputs,
                            hash,
                            error: ProviderError::MissingOutput { attribute },
                        }
                    }
                },
                Err(error) => {
                    abort.store(true, Ordering::SeqCst);
                    CreateOutcome::Failed { error }
                }
            };
            (name, outcome)
        })
        .buffer_unordered(cfg.concurrency.max(1))
        .collect()
        .await
}

/// First declared output a create failed to return.
fn missing_output(kind: ResourceKind, outputs: &Outputs) -> Option<String> {
    resources::schema(kind)
        .outputs
        .iter()
        .find(|attr| outputs.get(**attr).map_or(true, |v| v.is_null()))
        .map(|attr| attr.to_string())
}

fn record_created(resource: &mut Resource, outputs: &Outputs, hash: &str) {
    resource.outputs = outputs.clone();
    resource.config_hash = Some(hash.to_string());
    resource.applied_at = Some(eventlog::now_iso8601());
    transition(resource, ResourceStatus::Created);
}

/// Delete what this apply created, last level first.
async fn roll_back(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
    plan: &ExecutionPlan,
    created: &[String],
) -> RollbackOutcome {
    if created.is_empty() {
        return RollbackOutcome::NothingToRollBack;
    }
    let stack_name = stack.name().to_string();
    tracing::warn!(resources = ?created, "rolling back");
    log_tripwire(
        cfg,
        &stack_name,
        ProvenanceEvent::RollbackStarted {
            stack: stack_name.clone(),
            run_id: cfg.run_id.clone(),
            resources: created.to_vec(),
        },
    );

    let levels: Vec<Vec<String>> = plan
        .teardown_levels()
        .into_iter()
        .map(|level| {
            level
                .into_iter()
                .filter(|name| created.contains(name))
                .collect::<Vec<_>>()
        })
        .filter(|level| !level.is_empty())
        .collect();

    let (deleted, failures) = delete_levels(stack, provider, cfg, &levels).await;
    if failures.is_empty() {
        RollbackOutcome::Complete { deleted }
    } else {
        RollbackOutcome::Partial {
            deleted,
            leftover: failures.into_iter().map(|f| f.resource).collect(),
        }
    }
}

/// Execute the destroy loop over every live resource.
pub async fn destroy(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
) -> Result<DestroyResult, StackError> {
    let span = tracing::info_span!(
        "destroy",
        stack = %stack.name(),
        run_id = %cfg.run_id,
        provider = provider.name()
    );
    destroy_levels(stack, provider, cfg).instrument(span).await
}

async fn destroy_levels(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
) -> Result<DestroyResult, StackError> {
    let start = Instant::now();
    let teardown = stack.teardown_plan()?;
    let stack_name = stack.name().to_string();
    tracing::info!(resources = teardown.resource_count(), "destroy started");

    let (deleted, failures) = delete_levels(stack, provider, cfg, &teardown.levels).await;
    let total_duration = start.elapsed();

    log_tripwire(
        cfg,
        &stack_name,
        ProvenanceEvent::DestroyCompleted {
            stack: stack_name.clone(),
            run_id: cfg.run_id.clone(),
            resources_deleted: deleted.len() as u32,
            resources_surviving: failures.len() as u32,
            total_seconds: total_duration.as_secs_f64(),
        },
    );

    if !failures.is_empty() {
        tracing::warn!(surviving = failures.len(), "destroy incomplete");
        return Err(StackError::PartialTeardown { deleted, failures });
    }
    tracing::info!(deleted = deleted.len(), "destroy completed");
    Ok(DestroyResult {
        stack: stack_name,
        resources_deleted: deleted.len() as u32,
        total_duration,
    })
}

/// Best-effort deletes, level by level. Returns (deleted, failures).
async fn delete_levels(
    stack: &mut Stack,
    provider: &dyn Provisioner,
    cfg: &ApplyConfig<'_>,
    levels: &[Vec<String>],
) -> (Vec<String>, Vec<DeleteFailure>) {
    let stack_name = stack.name().to_string();
    let mut deleted = Vec::new();
    let mut failures = Vec::new();

    for level in levels {
        let mut jobs: Vec<(String, ResourceKind, Outputs)> = Vec::new();
        for name in level {
            let Some(resource) = stack.resource_mut(name) else {
                continue;
            };
            transition(resource, ResourceStatus::Deleting);
            jobs.push((name.clone(), resource.kind, resource.outputs.clone()));
        }

        let mut settled: HashMap<String, (Result<(), ProviderError>, f64)> = stream::iter(jobs)
            .map(|(name, kind, outputs)| {
                let stack_name = stack_name.as_str();
                async move {
                    log_tripwire(
                        cfg,
                        stack_name,
                        ProvenanceEvent::ResourceStarted {
                            stack: stack_name.to_string(),
                            resource: name.clone(),
                            action: PlanAction::Destroy.to_string(),
                        },
                    );
                    let started = Instant::now();
                    let result =
                        match tokio::time::timeout(cfg.timeout, provider.delete(kind, &name, &outputs))
                            .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(ProviderError::Timeout(cfg.timeout)),
                        };
                    (name, (result, started.elapsed().as_secs_f64()))
                }
            })
            .buffer_unordered(cfg.concurrency.max(1))
            .collect()
            .await;

        for name in level {
            let (Some((result, seconds)), Some(resource)) =
                (settled.remove(name), stack.resource_mut(name))
            else {
                continue;
            };
            match result {
                Ok(()) => {
                    transition(resource, ResourceStatus::Deleted);
                    resource.outputs.clear();
                    resource.config_hash = None;
                    resource.applied_at = None;
                    deleted.push(name.clone());
                    log_tripwire(
                        cfg,
                        &stack_name,
                        ProvenanceEvent::ResourceDeleted {
                            stack: stack_name.clone(),
                            resource: name.clone(),
                            duration_seconds: seconds,
                        },
                    );
                }
                Err(error) => {
                    transition(resource, ResourceStatus::DeleteFailed);
                    tracing::warn!(resource = %name, %error, "delete failed");
                    log_tripwire(
                        cfg,
                        &stack_name,
                        ProvenanceEvent::DeleteFailed {
                            stack: stack_name.clone(),
                            resource: name.clone(),
                            error: error.to_string(),
                        },
                    );
                    failures.push(DeleteFailure {
                        resource: name.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    (deleted, failures)
}

/// Move a resource to its next status, logging the transition.
fn transition(resource: &mut Resource, next: ResourceStatus) {
    if !resource.status.can_transition_to(next) {
        tracing::warn!(
            resource = %resource.name,
            from = %resource.status,
            to = %next,
            "unexpected status transition"
        );
    }
    match next {
        ResourceStatus::Created | ResourceStatus::Deleted => {
            tracing::info!(resource = %resource.name, kind = %resource.kind, status = %next)
        }
        ResourceStatus::Failed | ResourceStatus::DeleteFailed => {
            tracing::warn!(resource = %resource.name, kind = %resource.kind, status = %next)
        }
        _ => tracing::debug!(resource = %resource.name, status = %next),
    }
    resource.status = next;
}

/// Append a provenance event when the event log is enabled.
fn log_tripwire(cfg: &ApplyConfig<'_>, stack: &str, event: ProvenanceEvent) {
    if !cfg.tripwire {
        return;
    }
    if let Some(state_dir) = cfg.state_dir {
        if let Err(e) = eventlog::append_event(state_dir, stack, event) {
            tracing::warn!(error = %e, "cannot write event log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Call, SimulatedProvisioner};

    fn cfg<'a>(concurrency: usize) -> ApplyConfig<'a> {
        ApplyConfig {
            concurrency,
            timeout: Duration::from_secs(5),
            state_dir: None,
            tripwire: false,
            run_id: "r-000000000000".to_string(),
        }
    }

    /// Level 0: api, role, table. Level 1: ds, key, schema.
    /// Level 2: getEvent (explicit edge to schema).
    fn events_stack() -> Stack {
        let mut stack = Stack::new("events-stack");
        let table = stack
            .add_resource(
                "table",
                ResourceKind::Table,
                config_map([
                    ("name", "events".into()),
                    ("streamEnabled", true.into()),
                ]),
            )
            .unwrap();
        let role = stack
            .add_resource("role", ResourceKind::Role, ConfigMap::new())
            .unwrap();
        let api = stack
            .add_resource(
                "api",
                ResourceKind::GraphApi,
                config_map([("name", "eventsApi".into())]),
            )
            .unwrap();
        stack
            .add_resource(
                "key",
                ResourceKind::ApiKey,
                config_map([("apiId", api.attr("apiId"))]),
            )
            .unwrap();
        stack
            .add_resource(
                "schema",
                ResourceKind::GraphSchema,
                config_map([("apiId", api.attr("apiId"))]),
            )
            .unwrap();
        let ds = stack
            .add_resource(
                "ds",
                ResourceKind::DataSource,
                config_map([
                    ("apiId", api.attr("apiId")),
                    ("backingTableName", table.attr("tableName")),
                    ("roleArn", role.attr("roleArn")),
                ]),
            )
            .unwrap();
        stack
            .add_resource(
                "getEvent",
                ResourceKind::Resolver,
                config_map([
                    ("apiId", api.attr("apiId")),
                    ("dataSourceName", ds.attr("dataSourceName")),
                ]),
            )
            .unwrap();
        stack.add_explicit_dependency("getEvent", "schema").unwrap();
        stack
    }

    fn level(plan: &ExecutionPlan, name: &str) -> usize {
        plan.level_of(name).unwrap()
    }

    #[tokio::test]
    async fn test_sw007_apply_records_outputs_per_schema() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new();
        let result = stack.apply(&sim, &cfg(4)).await.unwrap();
        assert_eq!(result.resources_created, 7);
        assert_eq!(result.levels, 3);

        for resource in stack.resources().values() {
            assert_eq!(resource.status, ResourceStatus::Created);
            let declared = !resources::schema(resource.kind).outputs.is_empty();
            assert_eq!(!resource.outputs.is_empty(), declared, "{}", resource.name);
            assert!(resource.config_hash.as_deref().unwrap().starts_with("blake3:"));
        }
        assert_eq!(sim.creates().len(), 7);
        let ds = stack.resource("ds").unwrap();
        assert_eq!(ds.outputs["dataSourceName"], serde_json::json!("ds"));
    }

    #[tokio::test]
    async fn test_sw007_creates_respect_levels() {
        let mut stack = events_stack();
        let plan = stack.plan().unwrap();
        let sim = SimulatedProvisioner::new().with_latency(Duration::from_millis(5));
        stack.apply(&sim, &cfg(3)).await.unwrap();
        let creates = sim.creates();
        for pair in creates.windows(2) {
            assert!(level(&plan, &pair[0]) <= level(&plan, &pair[1]), "{:?}", creates);
        }
    }

    #[tokio::test]
    async fn test_sw007_round_trip_reverse_order() {
        let mut stack = events_stack();
        let plan = stack.plan().unwrap();
        let sim = SimulatedProvisioner::new().strict();
        stack.apply(&sim, &cfg(4)).await.unwrap();
        let result = stack.destroy(&sim, &cfg(4)).await.unwrap();
        assert_eq!(result.resources_deleted, 7);

        let mut deletes = sim.deletes();
        for pair in deletes.windows(2) {
            assert!(level(&plan, &pair[0]) >= level(&plan, &pair[1]), "{:?}", deletes);
        }
        let mut creates = sim.creates();
        deletes.sort();
        creates.sort();
        assert_eq!(deletes, creates);
        assert!(sim.live().is_empty());
        assert!(stack
            .resources()
            .values()
            .all(|r| r.status == ResourceStatus::Deleted && r.outputs.is_empty()));
    }

    #[tokio::test]
    async fn test_sw007_failure_stops_later_levels_and_rolls_back() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new().fail_create("role", "access denied");
        let err = stack.apply(&sim, &cfg(1)).await.unwrap_err();

        // level 0 in name order: api, role, table; table never starts
        assert_eq!(sim.creates(), vec!["api", "role"]);
        assert_eq!(sim.deletes(), vec!["api"]);
        match &err {
            StackError::CreationFailed {
                resource,
                kind,
                rollback,
                also_failed,
                ..
            } => {
                assert_eq!(resource, "role");
                assert_eq!(*kind, ResourceKind::Role);
                assert!(also_failed.is_empty());
                assert_eq!(
                    *rollback,
                    RollbackOutcome::Complete {
                        deleted: vec!["api".to_string()]
                    }
                );
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(err.to_string().contains("access denied"));
        assert_eq!(stack.resource("role").unwrap().status, ResourceStatus::Failed);
        assert_eq!(stack.resource("table").unwrap().status, ResourceStatus::Pending);
        assert_eq!(stack.resource("api").unwrap().status, ResourceStatus::Deleted);
        assert_eq!(stack.resource("ds").unwrap().status, ResourceStatus::Pending);
    }

    #[tokio::test]
    async fn test_sw007_inflight_siblings_settle_then_roll_back() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new()
            .with_latency(Duration::from_millis(20))
            .fail_create("key", "limit exceeded");
        let err = stack.apply(&sim, &cfg(4)).await.unwrap_err();

        let mut creates = sim.creates();
        creates.sort();
        assert_eq!(
            creates,
            vec!["api", "ds", "key", "role", "schema", "table"]
        );
        let deletes = sim.deletes();
        // level 1 survivors first, then level 0
        let (level1, level0) = deletes.split_at(2);
        let mut level1 = level1.to_vec();
        level1.sort();
        let mut level0 = level0.to_vec();
        level0.sort();
        assert_eq!(level1, vec!["ds", "schema"]);
        assert_eq!(level0, vec!["api", "role", "table"]);
        assert!(!sim.journal().contains(&Call::Create("getEvent".into())));
        assert!(err.surviving_resources().is_empty());
    }

    #[tokio::test]
    async fn test_sw007_reverse_order_across_levels() {
        let mut stack = Stack::new("chain");
        let a = stack
            .add_resource("a", ResourceKind::GraphApi, ConfigMap::new())
            .unwrap();
        let b = stack
            .add_resource(
                "b",
                ResourceKind::ApiKey,
                config_map([("apiId", a.attr("apiId"))]),
            )
            .unwrap();
        let c = stack
            .add_resource(
                "c",
                ResourceKind::Role,
                config_map([("trustedPrincipal", b.attr("apiKeyValue"))]),
            )
            .unwrap();
        stack
            .add_resource(
                "d",
                ResourceKind::Role,
                config_map([("trustedPrincipal", c.attr("roleArn"))]),
            )
            .unwrap();
        let sim = SimulatedProvisioner::new().fail_create("d", "boom");
        stack.apply(&sim, &cfg(2)).await.unwrap_err();
        assert_eq!(sim.deletes(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_sw007_partial_rollback_lists_leftovers() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new()
            .fail_create("ds", "bad role")
            .fail_delete("table", "table in use");
        let err = stack.apply(&sim, &cfg(1)).await.unwrap_err();
        match &err {
            StackError::CreationFailed { rollback, .. } => {
                assert!(!rollback.is_complete());
                assert_eq!(rollback.leftover(), ["table".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(err
            .to_string()
            .contains("manual cleanup required for: table"));
        assert_eq!(err.surviving_resources(), vec!["table"]);
        assert_eq!(
            stack.resource("table").unwrap().status,
            ResourceStatus::DeleteFailed
        );
        assert_eq!(stack.live_resources().len(), 1);
    }

    #[tokio::test]
    async fn test_sw007_concurrency_bounded() {
        let mut stack = Stack::new("wide");
        for i in 0..8 {
            stack
                .add_resource(&format!("role{}", i), ResourceKind::Role, ConfigMap::new())
                .unwrap();
        }
        let sim = SimulatedProvisioner::new().with_latency(Duration::from_millis(10));
        stack.apply(&sim, &cfg(3)).await.unwrap();
        assert!(sim.max_in_flight() <= 3);
        assert!(sim.max_in_flight() >= 2);

        let serial = SimulatedProvisioner::new().with_latency(Duration::from_millis(2));
        let mut again = Stack::new("wide");
        for i in 0..4 {
            again
                .add_resource(&format!("role{}", i), ResourceKind::Role, ConfigMap::new())
                .unwrap();
        }
        again.apply(&serial, &cfg(1)).await.unwrap();
        assert_eq!(serial.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_sw007_timeout_is_creation_failure() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new().slow("table", Duration::from_millis(500));
        let mut config = cfg(4);
        config.timeout = Duration::from_millis(30);
        let err = stack.apply(&sim, &config).await.unwrap_err();
        match err {
            StackError::CreationFailed {
                resource, source, ..
            } => {
                assert_eq!(resource, "table");
                assert!(matches!(source, ProviderError::Timeout(_)));
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(!sim.creates().contains(&"ds".to_string()));
    }

    #[tokio::test]
    async fn test_sw007_missing_output_rolls_back_the_resource() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new().drop_output("table", "tableArn");
        let err = stack.apply(&sim, &cfg(1)).await.unwrap_err();
        match &err {
            StackError::CreationFailed { resource, source, .. } => {
                assert_eq!(resource, "table");
                assert!(
                    matches!(source, ProviderError::MissingOutput { attribute } if attribute == "tableArn")
                );
            }
            other => panic!("unexpected: {other}"),
        }
        assert!(sim.deletes().contains(&"table".to_string()));
        assert!(sim.live().is_empty());
    }

    #[tokio::test]
    async fn test_sw007_cycle_never_calls_provider() {
        let mut stack = Stack::new("cyclic");
        stack
            .add_resource(
                "X",
                ResourceKind::Role,
                config_map([("trustedPrincipal", reference("X", "roleArn"))]),
            )
            .unwrap();
        let sim = SimulatedProvisioner::new();
        let err = stack.apply(&sim, &cfg(2)).await.unwrap_err();
        assert!(matches!(err, StackError::Cycle { ref path } if path == &["X", "X"]));
        assert!(sim.journal().is_empty());
    }

    #[tokio::test]
    async fn test_sw007_unresolved_reference_is_fatal() {
        let mut stack = Stack::new("s");
        let table = stack
            .add_resource("t", ResourceKind::Table, config_map([("name", "t".into())]))
            .unwrap();
        stack
            .add_resource(
                "ds",
                ResourceKind::DataSource,
                config_map([("backingTableName", table.attr("noSuchOutput"))]),
            )
            .unwrap();
        let sim = SimulatedProvisioner::new();
        let err = stack.apply(&sim, &cfg(2)).await.unwrap_err();
        assert!(matches!(err, StackError::UnresolvedReference { ref resource, .. } if resource == "ds"));
        assert_eq!(sim.creates(), vec!["t"]);
        assert_eq!(sim.deletes(), vec!["t"]);
        assert_eq!(stack.resource("ds").unwrap().status, ResourceStatus::Failed);
        assert!(err.surviving_resources().is_empty());
        assert!(err.to_string().contains("fully rolled back"));
    }

    #[tokio::test]
    async fn test_sw007_unresolved_reference_reports_leftovers() {
        let mut stack = Stack::new("s");
        let table = stack
            .add_resource("t", ResourceKind::Table, config_map([("name", "t".into())]))
            .unwrap();
        stack
            .add_resource(
                "ds",
                ResourceKind::DataSource,
                config_map([("backingTableName", table.attr("noSuchOutput"))]),
            )
            .unwrap();
        let sim = SimulatedProvisioner::new().fail_delete("t", "in use");
        let err = stack.apply(&sim, &cfg(2)).await.unwrap_err();
        match &err {
            StackError::UnresolvedReference { rollback, .. } => {
                assert_eq!(rollback.leftover(), ["t".to_string()]);
            }
            other => panic!("unexpected: {other}"),
        }
        assert_eq!(err.surviving_resources(), vec!["t"]);
        assert_eq!(stack.resource("t").unwrap().status, ResourceStatus::DeleteFailed);
    }

    #[tokio::test]
    async fn test_sw007_partial_teardown_then_retry() {
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new();
        stack.apply(&sim, &cfg(4)).await.unwrap();

        let flaky = SimulatedProvisioner::new().fail_delete("ds", "dependency violation");
        let err = stack.destroy(&flaky, &cfg(4)).await.unwrap_err();
        match &err {
            StackError::PartialTeardown { deleted, failures } => {
                assert_eq!(deleted.len(), 6);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].resource, "ds");
                assert!(failures[0].error.contains("dependency violation"));
            }
            other => panic!("unexpected: {other}"),
        }
        // every other resource was still attempted, including ds's dependencies
        assert_eq!(flaky.deletes().len(), 7);
        assert_eq!(err.surviving_resources(), vec!["ds"]);

        let retry = SimulatedProvisioner::new();
        let result = stack.destroy(&retry, &cfg(4)).await.unwrap();
        assert_eq!(result.resources_deleted, 1);
        assert_eq!(retry.deletes(), vec!["ds"]);
        assert!(stack.live_resources().is_empty());
    }

    #[tokio::test]
    async fn test_sw007_event_log_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new();
        let mut config = cfg(2).with_state_dir(dir.path());
        config.tripwire = true;
        stack.apply(&sim, &config).await.unwrap();
        stack.destroy(&sim, &config).await.unwrap();

        let events = eventlog::read_events(dir.path(), "events-stack").unwrap();
        assert!(matches!(
            events.first().unwrap().event,
            ProvenanceEvent::ApplyStarted { .. }
        ));
        let created = events
            .iter()
            .filter(|e| matches!(e.event, ProvenanceEvent::ResourceCreated { .. }))
            .count();
        assert_eq!(created, 7);
        assert!(events
            .iter()
            .any(|e| matches!(e.event, ProvenanceEvent::ApplyCompleted { resources_failed: 0, .. })));
        assert!(matches!(
            events.last().unwrap().event,
            ProvenanceEvent::DestroyCompleted {
                resources_deleted: 7,
                resources_surviving: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_sw007_tripwire_off_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut stack = events_stack();
        let sim = SimulatedProvisioner::new();
        let config = cfg(2).with_state_dir(dir.path());
        stack.apply(&sim, &config).await.unwrap();
        assert!(!eventlog::event_log_path(dir.path(), "events-stack").exists());
    }
}
