//! SW-012: Deterministic in-process provisioner.
//!
//! Produces plausible outputs for every kind without touching a cloud.
//! Supports per-resource failure injection, artificial latency and keeps a
//! journal of issued calls.

use super::{ProviderError, Provisioner, ResolvedConfig};
use crate::core::types::{Outputs, ResourceKind};
use crate::resources::{self, SimEnv};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A call issued against the simulated provider, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Delete(String),
}

#[derive(Debug, Default)]
pub struct SimulatedProvisioner {
    env: SimEnv,
    latency: Duration,
    slow: HashMap<String, Duration>,
    fail_create: HashMap<String, String>,
    fail_delete: HashMap<String, String>,
    dropped_outputs: HashMap<String, HashSet<String>>,
    strict_deletes: bool,
    live: Mutex<IndexMap<String, ResourceKind>>,
    journal: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SimulatedProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_env(mut self, env: SimEnv) -> Self {
        self.env = env;
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay calls for one resource.
    pub fn slow(mut self, resource: &str, latency: Duration) -> Self {
        self.slow.insert(resource.to_string(), latency);
        self
    }

    pub fn fail_create(mut self, resource: &str, message: &str) -> Self {
        self.fail_create
            .insert(resource.to_string(), message.to_string());
        self
    }

    pub fn fail_delete(mut self, resource: &str, message: &str) -> Self {
        self.fail_delete
            .insert(resource.to_string(), message.to_string());
        self
    }

    /// Omit one output attribute from a resource's create response.
    pub fn drop_output(mut self, resource: &str, attribute: &str) -> Self {
        self.dropped_outputs
            .entry(resource.to_string())
            .or_default()
            .insert(attribute.to_string());
        self
    }

    /// Reject deletes of resources this instance never created.
    pub fn strict(mut self) -> Self {
        self.strict_deletes = true;
        self
    }

    pub fn journal(&self) -> Vec<Call> {
        guard(&self.journal).clone()
    }

    pub fn creates(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|c| match c {
                Call::Create(n) => Some(n),
                Call::Delete(_) => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.journal()
            .into_iter()
            .filter_map(|c| match c {
                Call::Delete(n) => Some(n),
                Call::Create(_) => None,
            })
            .collect()
    }

    /// Resources created and not yet deleted.
    pub fn live(&self) -> Vec<String> {
        guard(&self.live).keys().cloned().collect()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn pause(&self, resource: &str) {
        let delay = self.slow.get(resource).copied().unwrap_or(self.latency);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn enter(&self, call: Call) {
        guard(&self.journal).push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Provisioner for SimulatedProvisioner {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn create(
        &self,
        kind: ResourceKind,
        name: &str,
        config: &ResolvedConfig,
    ) -> Result<Outputs, ProviderError> {
        self.enter(Call::Create(name.to_string()));
        self.pause(name).await;
        self.leave();

        if let Some(message) = self.fail_create.get(name) {
            return Err(ProviderError::Rejected(message.clone()));
        }

        let mut outputs = resources::simulate_outputs(kind, name, config, &self.env);
        if let Some(dropped) = self.dropped_outputs.get(name) {
            outputs.retain(|k, _| !dropped.contains(k));
        }
        guard(&self.live).insert(name.to_string(), kind);
        Ok(outputs)
    }

    async fn delete(
        &self,
        _kind: ResourceKind,
        name: &str,
        _outputs: &Outputs,
    ) -> Result<(), ProviderError> {
        self.enter(Call::Delete(name.to_string()));
        self.pause(name).await;
        self.leave();

        if let Some(message) = self.fail_delete.get(name) {
            return Err(ProviderError::Rejected(message.clone()));
        }

        let removed = guard(&self.live).shift_remove(name).is_some();
        if !removed && self.strict_deletes {
            return Err(ProviderError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_config() -> ResolvedConfig {
        let mut config = ResolvedConfig::new();
        config.insert("name".into(), serde_json::json!("events"));
        config.insert("streamEnabled".into(), serde_json::json!(true));
        config
    }

    #[tokio::test]
    async fn test_sw012_create_records_and_returns_outputs() {
        let sim = SimulatedProvisioner::new();
        let outputs = sim
            .create(ResourceKind::Table, "events", &table_config())
            .await
            .unwrap();
        assert_eq!(outputs["tableName"], serde_json::json!("events"));
        assert_eq!(sim.creates(), vec!["events"]);
        assert_eq!(sim.live(), vec!["events"]);
    }

    #[tokio::test]
    async fn test_sw012_injected_create_failure() {
        let sim = SimulatedProvisioner::new().fail_create("events", "throttled");
        let err = sim
            .create(ResourceKind::Table, "events", &table_config())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "provider rejected request: throttled");
        assert!(sim.live().is_empty());
        assert_eq!(sim.journal(), vec![Call::Create("events".into())]);
    }

    #[tokio::test]
    async fn test_sw012_strict_delete_of_unknown() {
        let sim = SimulatedProvisioner::new().strict();
        let err = sim
            .delete(ResourceKind::Role, "ghost", &Outputs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound(_)));

        let lenient = SimulatedProvisioner::new();
        lenient
            .delete(ResourceKind::Role, "ghost", &Outputs::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sw012_drop_output() {
        let sim = SimulatedProvisioner::new().drop_output("events", "tableArn");
        let outputs = sim
            .create(ResourceKind::Table, "events", &table_config())
            .await
            .unwrap();
        assert!(!outputs.contains_key("tableArn"));
        assert!(outputs.contains_key("tableName"));
    }

    #[tokio::test]
    async fn test_sw012_delete_removes_live() {
        let sim = SimulatedProvisioner::new().strict();
        let outputs = sim
            .create(ResourceKind::Table, "events", &table_config())
            .await
            .unwrap();
        sim.delete(ResourceKind::Table, "events", &outputs)
            .await
            .unwrap();
        assert!(sim.live().is_empty());
        assert_eq!(sim.deletes(), vec!["events"]);
    }
}
