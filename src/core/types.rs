//! SW-001: Core types — resource kinds, configuration values, attribute
//! references, stack files, policy, plans and provenance events.
//!
//! Stack files are YAML; all file-facing types derive Serialize/Deserialize.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Outputs recorded for a materialized resource (e.g. `tableArn`).
pub type Outputs = IndexMap<String, serde_json::Value>;

/// Configuration mapping of a resource, before resolution.
pub type ConfigMap = IndexMap<String, ConfigValue>;

// ============================================================================
// Stack file (stack.yaml)
// ============================================================================

/// Root of a stack file — the declared resource set of one deployable unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFile {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Stack name, also the state directory key
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Parameters substituted into `{{params.key}}` markers
    #[serde(default)]
    pub params: HashMap<String, serde_yaml_ng::Value>,

    /// Resource declarations (order-preserving)
    #[serde(default)]
    pub resources: IndexMap<String, ResourceDecl>,

    /// Execution policy
    #[serde(default)]
    pub policy: Policy,
}

/// A resource as written in the stack file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Resource kind
    pub kind: ResourceKind,

    /// Raw configuration; references are recognised while loading
    #[serde(default)]
    pub config: IndexMap<String, serde_yaml_ng::Value>,

    /// Explicit dependencies (resources that must be created first)
    #[serde(default)]
    pub depends_on: Vec<String>,
}

// ============================================================================
// Resource kinds
// ============================================================================

/// Closed set of resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Table,
    GraphApi,
    GraphSchema,
    ApiKey,
    DataSource,
    Role,
    Resolver,
    Function,
    Layer,
    RestApi,
    RestResource,
    RestMethod,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 12] = [
        Self::Table,
        Self::GraphApi,
        Self::GraphSchema,
        Self::ApiKey,
        Self::DataSource,
        Self::Role,
        Self::Resolver,
        Self::Function,
        Self::Layer,
        Self::RestApi,
        Self::RestResource,
        Self::RestMethod,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::GraphApi => write!(f, "graph_api"),
            Self::GraphSchema => write!(f, "graph_schema"),
            Self::ApiKey => write!(f, "api_key"),
            Self::DataSource => write!(f, "data_source"),
            Self::Role => write!(f, "role"),
            Self::Resolver => write!(f, "resolver"),
            Self::Function => write!(f, "function"),
            Self::Layer => write!(f, "layer"),
            Self::RestApi => write!(f, "rest_api"),
            Self::RestResource => write!(f, "rest_resource"),
            Self::RestMethod => write!(f, "rest_method"),
        }
    }
}

// ============================================================================
// Attribute references and configuration values
// ============================================================================

/// Placeholder for output `attribute` of resource `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrRef {
    pub resource: String,
    pub attribute: String,
}

impl AttrRef {
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// Parse `resource.attribute`. Resource names may contain dots; the last
    /// dot separates the attribute.
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        match s.rsplit_once('.') {
            Some((resource, attribute)) if !resource.is_empty() && !attribute.is_empty() => {
                Ok(Self::new(resource, attribute))
            }
            _ => Err(format!(
                "invalid reference '{}': expected <resource>.<attribute>",
                s
            )),
        }
    }
}

impl fmt::Display for AttrRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

/// Shorthand for [`AttrRef::new`], usable anywhere a config value is expected.
pub fn reference(resource: impl Into<String>, attribute: impl Into<String>) -> ConfigValue {
    ConfigValue::Ref(AttrRef::new(resource, attribute))
}

/// One piece of an interpolated string.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Ref(AttrRef),
}

/// A configuration value: literal, reference, or a structure of them.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Whole value is another resource's output
    Ref(AttrRef),
    /// String with embedded references
    Template(Vec<TemplatePart>),
    List(Vec<ConfigValue>),
    Map(IndexMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Literal string content, if this is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Build a map value from key/value pairs.
    pub fn map<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ConfigValue)>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<AttrRef> for ConfigValue {
    fn from(r: AttrRef) -> Self {
        Self::Ref(r)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(items: Vec<ConfigValue>) -> Self {
        Self::List(items)
    }
}

/// Build a [`ConfigMap`] from key/value pairs.
pub fn config_map<K, I>(entries: I) -> ConfigMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, ConfigValue)>,
{
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

// ============================================================================
// Resources
// ============================================================================

/// Lifecycle state of a resource within one apply/destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Pending,
    Resolving,
    Creating,
    Created,
    Failed,
    Deleting,
    Deleted,
    DeleteFailed,
}

impl ResourceStatus {
    /// Whether the resource exists at the provider.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::DeleteFailed)
    }

    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Pending, Resolving)
                // never started: a sibling failed first
                | (Resolving, Pending)
                | (Resolving, Creating)
                | (Resolving, Failed)
                | (Creating, Created)
                | (Creating, Failed)
                | (Created, Deleting)
                | (DeleteFailed, Deleting)
                | (Deleting, Deleted)
                | (Deleting, DeleteFailed)
                | (Deleted, Pending)
                | (Failed, Pending)
        )
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Resolving => write!(f, "RESOLVING"),
            Self::Creating => write!(f, "CREATING"),
            Self::Created => write!(f, "CREATED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Deleting => write!(f, "DELETING"),
            Self::Deleted => write!(f, "DELETED"),
            Self::DeleteFailed => write!(f, "DELETE_FAILED"),
        }
    }
}

/// A single infrastructure object owned by a stack.
#[derive(Debug, Clone)]
pub struct Resource {
    pub name: String,
    pub kind: ResourceKind,
    pub config: ConfigMap,
    pub outputs: Outputs,
    pub status: ResourceStatus,
    /// BLAKE3 of the resolved configuration, set once created
    pub config_hash: Option<String>,
    pub applied_at: Option<String>,
}

impl Resource {
    pub fn new(name: impl Into<String>, kind: ResourceKind, config: ConfigMap) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            outputs: Outputs::new(),
            status: ResourceStatus::Pending,
            config_hash: None,
            applied_at: None,
        }
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Execution policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Maximum concurrent provider calls within one level
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Timeout for each provider call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Write the provenance event log
    #[serde(default = "default_true")]
    pub tripwire: bool,

    /// Persist outputs to the state lock after deploy/destroy
    #[serde(default = "default_true")]
    pub lock_file: bool,
}

impl Policy {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout_secs(),
            tripwire: true,
            lock_file: true,
        }
    }
}

fn default_concurrency() -> usize {
    4
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Plan
// ============================================================================

/// Where a dependency edge came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeOrigin {
    /// Declared by the author (`depends_on`, `dependsOnSchema`)
    Explicit,
    /// Derived from an attribute reference
    Reference,
    Both,
}

impl EdgeOrigin {
    pub fn merge(self, other: EdgeOrigin) -> EdgeOrigin {
        if self == other {
            self
        } else {
            EdgeOrigin::Both
        }
    }
}

impl fmt::Display for EdgeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Reference => write!(f, "reference"),
            Self::Both => write!(f, "explicit+reference"),
        }
    }
}

/// `dependent` is materialized strictly after `dependency`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
    pub origin: EdgeOrigin,
}

/// Action to take on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAction {
    Create,
    Destroy,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Destroy => write!(f, "DESTROY"),
        }
    }
}

/// A single planned change.
#[derive(Debug, Clone)]
pub struct PlannedChange {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub level: usize,
    pub action: PlanAction,
    pub description: String,
}

/// Full execution plan: leveled order plus the edges that produced it.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub name: String,
    /// Creation order; members of one level are independent
    pub levels: Vec<Vec<String>>,
    pub edges: Vec<DependencyEdge>,
    pub changes: Vec<PlannedChange>,
}

impl ExecutionPlan {
    /// Level index of a resource, if planned.
    pub fn level_of(&self, resource: &str) -> Option<usize> {
        self.levels
            .iter()
            .position(|level| level.iter().any(|r| r == resource))
    }

    /// Teardown order: last level first.
    pub fn teardown_levels(&self) -> Vec<Vec<String>> {
        self.levels.iter().rev().cloned().collect()
    }

    pub fn resource_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }
}

// ============================================================================
// Provenance events
// ============================================================================

/// Provenance event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    ApplyStarted {
        stack: String,
        run_id: String,
        version: String,
    },
    ResourceStarted {
        stack: String,
        resource: String,
        action: String,
    },
    ResourceCreated {
        stack: String,
        resource: String,
        duration_seconds: f64,
        hash: String,
    },
    ResourceFailed {
        stack: String,
        resource: String,
        error: String,
    },
    RollbackStarted {
        stack: String,
        run_id: String,
        resources: Vec<String>,
    },
    ResourceDeleted {
        stack: String,
        resource: String,
        duration_seconds: f64,
    },
    DeleteFailed {
        stack: String,
        resource: String,
        error: String,
    },
    ApplyCompleted {
        stack: String,
        run_id: String,
        resources_created: u32,
        resources_failed: u32,
        total_seconds: f64,
    },
    DestroyCompleted {
        stack: String,
        run_id: String,
        resources_deleted: u32,
        resources_surviving: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

// ============================================================================
// State lock
// ============================================================================

/// Persisted record of what a stack left live at the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackLock {
    /// Schema version
    pub schema: String,

    /// Stack name
    pub stack: String,

    /// When the lock was generated
    pub generated_at: String,

    /// Generator version string
    pub generator: String,

    /// Composite BLAKE3 over every resource's config hash
    #[serde(default)]
    pub digest: String,

    /// Live resources in creation order
    pub resources: IndexMap<String, ResourceLock>,
}

/// Per-resource lock entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLock {
    pub kind: ResourceKind,

    pub status: ResourceStatus,

    /// Creation level within the plan that produced it
    pub level: usize,

    #[serde(default)]
    pub applied_at: Option<String>,

    /// BLAKE3 of the resolved configuration
    #[serde(default)]
    pub config_hash: Option<String>,

    /// Live resources that must outlive this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default)]
    pub outputs: Outputs,
}

// ============================================================================
// Results
// ============================================================================

/// Result of a successful apply.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub stack: String,
    pub levels: usize,
    pub resources_created: u32,
    pub total_duration: std::time::Duration,
}

/// Result of a destroy that removed every live resource.
#[derive(Debug, Clone)]
pub struct DestroyResult {
    pub stack: String,
    pub resources_deleted: u32,
    pub total_duration: std::time::Duration,
}

// ============================================================================
// Value helpers
// ============================================================================

/// Render a JSON value for string interpolation.
pub fn json_value_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Convert a serde_yaml_ng::Value to a string for template resolution.
pub fn yaml_value_to_string(val: &serde_yaml_ng::Value) -> String {
    match val {
        serde_yaml_ng::Value::String(s) => s.clone(),
        serde_yaml_ng::Value::Number(n) => n.to_string(),
        serde_yaml_ng::Value::Bool(b) => b.to_string(),
        serde_yaml_ng::Value::Null => String::new(),
        other => format!("{:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sw001_stack_file_parse() {
        let yaml = r#"
version: "1.0"
name: events-stack
params:
  table_name: events
resources:
  events:
    kind: table
    config:
      name: events
      partitionKeyName: id
  eventsApi:
    kind: graph_api
    config:
      name: eventsApi
      authMode: API_KEY
    depends_on: [events]
policy:
  concurrency: 2
"#;
        let file: StackFile = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(file.name, "events-stack");
        assert_eq!(file.resources.len(), 2);
        assert_eq!(file.resources["events"].kind, ResourceKind::Table);
        assert_eq!(file.resources["eventsApi"].depends_on, vec!["events"]);
        assert_eq!(file.policy.concurrency, 2);
        assert_eq!(file.policy.timeout_secs, 300);
    }

    #[test]
    fn test_sw001_kind_display_roundtrips_serde() {
        for kind in ResourceKind::ALL {
            let yaml = serde_yaml_ng::to_string(&kind).unwrap();
            assert_eq!(yaml.trim(), kind.to_string());
        }
    }

    #[test]
    fn test_sw001_attr_ref_parse() {
        let r = AttrRef::parse("eventsApi.graphQlUrl").unwrap();
        assert_eq!(r.resource, "eventsApi");
        assert_eq!(r.attribute, "graphQlUrl");
        assert_eq!(r.to_string(), "eventsApi.graphQlUrl");

        let dotted = AttrRef::parse("api.v2.apiId").unwrap();
        assert_eq!(dotted.resource, "api.v2");

        assert!(AttrRef::parse("noattr").is_err());
        assert!(AttrRef::parse(".x").is_err());
        assert!(AttrRef::parse("x.").is_err());
    }

    #[test]
    fn test_sw001_status_transitions() {
        use ResourceStatus::*;
        assert!(Pending.can_transition_to(Resolving));
        assert!(Resolving.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Created));
        assert!(Creating.can_transition_to(Failed));
        assert!(Created.can_transition_to(Deleting));
        assert!(Deleting.can_transition_to(DeleteFailed));
        assert!(DeleteFailed.can_transition_to(Deleting));
        assert!(!Pending.can_transition_to(Created));
        assert!(!Created.can_transition_to(Creating));
        assert!(!Deleted.can_transition_to(Deleting));
    }

    #[test]
    fn test_sw001_status_is_live() {
        assert!(ResourceStatus::Created.is_live());
        assert!(ResourceStatus::DeleteFailed.is_live());
        assert!(!ResourceStatus::Failed.is_live());
        assert!(!ResourceStatus::Deleted.is_live());
    }

    #[test]
    fn test_sw001_policy_defaults() {
        let p = Policy::default();
        assert_eq!(p.concurrency, 4);
        assert_eq!(p.timeout(), std::time::Duration::from_secs(300));
        assert!(p.tripwire);
        assert!(p.lock_file);
    }

    #[test]
    fn test_sw001_edge_origin_merge() {
        assert_eq!(
            EdgeOrigin::Explicit.merge(EdgeOrigin::Reference),
            EdgeOrigin::Both
        );
        assert_eq!(
            EdgeOrigin::Reference.merge(EdgeOrigin::Reference),
            EdgeOrigin::Reference
        );
    }

    #[test]
    fn test_sw001_provenance_event_serde() {
        let event = ProvenanceEvent::ApplyStarted {
            stack: "events".to_string(),
            run_id: "r-abc".to_string(),
            version: "0.3.0".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"apply_started\""));
        assert!(json.contains("\"run_id\":\"r-abc\""));
    }

    #[test]
    fn test_sw001_json_value_to_string() {
        assert_eq!(json_value_to_string(&serde_json::json!("x")), "x");
        assert_eq!(json_value_to_string(&serde_json::json!(3)), "3");
        assert_eq!(json_value_to_string(&serde_json::Value::Null), "");
        assert_eq!(json_value_to_string(&serde_json::json!(["a"])), "[\"a\"]");
    }

    #[test]
    fn test_sw001_plan_helpers() {
        let plan = ExecutionPlan {
            name: "s".to_string(),
            levels: vec![vec!["a".into(), "b".into()], vec!["c".into()]],
            edges: vec![],
            changes: vec![],
        };
        assert_eq!(plan.level_of("c"), Some(1));
        assert_eq!(plan.level_of("zzz"), None);
        assert_eq!(plan.resource_count(), 3);
        assert_eq!(plan.teardown_levels()[0], vec!["c".to_string()]);
    }
}
