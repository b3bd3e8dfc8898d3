//! Resource kind handlers — one entry per kind, grouped by service.
//!
//! Each handler provides:
//! 1. A schema: required config keys and produced outputs
//! 2. A plan description of the create action
//! 3. Deterministic simulated outputs (for the simulated provisioner)

pub mod apigateway;
pub mod appsync;
pub mod dynamodb;
pub mod iam;
pub mod lambda;

use crate::core::resolver;
use crate::core::types::{ConfigMap, ConfigValue, Outputs, Resource, ResourceKind};
use crate::provider::ResolvedConfig;

/// Static contract of one resource kind.
#[derive(Debug, Clone, Copy)]
pub struct KindSchema {
    pub kind: ResourceKind,
    /// Keys that must be present in the configuration
    pub required: &'static [&'static str],
    /// Outputs every successful create must return
    pub outputs: &'static [&'static str],
    /// Outputs that may be absent (e.g. a stream ARN when streams are off)
    pub optional_outputs: &'static [&'static str],
}

impl KindSchema {
    /// Whether `attribute` may be referenced on this kind.
    pub fn declares_output(&self, attribute: &str) -> bool {
        self.outputs.contains(&attribute) || self.optional_outputs.contains(&attribute)
    }
}

/// Look up the schema of a kind.
pub fn schema(kind: ResourceKind) -> &'static KindSchema {
    match kind {
        ResourceKind::Table => &dynamodb::TABLE,
        ResourceKind::GraphApi => &appsync::GRAPH_API,
        ResourceKind::GraphSchema => &appsync::GRAPH_SCHEMA,
        ResourceKind::ApiKey => &appsync::API_KEY,
        ResourceKind::DataSource => &appsync::DATA_SOURCE,
        ResourceKind::Resolver => &appsync::RESOLVER,
        ResourceKind::Role => &iam::ROLE,
        ResourceKind::Function => &lambda::FUNCTION,
        ResourceKind::Layer => &lambda::LAYER,
        ResourceKind::RestApi => &apigateway::REST_API,
        ResourceKind::RestResource => &apigateway::REST_RESOURCE,
        ResourceKind::RestMethod => &apigateway::REST_METHOD,
    }
}

/// Explicit dependencies a kind declares through its configuration.
pub fn declared_dependencies(resource: &Resource) -> Vec<String> {
    match resource.kind {
        ResourceKind::Resolver => appsync::schema_dependencies(&resource.config),
        _ => Vec::new(),
    }
}

/// Human-readable description of creating a resource.
pub fn describe(resource: &Resource) -> String {
    let name = resource.name.as_str();
    let config = &resource.config;
    let what = match resource.kind {
        ResourceKind::Table => dynamodb::describe_table(config),
        ResourceKind::GraphApi => appsync::describe_graph_api(config),
        ResourceKind::GraphSchema => appsync::describe_schema(config),
        ResourceKind::ApiKey => appsync::describe_api_key(config),
        ResourceKind::DataSource => appsync::describe_data_source(name, config),
        ResourceKind::Resolver => appsync::describe_resolver(config),
        ResourceKind::Role => iam::describe_role(config),
        ResourceKind::Function => lambda::describe_function(config),
        ResourceKind::Layer => lambda::describe_layer(config),
        ResourceKind::RestApi => apigateway::describe_rest_api(config),
        ResourceKind::RestResource => apigateway::describe_rest_resource(config),
        ResourceKind::RestMethod => apigateway::describe_rest_method(config),
    };
    format!("{}: {}", name, what)
}

/// Environment the simulated provider pretends to run in.
#[derive(Debug, Clone)]
pub struct SimEnv {
    pub region: String,
    pub account_id: String,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
        }
    }
}

/// Outputs a real provider would plausibly return for this create.
pub fn simulate_outputs(
    kind: ResourceKind,
    name: &str,
    config: &ResolvedConfig,
    env: &SimEnv,
) -> Outputs {
    match kind {
        ResourceKind::Table => dynamodb::simulate_table(name, config, env),
        ResourceKind::GraphApi => appsync::simulate_graph_api(name, env),
        ResourceKind::GraphSchema | ResourceKind::Resolver => Outputs::new(),
        ResourceKind::ApiKey => appsync::simulate_api_key(name, config),
        ResourceKind::DataSource => appsync::simulate_data_source(name, config),
        ResourceKind::Role => iam::simulate_role(name, env),
        ResourceKind::Function => lambda::simulate_function(name, config, env),
        ResourceKind::Layer => lambda::simulate_layer(name, config, env),
        ResourceKind::RestApi => apigateway::simulate_rest_api(name),
        ResourceKind::RestResource => apigateway::simulate_rest_resource(name, config),
        ResourceKind::RestMethod => Outputs::new(),
    }
}

/// Lowercase hex id derived from `seed`, `len` characters long.
pub(crate) fn short_id(seed: &str, len: usize) -> String {
    let hex = blake3::hash(seed.as_bytes()).to_hex();
    hex.as_str().chars().take(len).collect()
}

/// String field of a resolved config, or `fallback`.
pub(crate) fn str_field<'a>(config: &'a ResolvedConfig, key: &str, fallback: &'a str) -> &'a str {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
}

/// Plan-time preview of a config entry.
pub(crate) fn field(config: &ConfigMap, key: &str) -> String {
    config
        .get(key)
        .map(resolver::preview)
        .unwrap_or_else(|| "?".to_string())
}

/// Literal integer from config, if present and literal.
pub(crate) fn int_field(config: &ConfigMap, key: &str) -> Option<i64> {
    config.get(key).and_then(ConfigValue::as_int)
}
