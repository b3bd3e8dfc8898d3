//! SW-024: Function and layer handlers.

use super::{field, int_field, str_field, KindSchema, SimEnv};
use crate::core::types::{ConfigMap, Outputs, ResourceKind};
use crate::provider::ResolvedConfig;
use std::ops::RangeInclusive;

pub const FUNCTION: KindSchema = KindSchema {
    kind: ResourceKind::Function,
    required: &[
        "name",
        "runtimeConfig",
        "codeLocation",
        "handlerName",
        "memoryMb",
        "envVars",
        "layers",
    ],
    outputs: &["functionArn", "functionName"],
    optional_outputs: &[],
};

pub const LAYER: KindSchema = KindSchema {
    kind: ResourceKind::Layer,
    required: &["name", "codeLocation", "compatibleRuntimes"],
    outputs: &["layerArn"],
    optional_outputs: &[],
};

pub const MEMORY_MB: RangeInclusive<i64> = 128..=10240;

pub fn simulate_function(name: &str, config: &ResolvedConfig, env: &SimEnv) -> Outputs {
    let function = str_field(config, "name", name);
    let arn = format!(
        "arn:aws:lambda:{}:{}:function:{}",
        env.region, env.account_id, function
    );
    Outputs::from([
        ("functionArn".to_string(), serde_json::Value::String(arn)),
        (
            "functionName".to_string(),
            serde_json::Value::String(function.to_string()),
        ),
    ])
}

pub fn simulate_layer(name: &str, config: &ResolvedConfig, env: &SimEnv) -> Outputs {
    let layer = str_field(config, "name", name);
    let arn = format!(
        "arn:aws:lambda:{}:{}:layer:{}:1",
        env.region, env.account_id, layer
    );
    Outputs::from([("layerArn".to_string(), serde_json::Value::String(arn))])
}

pub fn describe_function(config: &ConfigMap) -> String {
    let memory = int_field(config, "memoryMb")
        .map(|m| format!(", {} MB", m))
        .unwrap_or_default();
    format!(
        "create function {} ({}, handler {}{})",
        field(config, "name"),
        field(config, "runtimeConfig"),
        field(config, "handlerName"),
        memory
    )
}

pub fn describe_layer(config: &ConfigMap) -> String {
    format!(
        "publish layer {} from {}",
        field(config, "name"),
        field(config, "codeLocation")
    )
}
