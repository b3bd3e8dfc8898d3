//! SW-025: REST gateway handlers — API, resource (path part), method.

use super::{field, short_id, str_field, KindSchema};
use crate::core::types::{ConfigMap, ConfigValue, Outputs, ResourceKind};
use crate::provider::ResolvedConfig;

pub const REST_API: KindSchema = KindSchema {
    kind: ResourceKind::RestApi,
    required: &["name", "handlerFunctionName"],
    outputs: &["restApiId", "rootResourceId"],
    optional_outputs: &[],
};

pub const REST_RESOURCE: KindSchema = KindSchema {
    kind: ResourceKind::RestResource,
    required: &["restApiId", "parentResourceId", "pathPart"],
    outputs: &["resourceId"],
    optional_outputs: &[],
};

pub const REST_METHOD: KindSchema = KindSchema {
    kind: ResourceKind::RestMethod,
    required: &[
        "restApiId",
        "resourceId",
        "httpMethod",
        "integrationTargetFunctionName",
        "integrationResponses",
    ],
    outputs: &[],
    optional_outputs: &[],
};

pub const HTTP_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "ANY",
];

pub fn simulate_rest_api(name: &str) -> Outputs {
    Outputs::from([
        (
            "restApiId".to_string(),
            serde_json::Value::String(short_id(&format!("rest-api/{}", name), 10)),
        ),
        (
            "rootResourceId".to_string(),
            serde_json::Value::String(short_id(&format!("rest-root/{}", name), 10)),
        ),
    ])
}

pub fn simulate_rest_resource(name: &str, config: &ResolvedConfig) -> Outputs {
    let api = str_field(config, "restApiId", "");
    Outputs::from([(
        "resourceId".to_string(),
        serde_json::Value::String(short_id(&format!("{}/{}", api, name), 6)),
    )])
}

pub fn describe_rest_api(config: &ConfigMap) -> String {
    format!(
        "create rest api {} backed by {}",
        field(config, "name"),
        field(config, "handlerFunctionName")
    )
}

pub fn describe_rest_resource(config: &ConfigMap) -> String {
    format!(
        "add path /{} under {}",
        field(config, "pathPart"),
        field(config, "parentResourceId")
    )
}

pub fn describe_rest_method(config: &ConfigMap) -> String {
    let responses = match config.get("integrationResponses") {
        Some(ConfigValue::List(items)) => items.len(),
        _ => 0,
    };
    format!(
        "add {} on {} -> {} ({} integration response(s))",
        field(config, "httpMethod"),
        field(config, "resourceId"),
        field(config, "integrationTargetFunctionName"),
        responses
    )
}
