//! SW-022: Graph API handlers — API, key, schema, data source, resolver.

use super::{field, short_id, str_field, KindSchema, SimEnv};
use crate::core::types::{ConfigMap, ConfigValue, Outputs, ResourceKind};
use crate::provider::ResolvedConfig;

pub const GRAPH_API: KindSchema = KindSchema {
    kind: ResourceKind::GraphApi,
    required: &["name", "authMode"],
    outputs: &["apiId", "graphQlUrl"],
    optional_outputs: &[],
};

pub const API_KEY: KindSchema = KindSchema {
    kind: ResourceKind::ApiKey,
    required: &["apiId"],
    outputs: &["apiKeyValue"],
    optional_outputs: &[],
};

pub const GRAPH_SCHEMA: KindSchema = KindSchema {
    kind: ResourceKind::GraphSchema,
    required: &["apiId", "schemaDocument"],
    outputs: &[],
    optional_outputs: &[],
};

pub const DATA_SOURCE: KindSchema = KindSchema {
    kind: ResourceKind::DataSource,
    required: &["apiId", "backingTableName", "region", "roleArn"],
    outputs: &["dataSourceName"],
    optional_outputs: &[],
};

pub const RESOLVER: KindSchema = KindSchema {
    kind: ResourceKind::Resolver,
    required: &[
        "apiId",
        "typeName",
        "fieldName",
        "dataSourceName",
        "requestTemplate",
        "responseTemplate",
        "dependsOnSchema",
    ],
    outputs: &[],
    optional_outputs: &[],
};

pub const AUTH_MODES: &[&str] = &[
    "API_KEY",
    "AWS_IAM",
    "AMAZON_COGNITO_USER_POOLS",
    "OPENID_CONNECT",
    "AWS_LAMBDA",
];

/// Schema resources named by a resolver's literal `dependsOnSchema`.
pub fn schema_dependencies(config: &ConfigMap) -> Vec<String> {
    match config.get("dependsOnSchema") {
        Some(ConfigValue::Str(name)) => vec![name.clone()],
        Some(ConfigValue::List(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

pub fn simulate_graph_api(name: &str, env: &SimEnv) -> Outputs {
    let api_id = short_id(&format!("graph-api/{}", name), 26);
    let url = format!(
        "https://{}.appsync-api.{}.amazonaws.com/graphql",
        api_id, env.region
    );
    Outputs::from([
        ("apiId".to_string(), serde_json::Value::String(api_id)),
        ("graphQlUrl".to_string(), serde_json::Value::String(url)),
    ])
}

pub fn simulate_api_key(name: &str, config: &ResolvedConfig) -> Outputs {
    let api_id = str_field(config, "apiId", "");
    let key = format!("da2-{}", short_id(&format!("{}/{}", api_id, name), 26));
    Outputs::from([("apiKeyValue".to_string(), serde_json::Value::String(key))])
}

pub fn simulate_data_source(name: &str, config: &ResolvedConfig) -> Outputs {
    let ds = str_field(config, "name", name);
    Outputs::from([(
        "dataSourceName".to_string(),
        serde_json::Value::String(ds.to_string()),
    )])
}

pub fn describe_graph_api(config: &ConfigMap) -> String {
    format!(
        "create graph api {} (auth {})",
        field(config, "name"),
        field(config, "authMode")
    )
}

pub fn describe_api_key(config: &ConfigMap) -> String {
    format!("create api key for {}", field(config, "apiId"))
}

pub fn describe_schema(config: &ConfigMap) -> String {
    let types = match config.get("schemaDocument") {
        Some(ConfigValue::Str(doc)) => count_type_definitions(doc),
        _ => 0,
    };
    format!(
        "register schema on {} ({} type definition(s))",
        field(config, "apiId"),
        types
    )
}

pub fn describe_data_source(name: &str, config: &ConfigMap) -> String {
    let ds = config
        .get("name")
        .and_then(ConfigValue::as_str)
        .unwrap_or(name);
    format!(
        "create data source {} -> table {}",
        ds,
        field(config, "backingTableName")
    )
}

pub fn describe_resolver(config: &ConfigMap) -> String {
    format!(
        "attach resolver {}.{} via {}",
        field(config, "typeName"),
        field(config, "fieldName"),
        field(config, "dataSourceName")
    )
}

/// Count `type`/`input` definitions in a schema document.
fn count_type_definitions(doc: &str) -> usize {
    doc.lines()
        .map(str::trim_start)
        .filter(|l| l.starts_with("type ") || l.starts_with("input "))
        .count()
}
