//! SW-021: Table handler.

use super::{field, short_id, str_field, KindSchema, SimEnv};
use crate::core::types::{ConfigMap, ConfigValue, Outputs, ResourceKind};
use crate::provider::ResolvedConfig;

pub const TABLE: KindSchema = KindSchema {
    kind: ResourceKind::Table,
    required: &[
        "name",
        "partitionKeyName",
        "partitionKeyType",
        "billingMode",
        "streamEnabled",
    ],
    outputs: &["tableArn", "tableName"],
    optional_outputs: &["streamArn"],
};

pub const KEY_TYPES: &[&str] = &["S", "N", "B"];

pub const BILLING_MODES: &[&str] = &["PAY_PER_REQUEST", "PROVISIONED"];

/// Streams are on for `true` or any view type string (e.g. `NEW_IMAGE`).
fn stream_enabled(config: &ResolvedConfig) -> bool {
    match config.get("streamEnabled") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            !s.is_empty() && !s.eq_ignore_ascii_case("false") && !s.eq_ignore_ascii_case("none")
        }
        _ => false,
    }
}

pub fn simulate_table(name: &str, config: &ResolvedConfig, env: &SimEnv) -> Outputs {
    let table = str_field(config, "name", name);
    let arn = format!(
        "arn:aws:dynamodb:{}:{}:table/{}",
        env.region, env.account_id, table
    );
    let mut outputs = Outputs::new();
    if stream_enabled(config) {
        outputs.insert(
            "streamArn".to_string(),
            serde_json::Value::String(format!("{}/stream/{}", arn, short_id(table, 16))),
        );
    }
    outputs.insert("tableArn".to_string(), serde_json::Value::String(arn));
    outputs.insert(
        "tableName".to_string(),
        serde_json::Value::String(table.to_string()),
    );
    outputs
}

pub fn describe_table(config: &ConfigMap) -> String {
    let stream = match config.get("streamEnabled") {
        Some(ConfigValue::Bool(false)) | None => String::new(),
        Some(_) => ", stream".to_string(),
    };
    format!(
        "create table {} ({}:{}, {}{})",
        field(config, "name"),
        field(config, "partitionKeyName"),
        field(config, "partitionKeyType"),
        field(config, "billingMode"),
        stream
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::config_map;

    #[test]
    fn test_sw021_simulate_with_stream() {
        let mut config = ResolvedConfig::new();
        config.insert("name".into(), serde_json::json!("events"));
        config.insert("streamEnabled".into(), serde_json::json!("NEW_IMAGE"));
        let out = simulate_table("eventsTable", &config, &SimEnv::default());
        assert_eq!(
            out["tableArn"],
            serde_json::json!("arn:aws:dynamodb:us-east-1:123456789012:table/events")
        );
        assert_eq!(out["tableName"], serde_json::json!("events"));
        assert!(out["streamArn"]
            .as_str()
            .unwrap()
            .starts_with("arn:aws:dynamodb:us-east-1:123456789012:table/events/stream/"));
    }

    #[test]
    fn test_sw021_simulate_without_stream() {
        let mut config = ResolvedConfig::new();
        config.insert("streamEnabled".into(), serde_json::json!(false));
        let out = simulate_table("t", &config, &SimEnv::default());
        assert_eq!(out["tableName"], serde_json::json!("t"));
        assert!(!out.contains_key("streamArn"));
    }

    #[test]
    fn test_sw021_describe() {
        let config = config_map([
            ("name", ConfigValue::from("events")),
            ("partitionKeyName", ConfigValue::from("id")),
            ("partitionKeyType", ConfigValue::from("S")),
            ("billingMode", ConfigValue::from("PAY_PER_REQUEST")),
            ("streamEnabled", ConfigValue::from("NEW_IMAGE")),
        ]);
        assert_eq!(
            describe_table(&config),
            "create table events (id:S, PAY_PER_REQUEST, stream)"
        );
    }
}
