//! SW-003: Template parsing and attribute reference resolution.
//!
//! Recognises `{{params.key}}` (substituted while loading) and
//! `{{resources.name.attribute}}` (kept as a reference) inside strings,
//! plus the `{ ref: "name.attribute" }` mapping form. References resolve
//! against the outputs recorded so far; resolving one whose target has not
//! been materialized is a scheduler bug, never a user error.

use super::error::{RollbackOutcome, StackError};
use super::types::*;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Outputs recorded so far, keyed by resource name.
pub type OutputTable = IndexMap<String, Outputs>;

const PARAMS_PREFIX: &str = "params.";
const RESOURCES_PREFIX: &str = "resources.";

/// Parse a string that may contain template markers.
///
/// Returns `Str` when no reference remains, `Ref` when the whole string is
/// a single reference, and `Template` otherwise.
pub fn parse_template(
    template: &str,
    params: &HashMap<String, serde_yaml_ng::Value>,
) -> Result<ConfigValue, String> {
    let mut parts: Vec<TemplatePart> = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        let close = rest[open..]
            .find("}}")
            .map(|c| open + c)
            .ok_or_else(|| format!("unclosed template in '{}'", template))?;
        push_text(&mut parts, &rest[..open]);
        let key = rest[open + 2..close].trim();

        if let Some(param_key) = key.strip_prefix(PARAMS_PREFIX) {
            let value = params
                .get(param_key)
                .map(yaml_value_to_string)
                .ok_or_else(|| format!("unknown param: {}", param_key))?;
            push_text(&mut parts, &value);
        } else if let Some(target) = key.strip_prefix(RESOURCES_PREFIX) {
            parts.push(TemplatePart::Ref(AttrRef::parse(target)?));
        } else {
            return Err(format!("unknown template variable: {}", key));
        }
        rest = &rest[close + 2..];
    }
    push_text(&mut parts, rest);

    Ok(match parts.as_slice() {
        [] => ConfigValue::Str(String::new()),
        [TemplatePart::Text(s)] => ConfigValue::Str(s.clone()),
        [TemplatePart::Ref(r)] => ConfigValue::Ref(r.clone()),
        _ => ConfigValue::Template(parts),
    })
}

fn push_text(parts: &mut Vec<TemplatePart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(TemplatePart::Text(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(TemplatePart::Text(text.to_string()));
    }
}

/// Convert a YAML value from a stack file into a config value.
pub fn from_yaml(
    value: &serde_yaml_ng::Value,
    params: &HashMap<String, serde_yaml_ng::Value>,
) -> Result<ConfigValue, String> {
    use serde_yaml_ng::Value;
    Ok(match value {
        Value::Null => ConfigValue::Null,
        Value::Bool(b) => ConfigValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ConfigValue::Int(i),
            None => ConfigValue::Float(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => parse_template(s, params)?,
        Value::Sequence(items) => ConfigValue::List(
            items
                .iter()
                .map(|v| from_yaml(v, params))
                .collect::<Result<_, _>>()?,
        ),
        Value::Mapping(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("ref") {
                    return Ok(ConfigValue::Ref(AttrRef::parse(target)?));
                }
            }
            let mut out = IndexMap::new();
            for (k, v) in map {
                out.insert(yaml_value_to_string(k), from_yaml(v, params)?);
            }
            ConfigValue::Map(out)
        }
        Value::Tagged(tagged) => from_yaml(&tagged.value, params)?,
    })
}

/// Collect every reference inside a value, depth-first.
pub fn collect_references<'a>(value: &'a ConfigValue, out: &mut Vec<&'a AttrRef>) {
    match value {
        ConfigValue::Ref(r) => out.push(r),
        ConfigValue::Template(parts) => {
            for part in parts {
                if let TemplatePart::Ref(r) = part {
                    out.push(r);
                }
            }
        }
        ConfigValue::List(items) => {
            for item in items {
                collect_references(item, out);
            }
        }
        ConfigValue::Map(map) => {
            for v in map.values() {
                collect_references(v, out);
            }
        }
        ConfigValue::Null
        | ConfigValue::Bool(_)
        | ConfigValue::Int(_)
        | ConfigValue::Float(_)
        | ConfigValue::Str(_) => {}
    }
}

/// All references in a resource configuration.
pub fn config_references(config: &ConfigMap) -> Vec<&AttrRef> {
    let mut refs = Vec::new();
    for value in config.values() {
        collect_references(value, &mut refs);
    }
    refs
}

/// Resolve one reference against recorded outputs.
pub fn resolve(
    owner: &str,
    reference: &AttrRef,
    outputs: &OutputTable,
) -> Result<serde_json::Value, StackError> {
    outputs
        .get(&reference.resource)
        .and_then(|o| o.get(&reference.attribute))
        .cloned()
        .ok_or_else(|| StackError::UnresolvedReference {
            resource: owner.to_string(),
            reference: reference.clone(),
            rollback: RollbackOutcome::NothingToRollBack,
        })
}

/// Resolve a value into concrete JSON.
pub fn resolve_value(
    owner: &str,
    value: &ConfigValue,
    outputs: &OutputTable,
) -> Result<serde_json::Value, StackError> {
    use serde_json::Value;
    Ok(match value {
        ConfigValue::Null => Value::Null,
        ConfigValue::Bool(b) => Value::Bool(*b),
        ConfigValue::Int(i) => Value::from(*i),
        ConfigValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ConfigValue::Str(s) => Value::String(s.clone()),
        ConfigValue::Ref(r) => resolve(owner, r, outputs)?,
        ConfigValue::Template(parts) => {
            let mut rendered = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(t) => rendered.push_str(t),
                    TemplatePart::Ref(r) => {
                        rendered.push_str(&json_value_to_string(&resolve(owner, r, outputs)?))
                    }
                }
            }
            Value::String(rendered)
        }
        ConfigValue::List(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_value(owner, v, outputs))
                .collect::<Result<_, _>>()?,
        ),
        ConfigValue::Map(map) => {
            let mut obj = serde_json::Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), resolve_value(owner, v, outputs)?);
            }
            Value::Object(obj)
        }
    })
}

/// Resolve a whole configuration mapping.
pub fn resolve_config(
    owner: &str,
    config: &ConfigMap,
    outputs: &OutputTable,
) -> Result<serde_json::Map<String, serde_json::Value>, StackError> {
    let mut resolved = serde_json::Map::new();
    for (key, value) in config {
        resolved.insert(key.clone(), resolve_value(owner, value, outputs)?);
    }
    Ok(resolved)
}

/// Plan-time rendering: references shown as `<name.attribute>`.
pub fn preview(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Null => "null".to_string(),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::Int(i) => i.to_string(),
        ConfigValue::Float(f) => f.to_string(),
        ConfigValue::Str(s) => s.clone(),
        ConfigValue::Ref(r) => format!("<{}>", r),
        ConfigValue::Template(parts) => parts
            .iter()
            .map(|p| match p {
                TemplatePart::Text(t) => t.clone(),
                TemplatePart::Ref(r) => format!("<{}>", r),
            })
            .collect(),
        ConfigValue::List(items) => format!(
            "[{}]",
            items.iter().map(preview).collect::<Vec<_>>().join(", ")
        ),
        ConfigValue::Map(map) => format!(
            "{{{}}}",
            map.keys().cloned().collect::<Vec<_>>().join(", ")
        ),
    }
}
