//! SW-002: YAML parsing, validation and stack construction.
//!
//! Parses stack.yaml and validates structural constraints:
//! - Version must be "1.0"
//! - Required config keys per resource kind
//! - depends_on and reference targets must exist
//! - Referenced attributes must be outputs of the target kind
//! - Enumerated values (key types, billing modes, HTTP methods, ...)

use super::error::StackError;
use super::resolver;
use super::stack::Stack;
use super::types::*;
use crate::resources::{self, apigateway, appsync, dynamodb, lambda};
use std::path::Path;

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

fn invalid(errors: &mut Vec<ValidationError>, message: String) {
    errors.push(ValidationError { message });
}

/// Parse a stack.yaml file from disk.
pub fn parse_stack_file(path: &Path) -> Result<StackFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_stack(&content)
}

/// Parse a stack.yaml from a string.
pub fn parse_stack(yaml: &str) -> Result<StackFile, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Convert the raw YAML config of one resource, substituting params.
pub fn resource_config(file: &StackFile, decl: &ResourceDecl) -> Result<ConfigMap, String> {
    let mut config = ConfigMap::new();
    for (key, value) in &decl.config {
        let parsed =
            resolver::from_yaml(value, &file.params).map_err(|e| format!("{}: {}", key, e))?;
        config.insert(key.clone(), parsed);
    }
    Ok(config)
}

/// Validate a parsed stack file. Returns a list of errors (empty = valid).
pub fn validate_stack(file: &StackFile) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if file.version != "1.0" {
        invalid(
            &mut errors,
            format!("version must be \"1.0\", got \"{}\"", file.version),
        );
    }

    if file.name.trim().is_empty() {
        invalid(&mut errors, "name must not be empty".to_string());
    }

    if file.policy.concurrency == 0 {
        invalid(&mut errors, "policy.concurrency must be at least 1".to_string());
    }
    if file.policy.timeout_secs == 0 {
        invalid(&mut errors, "policy.timeout_secs must be at least 1".to_string());
    }

    for (id, decl) in &file.resources {
        for dep in &decl.depends_on {
            if dep == id {
                invalid(&mut errors, format!("resource '{}' depends on itself", id));
            } else if !file.resources.contains_key(dep) {
                invalid(
                    &mut errors,
                    format!("resource '{}' depends on unknown resource '{}'", id, dep),
                );
            }
        }

        let config = match resource_config(file, decl) {
            Ok(c) => c,
            Err(e) => {
                invalid(&mut errors, format!("resource '{}': {}", id, e));
                continue;
            }
        };

        let schema = resources::schema(decl.kind);
        for key in schema.required {
            if !config.contains_key(*key) {
                invalid(
                    &mut errors,
                    format!("resource '{}' ({}) has no {}", id, decl.kind, key),
                );
            }
        }

        for reference in resolver::config_references(&config) {
            validate_reference(file, id, reference, &mut errors);
        }

        validate_kind_values(file, id, decl.kind, &config, &mut errors);
    }

    errors
}

fn validate_reference(
    file: &StackFile,
    id: &str,
    reference: &AttrRef,
    errors: &mut Vec<ValidationError>,
) {
    match file.resources.get(&reference.resource) {
        None => invalid(
            errors,
            format!(
                "resource '{}' references unknown resource '{}'",
                id, reference.resource
            ),
        ),
        Some(target) => {
            if !resources::schema(target.kind).declares_output(&reference.attribute) {
                invalid(
                    errors,
                    format!(
                        "resource '{}' references '{}', but {} has no output '{}'",
                        id, reference, target.kind, reference.attribute
                    ),
                );
            }
        }
    }
}

fn validate_kind_values(
    file: &StackFile,
    id: &str,
    kind: ResourceKind,
    config: &ConfigMap,
    errors: &mut Vec<ValidationError>,
) {
    match kind {
        ResourceKind::Table => {
            one_of(id, config, "partitionKeyType", dynamodb::KEY_TYPES, errors);
            one_of(id, config, "billingMode", dynamodb::BILLING_MODES, errors);
        }
        ResourceKind::GraphApi => one_of(id, config, "authMode", appsync::AUTH_MODES, errors),
        ResourceKind::RestMethod => {
            one_of(id, config, "httpMethod", apigateway::HTTP_METHODS, errors)
        }
        ResourceKind::Function => {
            if let Some(memory) = config.get("memoryMb").and_then(ConfigValue::as_int) {
                if !lambda::MEMORY_MB.contains(&memory) {
                    invalid(
                        errors,
                        format!(
                            "resource '{}' memoryMb {} out of range {}..={}",
                            id,
                            memory,
                            lambda::MEMORY_MB.start(),
                            lambda::MEMORY_MB.end()
                        ),
                    );
                }
            }
        }
        ResourceKind::Resolver => match config.get("dependsOnSchema") {
            None => {}
            Some(ConfigValue::Str(_)) | Some(ConfigValue::List(_)) => {
                for schema in appsync::schema_dependencies(config) {
                    match file.resources.get(&schema) {
                        Some(decl) if decl.kind == ResourceKind::GraphSchema => {}
                        Some(decl) => invalid(
                            errors,
                            format!(
                                "resource '{}' dependsOnSchema '{}' is a {}, not a graph_schema",
                                id, schema, decl.kind
                            ),
                        ),
                        None => invalid(
                            errors,
                            format!(
                                "resource '{}' dependsOnSchema names unknown resource '{}'",
                                id, schema
                            ),
                        ),
                    }
                }
            }
            Some(_) => invalid(
                errors,
                format!(
                    "resource '{}' dependsOnSchema must be a resource name",
                    id
                ),
            ),
        },
        _ => {}
    }
}

/// Literal string values must be one of `allowed`; references pass.
fn one_of(
    id: &str,
    config: &ConfigMap,
    key: &str,
    allowed: &[&str],
    errors: &mut Vec<ValidationError>,
) {
    if let Some(value) = config.get(key).and_then(ConfigValue::as_str) {
        if !allowed.contains(&value) {
            invalid(
                errors,
                format!(
                    "resource '{}' has invalid {} '{}' (expected one of {})",
                    id,
                    key,
                    value,
                    allowed.join(", ")
                ),
            );
        }
    }
}

/// Build a stack from a parsed (and validated) stack file.
pub fn build_stack(file: &StackFile) -> Result<Stack, StackError> {
    let mut stack = Stack::new(file.name.as_str());
    for (id, decl) in &file.resources {
        let config = resource_config(file, decl)
            .map_err(|e| StackError::Invalid(format!("resource '{}': {}", id, e)))?;
        stack.add_resource(id, decl.kind, config)?;
    }
    for (id, decl) in &file.resources {
        for dep in &decl.depends_on {
            stack.add_explicit_dependency(id, dep)?;
        }
    }
    Ok(stack)
}

/// Parse, validate and build in one step.
pub fn load_stack(path: &Path) -> Result<(StackFile, Stack), String> {
    let file = parse_stack_file(path)?;
    let errors = validate_stack(&file);
    if !errors.is_empty() {
        let lines: Vec<String> = errors.iter().map(|e| format!("  - {}", e)).collect();
        return Err(format!(
            "{} validation error(s) in {}:\n{}",
            errors.len(),
            path.display(),
            lines.join("\n")
        ));
    }
    let stack = build_stack(&file).map_err(|e| e.to_string())?;
    Ok((file, stack))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENTS: &str = r#"
version: "1.0"
name: events-stack
params:
  table_name: events
resources:
  eventsTable:
    kind: table
    config:
      name: "{{params.table_name}}"
      partitionKeyName: id
      partitionKeyType: S
      billingMode: PAY_PER_REQUEST
      streamEnabled: true
  eventsApi:
    kind: graph_api
    config:
      name: eventsApi
      authMode: API_KEY
  eventsSchema:
    kind: graph_schema
    config:
      apiId: { ref: eventsApi.apiId }
      schemaDocument: |
        type events { id: ID! }
  getEvent:
    kind: resolver
    config:
      apiId: "{{resources.eventsApi.apiId}}"
      typeName: Query
      fieldName: getEvent
      dataSourceName: events
      requestTemplate: '{ "operation": "GetItem" }'
      responseTemplate: $util.toJson($ctx.result)
      dependsOnSchema: eventsSchema
"#;

    fn errors_of(yaml: &str) -> Vec<String> {
        let file = parse_stack(yaml).unwrap();
        validate_stack(&file)
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_sw002_valid_stack() {
        let errors = errors_of(EVENTS);
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn test_sw002_build_substitutes_params_and_refs() {
        let file = parse_stack(EVENTS).unwrap();
        let stack = build_stack(&file).unwrap();
        assert_eq!(stack.name(), "events-stack");
        let table = stack.resource("eventsTable").unwrap();
        assert_eq!(table.config["name"], ConfigValue::Str("events".into()));
        let schema = stack.resource("eventsSchema").unwrap();
        assert_eq!(
            schema.config["apiId"],
            ConfigValue::Ref(AttrRef::new("eventsApi", "apiId"))
        );
        let plan = stack.plan().unwrap();
        assert_eq!(
            plan.levels,
            vec![
                vec!["eventsApi".to_string(), "eventsTable".to_string()],
                vec!["eventsSchema".to_string()],
                vec!["getEvent".to_string()],
            ]
        );
    }

    #[test]
    fn test_sw002_bad_version_and_name() {
        let errors = errors_of("version: \"2.0\"\nname: \"\"\n");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("version must be"));
        assert!(errors[1].contains("name must not be empty"));
    }

    #[test]
    fn test_sw002_missing_required_key() {
        let errors = errors_of(
            r#"
version: "1.0"
name: s
resources:
  role:
    kind: role
    config:
      trustedPrincipal: appsync.amazonaws.com
"#,
        );
        assert_eq!(errors, vec!["resource 'role' (role) has no managedPolicyNames"]);
    }

    #[test]
    fn test_sw002_reference_checks() {
        let errors = errors_of(
            r#"
version: "1.0"
name: s
resources:
  key:
    kind: api_key
    config:
      apiId: { ref: api.apiId }
  key2:
    kind: api_key
    config:
      apiId: { ref: key.tableArn }
"#,
        );
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("unknown resource 'api'"));
        assert!(errors[1].contains("api_key has no output 'tableArn'"));
    }

    #[test]
    fn test_sw002_enumerated_values() {
        let errors = errors_of(
            r#"
version: "1.0"
name: s
resources:
  t:
    kind: table
    config:
      name: t
      partitionKeyName: id
      partitionKeyType: X
      billingMode: ON_DEMAND
      streamEnabled: false
  f:
    kind: function
    config:
      name: f
      runtimeConfig: python3.8
      codeLocation: ./src
      handlerName: main.handler
      memoryMb: 64
      envVars: {}
      layers: []
"#,
        );
        assert_eq!(errors.len(), 3, "{:?}", errors);
        assert!(errors[0].contains("partitionKeyType 'X'"));
        assert!(errors[1].contains("billingMode 'ON_DEMAND'"));
        assert!(errors[2].contains("memoryMb 64 out of range 128..=10240"));
    }

    #[test]
    fn test_sw002_depends_on_checks() {
        let errors = errors_of(
            r#"
version: "1.0"
name: s
resources:
  a:
    kind: layer
    config: { name: a, codeLocation: ./a, compatibleRuntimes: [python3.8] }
    depends_on: [a, ghost]
"#,
        );
        assert_eq!(
            errors,
            vec![
                "resource 'a' depends on itself",
                "resource 'a' depends on unknown resource 'ghost'"
            ]
        );
    }

    #[test]
    fn test_sw002_depends_on_schema_must_name_schema() {
        let yaml = EVENTS.replace("dependsOnSchema: eventsSchema", "dependsOnSchema: eventsApi");
        let errors = errors_of(&yaml);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("is a graph_api, not a graph_schema"));
    }

    #[test]
    fn test_sw002_bad_template_reported() {
        let yaml = EVENTS.replace("{{params.table_name}}", "{{params.missing}}");
        let errors = errors_of(&yaml);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unknown param: missing"));

        let file = parse_stack(&yaml).unwrap();
        let err = build_stack(&file).unwrap_err();
        assert!(matches!(err, StackError::Invalid(_)));
    }

    #[test]
    fn test_sw002_load_stack_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.yaml");
        std::fs::write(&path, EVENTS).unwrap();
        let (file, stack) = load_stack(&path).unwrap();
        assert_eq!(file.resources.len(), 4);
        assert_eq!(stack.resources().len(), 4);

        std::fs::write(&path, "version: \"1.0\"\nname: \"\"\n").unwrap();
        let err = load_stack(&path).unwrap_err();
        assert!(err.contains("1 validation error(s)"));
    }

    #[test]
    fn test_sw002_yaml_parse_error() {
        let err = parse_stack("version: [").unwrap_err();
        assert!(err.contains("YAML parse error"));
    }
}
