//! SW-023: Role handler.

use super::{field, short_id, KindSchema, SimEnv};
use crate::core::types::{ConfigMap, Outputs, ResourceKind};

pub const ROLE: KindSchema = KindSchema {
    kind: ResourceKind::Role,
    required: &["trustedPrincipal", "managedPolicyNames"],
    outputs: &["roleArn"],
    optional_outputs: &[],
};

pub fn simulate_role(name: &str, env: &SimEnv) -> Outputs {
    // Generated role names carry a random-looking suffix
    let arn = format!(
        "arn:aws:iam::{}:role/{}-{}",
        env.account_id,
        name,
        short_id(name, 12).to_uppercase()
    );
    Outputs::from([("roleArn".to_string(), serde_json::Value::String(arn))])
}

pub fn describe_role(config: &ConfigMap) -> String {
    format!(
        "create role assumable by {} with {}",
        field(config, "trustedPrincipal"),
        field(config, "managedPolicyNames")
    )
}
