//! Policy and policy type definitions

use docpolicy_core::{PolicyId, PolicyTypeId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Binding name of the builtin metadata policy handler
pub const METADATA_POLICY_HANDLER: &str = "metadata_policy";

/// Binding name of the builtin tag policy handler
pub const TAG_POLICY_HANDLER: &str = "tag_policy";

/// A configured mutation rule attached to document collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy identifier
    pub id: PolicyId,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Description of what this policy does
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Policy type this policy belongs to
    pub type_id: PolicyTypeId,

    /// Priority, higher wins during resolution
    #[serde(default)]
    pub priority: i32,

    /// Handler specific payload, validated by the policy type schema
    #[serde(default)]
    pub details: Value,
}

impl Policy {
    /// Create a policy with the given details
    pub fn new(id: PolicyId, type_id: PolicyTypeId, priority: i32, details: Value) -> Self {
        Self {
            id,
            name: format!("policy-{}", id),
            description: None,
            type_id,
            priority,
            details,
        }
    }

    /// Load a policy from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

/// Schema and handler binding shared by all policies of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyType {
    /// Policy type identifier
    pub id: PolicyTypeId,

    /// Short, stable name
    pub short_name: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON schema that `Policy::details` must satisfy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<Value>,

    /// Registry binding of the handler that applies these policies
    pub handler: String,
}

impl PolicyType {
    /// Builtin metadata policy type
    pub fn metadata_policy(id: PolicyTypeId) -> Self {
        Self {
            id,
            short_name: "MetadataPolicy".to_string(),
            name: "Metadata Policy".to_string(),
            description: Some("Sets or adds document metadata field values".to_string()),
            definition: Some(field_actions_schema()),
            handler: METADATA_POLICY_HANDLER.to_string(),
        }
    }

    /// Builtin tag policy type
    pub fn tag_policy(id: PolicyTypeId) -> Self {
        Self {
            id,
            short_name: "TagPolicy".to_string(),
            name: "Tag Policy".to_string(),
            description: Some("Tags documents with classification values".to_string()),
            definition: Some(field_actions_schema()),
            handler: TAG_POLICY_HANDLER.to_string(),
        }
    }
}

/// JSON schema for a `fieldActions` payload
fn field_actions_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["fieldActions"],
        "properties": {
            "fieldActions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["name", "action", "value"],
                    "properties": {
                        "name": { "type": "string", "minLength": 1 },
                        "action": {
                            "type": "string",
                            "enum": ["SET_FIELD_VALUE", "ADD_FIELD_VALUE"]
                        },
                        "value": { "type": "string" }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_deserialization() {
        let yaml = r#"
id: 4
name: mark-finance
type_id: 1
priority: 10
details:
  fieldActions:
    - name: department
      action: SET_FIELD_VALUE
      value: finance
"#;

        let policy = Policy::from_yaml(yaml).unwrap();
        assert_eq!(policy.id, 4);
        assert_eq!(policy.priority, 10);
        assert_eq!(policy.details["fieldActions"][0]["value"], "finance");
    }

    #[test]
    fn test_priority_defaults_to_zero() {
        let policy = Policy::from_yaml("id: 1\ntype_id: 2\n").unwrap();
        assert_eq!(policy.priority, 0);
        assert!(policy.details.is_null());
    }

    #[test]
    fn test_builtin_types_bind_distinct_handlers() {
        let metadata = PolicyType::metadata_policy(1);
        let tag = PolicyType::tag_policy(2);

        assert_eq!(metadata.handler, METADATA_POLICY_HANDLER);
        assert_eq!(tag.handler, TAG_POLICY_HANDLER);
        assert_eq!(metadata.definition, tag.definition);
    }
}
