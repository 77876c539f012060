//! Field action definitions

use docpolicy_core::{Document, Result};
use serde::{Deserialize, Serialize};

use crate::Policy;

/// How a field action changes a document field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldActionKind {
    /// Clear the field, then set the value
    SetFieldValue,
    /// Append the value, keeping existing values
    AddFieldValue,
}

/// The atomic unit of document mutation used by metadata and tag policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAction {
    /// Field to change
    pub name: String,

    /// Kind of change
    pub action: FieldActionKind,

    /// Value written to the field
    pub value: String,
}

impl FieldAction {
    /// A `SET_FIELD_VALUE` action
    pub fn set(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: FieldActionKind::SetFieldValue,
            value: value.into(),
        }
    }

    /// An `ADD_FIELD_VALUE` action
    pub fn add(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action: FieldActionKind::AddFieldValue,
            value: value.into(),
        }
    }

    /// Apply this action to a document
    pub fn apply(&self, document: &mut Document) {
        match self.action {
            FieldActionKind::SetFieldValue => document.set_field(&self.name, &self.value),
            FieldActionKind::AddFieldValue => document.add_field_value(&self.name, &self.value),
        }
    }
}

/// Policy details made of an ordered list of field actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldActionDetails {
    pub field_actions: Vec<FieldAction>,
}

impl FieldActionDetails {
    /// Parse the details of a policy, failing with `PolicyDetailsParse`
    pub fn parse(policy: &Policy) -> Result<Self> {
        serde_json::from_value(policy.details.clone())
            .map_err(|e| docpolicy_core::Error::policy_details(policy.id, e.to_string()))
    }
}

/// Apply field actions in order
pub fn apply_field_actions(document: &mut Document, actions: &[FieldAction]) {
    for action in actions {
        action.apply(document);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn topic_document() -> Document {
        Document::new("doc")
            .with_field("topic", "a")
            .with_field("topic", "b")
    }

    #[test]
    fn test_set_field_value_clears_existing() {
        let mut doc = topic_document();
        apply_field_actions(&mut doc, &[FieldAction::set("topic", "x")]);
        assert_eq!(doc.field_values("topic"), ["x"]);
    }

    #[test]
    fn test_add_field_value_appends() {
        let mut doc = topic_document();
        apply_field_actions(&mut doc, &[FieldAction::add("topic", "x")]);
        assert_eq!(doc.field_values("topic"), ["a", "b", "x"]);
    }

    #[test]
    fn test_actions_apply_in_order() {
        let mut doc = topic_document();
        apply_field_actions(
            &mut doc,
            &[FieldAction::add("topic", "x"), FieldAction::set("topic", "y")],
        );
        assert_eq!(doc.field_values("topic"), ["y"]);
    }

    #[test]
    fn test_parse_details() {
        let policy = Policy::new(
            1,
            1,
            0,
            json!({"fieldActions": [{"name": "status", "action": "SET_FIELD_VALUE", "value": "matched"}]}),
        );

        let details = FieldActionDetails::parse(&policy).unwrap();
        assert_eq!(details.field_actions, vec![FieldAction::set("status", "matched")]);
    }

    #[test]
    fn test_parse_rejects_unknown_action() {
        let policy = Policy::new(
            9,
            1,
            0,
            json!({"fieldActions": [{"name": "status", "action": "DROP_FIELD", "value": "x"}]}),
        );

        let err = FieldActionDetails::parse(&policy).unwrap_err();
        assert!(matches!(
            err,
            docpolicy_core::Error::PolicyDetailsParse { policy_id: 9, .. }
        ));
    }
}
