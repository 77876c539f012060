//! Condition definitions

use docpolicy_core::{ConditionId, LexiconId};
use serde::{Deserialize, Serialize};

/// Predicate evaluated against a document's fields
///
/// Leaf variants are evaluated by a [`LeafEvaluator`](crate::LeafEvaluator);
/// `and`, `or`, `not` and `reference` are handled by the condition evaluator.
/// A leaf `field` may name a field label, which expands to several fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Compare field values with a string
    Text {
        field: String,
        value: String,
        #[serde(default)]
        mode: TextMatchMode,
        #[serde(default)]
        case_sensitive: bool,
    },

    /// Match field values with a regular expression
    Regex { field: String, pattern: String },

    /// Compare field values as dates (RFC 3339 or `YYYY-MM-DD`)
    Date {
        field: String,
        operator: DateOperator,
        value: String,
    },

    /// Compare field values as numbers
    Number {
        field: String,
        operator: NumberOperator,
        value: f64,
    },

    /// The field has at least one value
    Exists { field: String },

    /// Field values contain (or equal) a term of a lexicon
    Lexicon {
        field: String,
        lexicon_id: LexiconId,
        #[serde(default)]
        whole_value: bool,
    },

    /// Boolean expression evaluated by an external collaborator
    Expression { field: String, expression: String },

    /// All sub-conditions match
    And { conditions: Vec<Condition> },

    /// At least one sub-condition matches
    Or { conditions: Vec<Condition> },

    /// The sub-condition does not match
    Not { condition: Box<Condition> },

    /// A shared condition of the snapshot
    Reference { condition_id: ConditionId },
}

/// How a text condition compares values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextMatchMode {
    #[default]
    Equals,
    Contains,
    StartsWith,
    EndsWith,
}

/// Date comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOperator {
    Before,
    After,
    /// Same calendar day (UTC)
    On,
}

/// Numeric comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberOperator {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Condition {
    /// Short name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Regex { .. } => "regex",
            Self::Date { .. } => "date",
            Self::Number { .. } => "number",
            Self::Exists { .. } => "exists",
            Self::Lexicon { .. } => "lexicon",
            Self::Expression { .. } => "expression",
            Self::And { .. } => "and",
            Self::Or { .. } => "or",
            Self::Not { .. } => "not",
            Self::Reference { .. } => "reference",
        }
    }

    /// Whether the variant is evaluated by the leaf evaluator
    pub fn is_leaf(&self) -> bool {
        !matches!(
            self,
            Self::And { .. } | Self::Or { .. } | Self::Not { .. } | Self::Reference { .. }
        )
    }

    /// Field (or field label) a leaf reads
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Text { field, .. }
            | Self::Regex { field, .. }
            | Self::Date { field, .. }
            | Self::Number { field, .. }
            | Self::Exists { field }
            | Self::Lexicon { field, .. }
            | Self::Expression { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Visit this condition and every nested condition, without following references
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Condition)) {
        visit(self);
        match self {
            Self::And { conditions } | Self::Or { conditions } => {
                for condition in conditions {
                    condition.walk(visit);
                }
            }
            Self::Not { condition } => condition.walk(visit),
            _ => {}
        }
    }

    /// Shared condition ids referenced anywhere in this tree
    pub fn referenced_conditions(&self) -> Vec<ConditionId> {
        let mut ids = Vec::new();
        self.walk(&mut |c| {
            if let Self::Reference { condition_id } = c {
                ids.push(*condition_id);
            }
        });
        ids
    }

    /// Lexicon ids referenced anywhere in this tree
    pub fn referenced_lexicons(&self) -> Vec<LexiconId> {
        let mut ids = Vec::new();
        self.walk(&mut |c| {
            if let Self::Lexicon { lexicon_id, .. } = c {
                ids.push(*lexicon_id);
            }
        });
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_condition_defaults() {
        let json = r#"{"type": "text", "field": "content", "value": "hello"}"#;
        let condition: Condition = serde_json::from_str(json).unwrap();

        match condition {
            Condition::Text {
                field,
                value,
                mode,
                case_sensitive,
            } => {
                assert_eq!(field, "content");
                assert_eq!(value, "hello");
                assert_eq!(mode, TextMatchMode::Equals);
                assert!(!case_sensitive);
            }
            _ => panic!("Wrong condition type"),
        }
    }

    #[test]
    fn test_composite_condition() {
        let yaml = r#"
type: and
conditions:
  - type: exists
    field: title
  - type: not
    condition:
      type: reference
      condition_id: 7
  - type: or
    conditions:
      - type: lexicon
        field: body
        lexicon_id: 3
"#;
        let condition: Condition = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(condition.kind(), "and");
        assert!(!condition.is_leaf());
        assert_eq!(condition.referenced_conditions(), vec![7]);
        assert_eq!(condition.referenced_lexicons(), vec![3]);
    }

    #[test]
    fn test_leaf_field() {
        let condition = Condition::Number {
            field: "pages".to_string(),
            operator: NumberOperator::Ge,
            value: 10.0,
        };
        assert!(condition.is_leaf());
        assert_eq!(condition.field(), Some("pages"));
    }
}
