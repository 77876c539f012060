//! Core types for docpolicy

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Identifier of a collection sequence
pub type SequenceId = i64;

/// Identifier of a document collection
pub type CollectionId = i64;

/// Identifier of a shared condition
pub type ConditionId = i64;

/// Identifier of a lexicon
pub type LexiconId = i64;

/// Identifier of a policy
pub type PolicyId = i64;

/// Identifier of a policy type
pub type PolicyTypeId = i64;

/// A document being classified
///
/// Metadata is a map from field name to an ordered list of string values.
/// On input a field may be written as a single string or as a list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Caller-supplied identifier for the document
    #[serde(default)]
    pub reference: String,

    /// Field values keyed by field name
    #[serde(default, deserialize_with = "deserialize_fields")]
    pub fields: BTreeMap<String, Vec<String>>,
}

impl Document {
    /// Create a new empty document
    pub fn new(reference: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style helper appending a value to a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_field_value(name, value);
        self
    }

    /// Values stored under `name`, empty when the field is absent
    pub fn field_values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the document has at least one value for `name`
    pub fn has_field(&self, name: &str) -> bool {
        !self.field_values(name).is_empty()
    }

    /// Replace every value of `name` with a single value
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), vec![value.into()]);
    }

    /// Append a value to `name` without touching existing values
    pub fn add_field_value(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    /// Remove a field, returning its values
    pub fn remove_field(&mut self, name: &str) -> Option<Vec<String>> {
        self.fields.remove(name)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn deserialize_fields<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, OneOrMany>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, values)| match values {
            OneOrMany::One(value) => (name, vec![value]),
            OneOrMany::Many(values) => (name, values),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_existing_values() {
        let mut doc = Document::new("doc-1")
            .with_field("topic", "a")
            .with_field("topic", "b");

        doc.set_field("topic", "x");
        assert_eq!(doc.field_values("topic"), ["x"]);
    }

    #[test]
    fn test_add_appends() {
        let mut doc = Document::new("doc-1")
            .with_field("topic", "a")
            .with_field("topic", "b");

        doc.add_field_value("topic", "x");
        assert_eq!(doc.field_values("topic"), ["a", "b", "x"]);
    }

    #[test]
    fn test_missing_field_is_empty() {
        let doc = Document::new("doc-1");
        assert!(doc.field_values("absent").is_empty());
        assert!(!doc.has_field("absent"));
    }

    #[test]
    fn test_deserialize_string_or_list() {
        let json = r#"{"reference": "r1", "fields": {"title": "Report", "tags": ["a", "b"]}}"#;
        let doc: Document = serde_json::from_str(json).unwrap();

        assert_eq!(doc.reference, "r1");
        assert_eq!(doc.field_values("title"), ["Report"]);
        assert_eq!(doc.field_values("tags"), ["a", "b"]);
    }

    #[test]
    fn test_deserialize_yaml_without_fields() {
        let doc: Document = serde_yaml::from_str("reference: empty\n").unwrap();
        assert_eq!(doc.reference, "empty");
        assert!(doc.fields.is_empty());
    }
}
