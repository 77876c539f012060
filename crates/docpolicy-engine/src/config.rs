//! Rule configuration loaded by configuration sources
//!
//! The serialisable form of the whole rule graph: collection sequences,
//! collections, shared conditions, field labels, lexicons, policies and
//! policy types. It is turned into an immutable
//! [`EnvironmentSnapshot`](crate::EnvironmentSnapshot) by the snapshot store.

use chrono::{DateTime, Utc};
use docpolicy_core::{CollectionId, ConditionId, LexiconId, PolicyId, Result, SequenceId};
use docpolicy_policy::{Policy, PolicyType};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::Path;

use crate::Condition;

/// Complete rule configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleConfiguration {
    /// When the configuration was last changed, as declared by its author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    #[serde(default)]
    pub sequences: Vec<CollectionSequence>,

    #[serde(default)]
    pub collections: Vec<DocumentCollection>,

    /// Conditions shared between collections through `reference` conditions
    #[serde(default)]
    pub conditions: Vec<SharedCondition>,

    #[serde(default)]
    pub field_labels: Vec<FieldLabel>,

    #[serde(default)]
    pub lexicons: Vec<Lexicon>,

    #[serde(default)]
    pub policies: Vec<Policy>,

    #[serde(default)]
    pub policy_types: Vec<PolicyType>,
}

impl RuleConfiguration {
    /// Parse a configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            docpolicy_core::Error::config(format!("Failed to parse rule configuration: {}", e))
        })
    }

    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Parse file content, choosing the format from the file extension
    pub fn parse_for_path(path: &Path, content: &str) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(content),
            _ => Self::from_yaml(content),
        }
    }

    /// Load a configuration from a YAML or JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::parse_for_path(path, &content)
    }

    /// Content fingerprint of this configuration
    pub fn fingerprint(&self) -> Result<String> {
        compute_fingerprint(self)
    }
}

/// Ordered, named chain of rule entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSequence {
    pub id: SequenceId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Entries, evaluated by ascending `order`
    #[serde(default)]
    pub entries: Vec<CollectionSequenceEntry>,
}

/// One step of a collection sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSequenceEntry {
    /// Evaluation position within the sequence
    pub order: i32,

    /// Stop walking the sequence once a collection of this entry matched
    #[serde(default)]
    pub stop_on_match: bool,

    /// Collections evaluated by this entry
    pub collection_ids: BTreeSet<CollectionId>,

    /// Collection reported as the default when it matches in this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_collection_id: Option<CollectionId>,
}

/// A named condition plus the policies applied when it matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentCollection {
    pub id: CollectionId,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Root condition
    pub condition: Condition,

    /// Policies applied on match
    #[serde(default)]
    pub policy_ids: BTreeSet<PolicyId>,
}

/// A condition addressable by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedCondition {
    pub id: ConditionId,

    #[serde(default)]
    pub name: String,

    pub condition: Condition,
}

/// Named alias for one or more document fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldLabel {
    pub name: String,

    pub fields: Vec<String>,
}

/// List of terms matched by lexicon conditions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lexicon {
    pub id: LexiconId,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub terms: Vec<String>,
}

/// Canonical view hashed for fingerprints: every list ordered by id
#[derive(Serialize)]
struct CanonicalConfiguration<'a> {
    sequences: Vec<CanonicalSequence<'a>>,
    collections: Vec<&'a DocumentCollection>,
    conditions: Vec<&'a SharedCondition>,
    field_labels: Vec<&'a FieldLabel>,
    lexicons: Vec<&'a Lexicon>,
    policies: Vec<&'a Policy>,
    policy_types: Vec<&'a PolicyType>,
}

/// Sequence with entries in evaluation order; entries sharing an `order` keep their relative position
#[derive(Serialize)]
struct CanonicalSequence<'a> {
    id: SequenceId,
    name: &'a str,
    description: Option<&'a str>,
    entries: Vec<&'a CollectionSequenceEntry>,
}

impl<'a> CanonicalSequence<'a> {
    fn new(sequence: &'a CollectionSequence) -> Self {
        Self {
            id: sequence.id,
            name: &sequence.name,
            description: sequence.description.as_deref(),
            entries: sorted_by(&sequence.entries, |e| e.order),
        }
    }
}

fn sorted_by<'a, T, K: Ord>(items: &'a [T], key: impl Fn(&T) -> K) -> Vec<&'a T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by_key(|item| key(*item));
    sorted
}

/// Stable SHA-256 fingerprint over the full rule graph
///
/// The hash covers rule content only. The order of top-level lists, the
/// order of sequence entries with distinct `order` values, and the declared
/// `last_modified` timestamp do not affect it.
pub fn compute_fingerprint(configuration: &RuleConfiguration) -> Result<String> {
    let canonical = CanonicalConfiguration {
        sequences: sorted_by(&configuration.sequences, |s| s.id)
            .into_iter()
            .map(CanonicalSequence::new)
            .collect(),
        collections: sorted_by(&configuration.collections, |c| c.id),
        conditions: sorted_by(&configuration.conditions, |c| c.id),
        field_labels: sorted_by(&configuration.field_labels, |l| l.name.clone()),
        lexicons: sorted_by(&configuration.lexicons, |l| l.id),
        policies: sorted_by(&configuration.policies, |p| p.id),
        policy_types: sorted_by(&configuration.policy_types, |t| t.id),
    };

    let encoded = serde_json::to_vec(&canonical)?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"
sequences:
  - id: 1
    name: S1
    entries:
      - order: 1
        stop_on_match: true
        collection_ids: [10]
collections:
  - id: 10
    name: C1
    condition:
      type: text
      field: content
      value: hello
    policy_ids: [100]
policies:
  - id: 100
    type_id: 1
    details:
      fieldActions:
        - name: status
          action: SET_FIELD_VALUE
          value: matched
policy_types:
  - id: 1
    short_name: MetadataPolicy
    handler: metadata_policy
"#;

    #[test]
    fn test_parse_yaml() {
        let config = RuleConfiguration::from_yaml(RULES).unwrap();

        assert_eq!(config.sequences.len(), 1);
        assert!(config.sequences[0].entries[0].stop_on_match);
        assert_eq!(config.collections[0].policy_ids.len(), 1);
        assert_eq!(config.policy_types[0].handler, "metadata_policy");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = RuleConfiguration::from_yaml(RULES).unwrap();
        let b = RuleConfiguration::from_yaml(RULES).unwrap();

        let fingerprint = a.fingerprint().unwrap();
        assert_eq!(fingerprint, b.fingerprint().unwrap());
        assert_eq!(fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_list_order_and_timestamp() {
        let mut config = RuleConfiguration::from_yaml(RULES).unwrap();
        config.lexicons = vec![
            Lexicon {
                id: 1,
                name: "a".to_string(),
                terms: vec![],
            },
            Lexicon {
                id: 2,
                name: "b".to_string(),
                terms: vec![],
            },
        ];
        let before = config.fingerprint().unwrap();

        config.lexicons.reverse();
        config.last_modified = Some(Utc::now());

        assert_eq!(before, config.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_ignores_entry_list_order() {
        let entry = |order, id| CollectionSequenceEntry {
            order,
            stop_on_match: false,
            collection_ids: BTreeSet::from([id]),
            default_collection_id: None,
        };
        let mut config = RuleConfiguration::from_yaml(RULES).unwrap();
        config.sequences[0].entries = vec![entry(1, 10), entry(2, 20)];
        let before = config.fingerprint().unwrap();

        config.sequences[0].entries.reverse();
        assert_eq!(before, config.fingerprint().unwrap());

        config.sequences[0].entries[0].order = 3;
        assert_ne!(before, config.fingerprint().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_content() {
        let mut config = RuleConfiguration::from_yaml(RULES).unwrap();
        let before = config.fingerprint().unwrap();

        config.policies[0].priority = 3;

        assert_ne!(before, config.fingerprint().unwrap());
    }

    #[test]
    fn test_parse_for_path_json() {
        let json = r#"{"sequences": [{"id": 2, "name": "json", "entries": []}]}"#;
        let config = RuleConfiguration::parse_for_path(Path::new("rules.json"), json).unwrap();
        assert_eq!(config.sequences[0].id, 2);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = RuleConfiguration::from_yaml("sequences: 12").unwrap_err();
        assert!(matches!(err, docpolicy_core::Error::Config(_)));
    }
}
