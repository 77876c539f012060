//! Immutable, fingerprinted rule snapshots

use chrono::{DateTime, Utc};
use docpolicy_core::{
    CollectionId, ConditionId, Document, Error, LexiconId, PolicyId, PolicyTypeId, Result,
    SequenceId,
};
use docpolicy_policy::{Policy, PolicyType};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use crate::config::{
    compute_fingerprint, CollectionSequence, DocumentCollection, FieldLabel, Lexicon,
    RuleConfiguration,
};
use crate::Condition;

/// Immutable in-memory copy of the rule configuration
///
/// The mappings never change after construction. A configuration change
/// produces a new snapshot with a new fingerprint; the superseded one is
/// flagged as invalidated but stays fully usable by whoever still holds it.
#[derive(Debug)]
pub struct EnvironmentSnapshot {
    fingerprint: String,
    instance_id: Uuid,
    create_date: DateTime<Utc>,
    persisted_date: Option<DateTime<Utc>>,
    last_modified_date: Option<DateTime<Utc>>,
    invalidated: AtomicBool,

    sequences: BTreeMap<SequenceId, CollectionSequence>,
    collections: BTreeMap<CollectionId, DocumentCollection>,
    conditions: BTreeMap<ConditionId, Condition>,
    field_labels: BTreeMap<String, FieldLabel>,
    lexicons: BTreeMap<LexiconId, Lexicon>,
    policies: BTreeMap<PolicyId, Policy>,
    policy_types: BTreeMap<PolicyTypeId, PolicyType>,
}

impl EnvironmentSnapshot {
    /// Build and validate a snapshot from a configuration
    ///
    /// Fails with a configuration error on duplicate ids or dangling
    /// references between sequences, collections, conditions, lexicons,
    /// policies and policy types.
    pub fn build(
        configuration: RuleConfiguration,
        instance_id: Uuid,
        persisted_date: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let fingerprint = compute_fingerprint(&configuration)?;

        let RuleConfiguration {
            last_modified,
            sequences,
            collections,
            conditions,
            field_labels,
            lexicons,
            policies,
            policy_types,
        } = configuration;

        let mut sequences = index_by(sequences, |s| s.id, "collection sequence")?;
        let collections = index_by(collections, |c| c.id, "collection")?;
        let conditions: BTreeMap<ConditionId, Condition> =
            index_by(conditions, |c| c.id, "condition")?
                .into_iter()
                .map(|(id, shared)| (id, shared.condition))
                .collect();
        let field_labels = index_by(field_labels, |l| l.name.clone(), "field label")?;
        let lexicons = index_by(lexicons, |l| l.id, "lexicon")?;
        let policies = index_by(policies, |p| p.id, "policy")?;
        let policy_types = index_by(policy_types, |t| t.id, "policy type")?;

        for sequence in sequences.values_mut() {
            // Stable sort keeps configured order for equal `order` values
            sequence.entries.sort_by_key(|e| e.order);
        }

        let snapshot = Self {
            fingerprint,
            instance_id,
            create_date: Utc::now(),
            persisted_date,
            last_modified_date: last_modified,
            invalidated: AtomicBool::new(false),
            sequences,
            collections,
            conditions,
            field_labels,
            lexicons,
            policies,
            policy_types,
        };
        snapshot.validate_references()?;

        Ok(snapshot)
    }

    fn validate_references(&self) -> Result<()> {
        for sequence in self.sequences.values() {
            for entry in &sequence.entries {
                for id in &entry.collection_ids {
                    if !self.collections.contains_key(id) {
                        return Err(Error::config(format!(
                            "Sequence {} entry {} references unknown collection {}",
                            sequence.id, entry.order, id
                        )));
                    }
                }
                if let Some(default) = entry.default_collection_id {
                    if !entry.collection_ids.contains(&default) {
                        return Err(Error::config(format!(
                            "Sequence {} entry {} nominates default collection {} outside the entry",
                            sequence.id, entry.order, default
                        )));
                    }
                }
            }
        }

        for collection in self.collections.values() {
            for id in &collection.policy_ids {
                if !self.policies.contains_key(id) {
                    return Err(Error::config(format!(
                        "Collection {} references unknown policy {}",
                        collection.id, id
                    )));
                }
            }
            self.validate_condition(&collection.condition, &format!("collection {}", collection.id))?;
        }

        for (id, condition) in &self.conditions {
            self.validate_condition(condition, &format!("condition {}", id))?;
        }

        for policy in self.policies.values() {
            if !self.policy_types.contains_key(&policy.type_id) {
                return Err(Error::config(format!(
                    "Policy {} references unknown policy type {}",
                    policy.id, policy.type_id
                )));
            }
        }

        Ok(())
    }

    fn validate_condition(&self, condition: &Condition, owner: &str) -> Result<()> {
        for id in condition.referenced_conditions() {
            if !self.conditions.contains_key(&id) {
                return Err(Error::config(format!(
                    "{} references unknown condition {}",
                    owner, id
                )));
            }
        }
        for id in condition.referenced_lexicons() {
            if !self.lexicons.contains_key(&id) {
                return Err(Error::config(format!(
                    "{} references unknown lexicon {}",
                    owner, id
                )));
            }
        }
        Ok(())
    }

    /// Content hash of the configuration
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Identity of the snapshot store that built this snapshot
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn create_date(&self) -> DateTime<Utc> {
        self.create_date
    }

    /// When the configuration source last persisted this data, if known
    pub fn persisted_date(&self) -> Option<DateTime<Utc>> {
        self.persisted_date
    }

    /// Modification time declared by the configuration, if any
    pub fn last_modified_date(&self) -> Option<DateTime<Utc>> {
        self.last_modified_date
    }

    /// Whether a newer configuration has superseded this snapshot
    pub fn is_invalidated(&self) -> bool {
        self.invalidated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_invalidated(&self) {
        self.invalidated.store(true, Ordering::Release);
    }

    pub fn sequence(&self, id: SequenceId) -> Option<&CollectionSequence> {
        self.sequences.get(&id)
    }

    pub fn collection(&self, id: CollectionId) -> Option<&DocumentCollection> {
        self.collections.get(&id)
    }

    pub fn condition(&self, id: ConditionId) -> Option<&Condition> {
        self.conditions.get(&id)
    }

    pub fn field_label(&self, name: &str) -> Option<&FieldLabel> {
        self.field_labels.get(name)
    }

    pub fn lexicon(&self, id: LexiconId) -> Option<&Lexicon> {
        self.lexicons.get(&id)
    }

    pub fn policy(&self, id: PolicyId) -> Option<&Policy> {
        self.policies.get(&id)
    }

    pub fn policy_type(&self, id: PolicyTypeId) -> Option<&PolicyType> {
        self.policy_types.get(&id)
    }

    /// All collection sequences, ordered by id
    pub fn sequences(&self) -> impl Iterator<Item = &CollectionSequence> {
        self.sequences.values()
    }

    /// All policies, ordered by id
    pub fn policies(&self) -> impl Iterator<Item = &Policy> {
        self.policies.values()
    }

    /// Entity counts, for logging
    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            sequences: self.sequences.len(),
            collections: self.collections.len(),
            conditions: self.conditions.len(),
            field_labels: self.field_labels.len(),
            lexicons: self.lexicons.len(),
            policies: self.policies.len(),
            policy_types: self.policy_types.len(),
        }
    }

    /// Document fields a leaf condition reads
    ///
    /// A field label expands to the fields it names; any other name is a
    /// literal field name.
    pub fn resolve_fields<'a>(&'a self, field: &'a str) -> Vec<&'a str> {
        match self.field_labels.get(field) {
            Some(label) => label.fields.iter().map(String::as_str).collect(),
            None => vec![field],
        }
    }

    /// Values of a field (or field label) in a document
    pub fn field_values<'d>(&self, document: &'d Document, field: &str) -> Vec<&'d str> {
        self.resolve_fields(field)
            .into_iter()
            .flat_map(|name| document.field_values(name))
            .map(String::as_str)
            .collect()
    }
}

/// Entity counts of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SnapshotSummary {
    pub sequences: usize,
    pub collections: usize,
    pub conditions: usize,
    pub field_labels: usize,
    pub lexicons: usize,
    pub policies: usize,
    pub policy_types: usize,
}

fn index_by<K, T>(items: Vec<T>, key: impl Fn(&T) -> K, what: &str) -> Result<BTreeMap<K, T>>
where
    K: Ord + Debug,
{
    let mut indexed = BTreeMap::new();
    for item in items {
        let id = key(&item);
        if indexed.contains_key(&id) {
            return Err(Error::config(format!("Duplicate {} id {:?}", what, id)));
        }
        indexed.insert(id, item);
    }
    Ok(indexed)
}
