//! Collection sequence evaluation
//!
//! Entries are walked in ascending `order`. Every collection of an entry is
//! evaluated, concurrently; once an entry with `stop_on_match` produced a
//! match, later entries are not looked at.

use docpolicy_core::{CollectionId, Document};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::config::{CollectionSequence, CollectionSequenceEntry};
use crate::result::Diagnostic;
use crate::{CollectionEvaluator, EnvironmentSnapshot};

/// Default collection pick when the entry's nominated default did not match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultCollectionTieBreak {
    /// Lowest matched collection id of the entry
    #[default]
    LowestId,
    /// Highest matched collection id of the entry
    HighestId,
    /// No default unless the nominated one matched
    None,
}

impl DefaultCollectionTieBreak {
    fn pick(&self, matched: &BTreeSet<CollectionId>) -> Option<CollectionId> {
        match self {
            Self::LowestId => matched.first().copied(),
            Self::HighestId => matched.last().copied(),
            Self::None => None,
        }
    }
}

/// Collections matched by a sequence for one document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SequenceEvaluation {
    pub matched_collection_ids: BTreeSet<CollectionId>,
    pub default_collection_id: Option<CollectionId>,
    pub diagnostics: Vec<Diagnostic>,
    /// Entries looked at before the walk ended
    pub entries_evaluated: usize,
}

/// Walks collection sequences
#[derive(Clone)]
pub struct SequenceEvaluator {
    collections: CollectionEvaluator,
    tie_break: DefaultCollectionTieBreak,
}

impl SequenceEvaluator {
    pub fn new(collections: CollectionEvaluator) -> Self {
        Self {
            collections,
            tie_break: DefaultCollectionTieBreak::default(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: DefaultCollectionTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Evaluate `sequence` for `document`
    pub async fn evaluate(
        &self,
        sequence: &CollectionSequence,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> SequenceEvaluation {
        let mut evaluation = SequenceEvaluation::default();

        for entry in &sequence.entries {
            evaluation.entries_evaluated += 1;
            let matched = self.evaluate_entry(entry, document, snapshot, &mut evaluation).await;

            if matched.is_empty() {
                continue;
            }

            if evaluation.default_collection_id.is_none() {
                evaluation.default_collection_id = match entry.default_collection_id {
                    Some(id) if matched.contains(&id) => Some(id),
                    _ => self.tie_break.pick(&matched),
                };
            }
            evaluation.matched_collection_ids.extend(matched);

            if entry.stop_on_match {
                debug!(
                    sequence = sequence.id,
                    order = entry.order,
                    document = %document.reference,
                    "Stopping sequence on match"
                );
                break;
            }
        }

        evaluation
    }

    async fn evaluate_entry(
        &self,
        entry: &CollectionSequenceEntry,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
        evaluation: &mut SequenceEvaluation,
    ) -> BTreeSet<CollectionId> {
        // collection_ids is a BTreeSet, so results come back by ascending id
        let collections: Vec<_> = entry
            .collection_ids
            .iter()
            .filter_map(|id| snapshot.collection(*id))
            .collect();

        let results = join_all(
            collections
                .iter()
                .map(|collection| self.collections.matches(collection, document, snapshot)),
        )
        .await;

        let mut matched = BTreeSet::new();
        for (collection, result) in collections.iter().zip(results) {
            match result {
                Ok(true) => {
                    matched.insert(collection.id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        collection = collection.id,
                        document = %document.reference,
                        error = %e,
                        "Collection evaluation failed, treating as no match"
                    );
                    evaluation.diagnostics.push(Diagnostic::collection(collection.id, &e));
                }
            }
        }
        matched
    }
}
