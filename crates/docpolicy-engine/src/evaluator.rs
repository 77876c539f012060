//! Condition and collection evaluation

use docpolicy_core::{Document, Error, Result};
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::debug;

use crate::config::DocumentCollection;
use crate::{Condition, EnvironmentSnapshot, LeafEvaluator};

/// Default limit on nested `reference` hops
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 32;

/// Evaluates condition trees
///
/// Composites are handled here; leaves go to the [`LeafEvaluator`]. The
/// document is never mutated.
#[derive(Clone)]
pub struct ConditionEvaluator {
    leaf: Arc<dyn LeafEvaluator>,
    max_reference_depth: usize,
}

impl ConditionEvaluator {
    pub fn new(leaf: Arc<dyn LeafEvaluator>) -> Self {
        Self {
            leaf,
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }

    /// Reference chains longer than `depth` fail (this also catches cycles)
    pub fn with_max_reference_depth(mut self, depth: usize) -> Self {
        self.max_reference_depth = depth;
        self
    }

    /// Evaluate a condition tree
    pub async fn evaluate(
        &self,
        condition: &Condition,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool> {
        self.evaluate_at(condition, document, snapshot, 0).await
    }

    fn evaluate_at<'a>(
        &'a self,
        condition: &'a Condition,
        document: &'a Document,
        snapshot: &'a EnvironmentSnapshot,
        depth: usize,
    ) -> BoxFuture<'a, Result<bool>> {
        async move {
            match condition {
                Condition::And { conditions } => {
                    for child in conditions {
                        if !self.evaluate_at(child, document, snapshot, depth).await? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }

                Condition::Or { conditions } => {
                    for child in conditions {
                        if self.evaluate_at(child, document, snapshot, depth).await? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }

                Condition::Not { condition } => {
                    Ok(!self.evaluate_at(condition, document, snapshot, depth).await?)
                }

                Condition::Reference { condition_id } => {
                    if depth >= self.max_reference_depth {
                        return Err(Error::condition(format!(
                            "reference chain through condition {} exceeds depth {}",
                            condition_id, self.max_reference_depth
                        )));
                    }
                    let target = snapshot.condition(*condition_id).ok_or_else(|| {
                        Error::condition(format!("condition {} not found", condition_id))
                    })?;
                    self.evaluate_at(target, document, snapshot, depth + 1).await
                }

                leaf => self.leaf.evaluate_leaf(leaf, document, snapshot).await,
            }
        }
        .boxed()
    }
}

/// Evaluates a collection's root condition
#[derive(Clone)]
pub struct CollectionEvaluator {
    conditions: ConditionEvaluator,
}

impl CollectionEvaluator {
    pub fn new(conditions: ConditionEvaluator) -> Self {
        Self { conditions }
    }

    /// Whether `document` belongs to `collection`
    pub async fn matches(
        &self,
        collection: &DocumentCollection,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool> {
        let matched = self
            .conditions
            .evaluate(&collection.condition, document, snapshot)
            .await
            .map_err(|e| match e {
                Error::ConditionEvaluation(msg) => {
                    Error::condition(format!("collection {}: {}", collection.id, msg))
                }
                other => other,
            })?;

        debug!(
            collection = collection.id,
            document = %document.reference,
            matched,
            "Evaluated collection"
        );
        Ok(matched)
    }
}
