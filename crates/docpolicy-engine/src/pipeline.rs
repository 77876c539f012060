//! Document classification pipeline
//!
//! A classify call takes one snapshot from the store and runs every
//! document of the batch against it:
//! - walk the collection sequence to find matching collections
//! - gather the policies of matched collections and group them by type
//! - resolve each group through its handler, validate, then apply
//!
//! Documents run concurrently up to a configured limit and results keep
//! input order.

use docpolicy_core::{CollectionId, Document, Error, PolicyId, PolicyTypeId, Result, SequenceId};
use docpolicy_policy::{
    validate_policy, HandlerOutcome, JsonSchemaValidator, Policy, PolicyHandlerRegistry,
    SchemaValidator,
};
use docpolicy_telemetry::MetricsCollector;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::CollectionSequence;
use crate::evaluator::DEFAULT_MAX_REFERENCE_DEPTH;
use crate::result::{ClassificationBatch, ClassifyDocumentResult, Diagnostic};
use crate::sequence::DefaultCollectionTieBreak;
use crate::store::{CurrentSnapshot, SnapshotStore};
use crate::{
    BuiltinLeafEvaluator, CollectionEvaluator, ConditionEvaluator, EnvironmentSnapshot,
    LeafEvaluator, SequenceEvaluator,
};

/// Pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Documents classified at the same time
    pub concurrency: usize,

    /// Give up on a single document after this long
    pub document_timeout: Option<Duration>,

    /// Default collection pick when the nominated default did not match
    pub tie_break: DefaultCollectionTieBreak,

    /// Longest allowed chain of condition references
    pub max_reference_depth: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            document_timeout: None,
            tie_break: DefaultCollectionTieBreak::default(),
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }
}

/// Classifies documents against the store's current snapshot
pub struct ClassificationPipeline {
    store: Arc<SnapshotStore>,
    sequences: SequenceEvaluator,
    handlers: PolicyHandlerRegistry,
    validator: Arc<dyn SchemaValidator>,
    settings: PipelineSettings,
    metrics: MetricsCollector,
}

impl ClassificationPipeline {
    pub fn builder(store: Arc<SnapshotStore>) -> PipelineBuilder {
        PipelineBuilder::new(store)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn handlers(&self) -> &PolicyHandlerRegistry {
        &self.handlers
    }

    /// Current snapshot of the store, loading it if needed
    pub async fn get_snapshot(&self) -> Result<CurrentSnapshot> {
        self.store.get_snapshot().await
    }

    /// Force the next classify call to reload configuration
    pub fn invalidate_snapshot(&self) {
        self.store.invalidate();
    }

    /// Keep the highest-priority policies of a single policy type
    pub fn resolve_policies(&self, policies: Vec<Policy>) -> Result<Vec<Policy>> {
        docpolicy_policy::resolve_policies(policies)
    }

    /// Classify a batch of documents with a collection sequence
    pub async fn classify(
        &self,
        sequence_id: SequenceId,
        documents: Vec<Document>,
    ) -> Result<ClassificationBatch> {
        self.classify_with_cancel(sequence_id, documents, CancellationToken::new())
            .await
    }

    /// Classify a batch, stopping before unstarted documents once `cancel` fires
    ///
    /// Fails only when no snapshot is available or the sequence does not
    /// exist. Every input document yields exactly one result.
    pub async fn classify_with_cancel(
        &self,
        sequence_id: SequenceId,
        documents: Vec<Document>,
        cancel: CancellationToken,
    ) -> Result<ClassificationBatch> {
        let start = Instant::now();
        let current = self.store.get_snapshot().await?;
        let snapshot: &EnvironmentSnapshot = &current.snapshot;
        let sequence = snapshot
            .sequence(sequence_id)
            .ok_or(Error::SequenceNotFound(sequence_id))?;

        self.metrics.record_batch(current.degraded);
        let document_count = documents.len();
        let cancelled = AtomicBool::new(false);

        let results: Vec<ClassifyDocumentResult> = stream::iter(documents)
            .map(|document| {
                let cancel = &cancel;
                let cancelled = &cancelled;
                async move {
                    if cancel.is_cancelled() {
                        cancelled.store(true, Ordering::Relaxed);
                        self.metrics.record_document_error(Error::Cancelled.kind());
                        return ClassifyDocumentResult::failed(document, &Error::Cancelled);
                    }
                    self.classify_document(sequence, document, snapshot).await
                }
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let batch = ClassificationBatch {
            sequence_id,
            fingerprint: snapshot.fingerprint().to_string(),
            degraded: current.degraded,
            cancelled: cancelled.load(Ordering::Relaxed),
            results,
        };

        info!(
            sequence = sequence_id,
            documents = document_count,
            matches = batch.total_matches(),
            failed = batch.failed_count(),
            fingerprint = %batch.fingerprint,
            degraded = batch.degraded,
            cancelled = batch.cancelled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Classified batch"
        );

        Ok(batch)
    }

    async fn classify_document(
        &self,
        sequence: &CollectionSequence,
        document: Document,
        snapshot: &EnvironmentSnapshot,
    ) -> ClassifyDocumentResult {
        let start = Instant::now();

        let outcome = match self.settings.document_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, self.process(sequence, &document, snapshot))
                    .await
                    .map_err(|_| Error::Timeout)
            }
            None => Ok(self.process(sequence, &document, snapshot).await),
        };

        match outcome {
            Ok(result) => {
                self.metrics.record_document(
                    result.matched_collection_ids.len() as u64,
                    result.applied_policy_ids.len() as u64,
                    start.elapsed().as_micros() as u64,
                );
                self.metrics.record_diagnostics(result.diagnostics.len() as u64);
                result
            }
            Err(e) => {
                warn!(
                    document = %document.reference,
                    sequence = sequence.id,
                    error = %e,
                    "Document classification failed"
                );
                self.metrics.record_document_error(e.kind());
                ClassifyDocumentResult::failed(document, &e)
            }
        }
    }

    async fn process(
        &self,
        sequence: &CollectionSequence,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> ClassifyDocumentResult {
        let evaluation = self.sequences.evaluate(sequence, document, snapshot).await;
        let mut diagnostics = evaluation.diagnostics;
        let mut mutated = document.clone();

        let applied_policy_ids = self.apply_policies(
            &mut mutated,
            &evaluation.matched_collection_ids,
            snapshot,
            sequence.id,
            &mut diagnostics,
        );

        debug!(
            document = %document.reference,
            matched = ?evaluation.matched_collection_ids,
            applied = ?applied_policy_ids,
            "Classified document"
        );

        ClassifyDocumentResult {
            reference: document.reference.clone(),
            matched_collection_ids: evaluation.matched_collection_ids,
            default_collection_id: evaluation.default_collection_id,
            applied_policy_ids,
            document: mutated,
            diagnostics,
            error: None,
        }
    }

    fn apply_policies(
        &self,
        document: &mut Document,
        matched: &BTreeSet<CollectionId>,
        snapshot: &EnvironmentSnapshot,
        sequence_id: SequenceId,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Vec<PolicyId> {
        let mut applied = Vec::new();

        for (type_id, policies) in group_policies(matched, snapshot) {
            let Some(policy_type) = snapshot.policy_type(type_id) else {
                let error = Error::config(format!("policy type {} not found", type_id));
                diagnostics.push(Diagnostic::policy_type(type_id, &error));
                continue;
            };

            let handler = match self.handlers.handler_for(policy_type) {
                Ok(handler) => handler,
                Err(e) => {
                    warn!(policy_type = type_id, error = %e, "Skipping policies without handler");
                    diagnostics.push(Diagnostic::policy_type(type_id, &e));
                    continue;
                }
            };

            let mut resolved = match handler.resolve(document, policies) {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(policy_type = type_id, error = %e, "Policy resolution failed");
                    diagnostics.push(Diagnostic::policy_type(type_id, &e));
                    continue;
                }
            };
            resolved.sort_by_key(|p| p.id);

            for policy in &resolved {
                if let Err(e) = validate_policy(self.validator.as_ref(), policy, policy_type) {
                    warn!(policy = policy.id, error = %e, "Skipping invalid policy");
                    diagnostics.push(Diagnostic::policy(policy.id, &e));
                    continue;
                }

                match handler.apply(document, policy, sequence_id) {
                    Ok(outcome) => {
                        applied.push(policy.id);
                        if outcome == HandlerOutcome::Stop {
                            debug!(
                                policy = policy.id,
                                handler = handler.name(),
                                "Handler stopped policy application"
                            );
                            return applied;
                        }
                    }
                    Err(e) => {
                        warn!(policy = policy.id, error = %e, "Policy application failed");
                        diagnostics.push(Diagnostic::policy(policy.id, &e));
                    }
                }
            }
        }

        applied
    }
}

/// Policies of matched collections, de-duplicated and grouped by ascending type id
fn group_policies(
    matched: &BTreeSet<CollectionId>,
    snapshot: &EnvironmentSnapshot,
) -> BTreeMap<PolicyTypeId, Vec<Policy>> {
    let mut seen = BTreeSet::new();
    let mut groups: BTreeMap<PolicyTypeId, Vec<Policy>> = BTreeMap::new();

    for collection in matched.iter().filter_map(|id| snapshot.collection(*id)) {
        for policy_id in &collection.policy_ids {
            if !seen.insert(*policy_id) {
                continue;
            }
            if let Some(policy) = snapshot.policy(*policy_id) {
                groups.entry(policy.type_id).or_default().push(policy.clone());
            }
        }
    }

    groups
}

/// Builder for [`ClassificationPipeline`]
pub struct PipelineBuilder {
    store: Arc<SnapshotStore>,
    leaf: Arc<dyn LeafEvaluator>,
    handlers: PolicyHandlerRegistry,
    validator: Arc<dyn SchemaValidator>,
    settings: PipelineSettings,
    metrics: MetricsCollector,
}

impl PipelineBuilder {
    /// Start from the builtin leaf evaluator, default handlers and JSON-schema validation
    pub fn new(store: Arc<SnapshotStore>) -> Self {
        Self {
            store,
            leaf: Arc::new(BuiltinLeafEvaluator::new()),
            handlers: PolicyHandlerRegistry::with_defaults(),
            validator: Arc::new(JsonSchemaValidator::new()),
            settings: PipelineSettings::default(),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn leaf_evaluator(mut self, leaf: Arc<dyn LeafEvaluator>) -> Self {
        self.leaf = leaf;
        self
    }

    pub fn handlers(mut self, handlers: PolicyHandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share a metrics collector, e.g. with the snapshot store
    pub fn metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn build(self) -> ClassificationPipeline {
        let conditions = ConditionEvaluator::new(self.leaf)
            .with_max_reference_depth(self.settings.max_reference_depth);
        let sequences = SequenceEvaluator::new(CollectionEvaluator::new(conditions))
            .with_tie_break(self.settings.tie_break);

        ClassificationPipeline {
            store: self.store,
            sequences,
            handlers: self.handlers,
            validator: self.validator,
            settings: self.settings,
            metrics: self.metrics,
        }
    }
}
