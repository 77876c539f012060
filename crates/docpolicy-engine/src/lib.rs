//! docpolicy Classification Engine
//!
//! Classifies documents into collections by walking ordered collection
//! sequences, then applies the policies of the matched collections.
//!
//! The engine is organised around an immutable, fingerprinted
//! [`EnvironmentSnapshot`] of the rule configuration:
//! - [`SnapshotStore`] loads snapshots from a [`ConfigurationSource`] with
//!   single-flight rebuilds and degraded-mode fallback
//! - [`ConditionEvaluator`] evaluates condition trees, delegating leaves to a
//!   [`LeafEvaluator`]
//! - [`SequenceEvaluator`] walks sequence entries with stop-on-match
//! - [`ClassificationPipeline`] ties it together for batches of documents

pub mod condition;
pub mod config;
pub mod evaluator;
pub mod leaf;
pub mod pipeline;
pub mod result;
pub mod sequence;
pub mod snapshot;
pub mod source;
pub mod store;

pub use condition::{Condition, DateOperator, NumberOperator, TextMatchMode};
pub use config::{
    compute_fingerprint, CollectionSequence, CollectionSequenceEntry, DocumentCollection,
    FieldLabel, Lexicon, RuleConfiguration, SharedCondition,
};
pub use evaluator::{CollectionEvaluator, ConditionEvaluator, DEFAULT_MAX_REFERENCE_DEPTH};
pub use leaf::{BuiltinLeafEvaluator, LeafEvaluator};
pub use pipeline::{ClassificationPipeline, PipelineBuilder, PipelineSettings};
pub use result::{
    ClassificationBatch, ClassifyDocumentResult, Diagnostic, DiagnosticScope, DocumentError,
};
pub use sequence::{DefaultCollectionTieBreak, SequenceEvaluation, SequenceEvaluator};
pub use snapshot::{EnvironmentSnapshot, SnapshotSummary};
pub use source::{
    ConfigurationLoad, ConfigurationSource, FileConfigurationSource, StaticConfigurationSource,
};
pub use store::{CurrentSnapshot, SnapshotStore, SnapshotStoreSettings};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::condition::Condition;
    pub use crate::config::RuleConfiguration;
    pub use crate::leaf::{BuiltinLeafEvaluator, LeafEvaluator};
    pub use crate::pipeline::{ClassificationPipeline, PipelineSettings};
    pub use crate::result::{ClassificationBatch, ClassifyDocumentResult};
    pub use crate::source::{ConfigurationSource, FileConfigurationSource};
    pub use crate::store::SnapshotStore;
}
