//! Mock collaborators for engine tests
//!
//! Configurable leaf evaluators and policy handlers used to observe what
//! the pipeline evaluates and applies.

#![allow(dead_code)]

use async_trait::async_trait;
use docpolicy_core::{Document, PolicyId, Result, SequenceId};
use docpolicy_engine::{
    BuiltinLeafEvaluator, Condition, EnvironmentSnapshot, LeafEvaluator, RuleConfiguration,
    SnapshotStore, StaticConfigurationSource,
};
use docpolicy_policy::{HandlerOutcome, Policy, PolicyHandler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Hello/bye rule set: one sequence, one collection, one metadata policy
pub const HELLO_RULES: &str = r#"
sequences:
  - id: 1
    name: S1
    entries:
      - order: 1
        stop_on_match: true
        collection_ids: [1]
collections:
  - id: 1
    name: C1
    condition:
      type: text
      field: content
      value: hello
    policy_ids: [100]
policies:
  - id: 100
    name: mark matched
    type_id: 1
    details:
      fieldActions:
        - name: status
          action: SET_FIELD_VALUE
          value: matched
policy_types:
  - id: 1
    short_name: MetadataPolicy
    name: Metadata Policy
    handler: metadata_policy
"#;

pub fn hello_config() -> RuleConfiguration {
    RuleConfiguration::from_yaml(HELLO_RULES).unwrap()
}

pub fn static_store(config: RuleConfiguration) -> (Arc<StaticConfigurationSource>, Arc<SnapshotStore>) {
    let source = Arc::new(StaticConfigurationSource::new(config));
    let store = Arc::new(SnapshotStore::new(source.clone()));
    (source, store)
}

/// Leaf evaluator counting calls per field, delegating to the builtin evaluator
#[derive(Default)]
pub struct CountingLeafEvaluator {
    inner: BuiltinLeafEvaluator,
    calls: Mutex<HashMap<String, u32>>,
    latency: Option<Duration>,
    cancel_on_call: Option<CancellationToken>,
}

impl CountingLeafEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each leaf
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Cancel `token` on the first evaluated leaf
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancel_on_call = Some(token);
        self
    }

    /// Leaves evaluated against `field`
    pub fn calls_for(&self, field: &str) -> u32 {
        self.calls.lock().get(field).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl LeafEvaluator for CountingLeafEvaluator {
    async fn evaluate_leaf(
        &self,
        condition: &Condition,
        document: &Document,
        snapshot: &EnvironmentSnapshot,
    ) -> Result<bool> {
        if let Some(field) = condition.field() {
            *self.calls.lock().entry(field.to_string()).or_insert(0) += 1;
        }
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.inner.evaluate_leaf(condition, document, snapshot).await
    }
}

/// Handler recording every applied policy and returning a fixed outcome
pub struct RecordingHandler {
    name: String,
    outcome: HandlerOutcome,
    applied: Mutex<Vec<(PolicyId, SequenceId)>>,
}

impl RecordingHandler {
    pub fn new(name: &str, outcome: HandlerOutcome) -> Self {
        Self {
            name: name.to_string(),
            outcome,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn applied(&self) -> Vec<(PolicyId, SequenceId)> {
        self.applied.lock().clone()
    }
}

impl PolicyHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(
        &self,
        document: &mut Document,
        policy: &Policy,
        sequence_id: SequenceId,
    ) -> Result<HandlerOutcome> {
        self.applied.lock().push((policy.id, sequence_id));
        document.add_field_value("applied_by", self.name.clone());
        Ok(self.outcome)
    }
}
