//! Builtin policy handlers
//!
//! Both handlers interpret `details` as an ordered list of field actions:
//! - `SET_FIELD_VALUE` clears the field and writes the value
//! - `ADD_FIELD_VALUE` appends the value
//!
//! Details are parsed completely before the document is touched, so a
//! malformed policy never leaves a half-applied mutation behind.

use docpolicy_core::{Document, Result, SequenceId};
use tracing::debug;

use crate::action::{apply_field_actions, FieldActionDetails};
use crate::handler::{HandlerOutcome, PolicyHandler};
use crate::policy::{Policy, METADATA_POLICY_HANDLER, TAG_POLICY_HANDLER};

/// Applies metadata policies
#[derive(Debug, Default, Clone, Copy)]
pub struct MetadataPolicyHandler;

impl MetadataPolicyHandler {
    /// Create a new metadata policy handler
    pub fn new() -> Self {
        Self
    }
}

impl PolicyHandler for MetadataPolicyHandler {
    fn name(&self) -> &str {
        METADATA_POLICY_HANDLER
    }

    fn apply(
        &self,
        document: &mut Document,
        policy: &Policy,
        sequence_id: SequenceId,
    ) -> Result<HandlerOutcome> {
        apply_field_action_policy(self.name(), document, policy, sequence_id)
    }
}

/// Applies tag policies
#[derive(Debug, Default, Clone, Copy)]
pub struct TagPolicyHandler;

impl TagPolicyHandler {
    /// Create a new tag policy handler
    pub fn new() -> Self {
        Self
    }
}

impl PolicyHandler for TagPolicyHandler {
    fn name(&self) -> &str {
        TAG_POLICY_HANDLER
    }

    fn apply(
        &self,
        document: &mut Document,
        policy: &Policy,
        sequence_id: SequenceId,
    ) -> Result<HandlerOutcome> {
        apply_field_action_policy(self.name(), document, policy, sequence_id)
    }
}

fn apply_field_action_policy(
    handler: &str,
    document: &mut Document,
    policy: &Policy,
    sequence_id: SequenceId,
) -> Result<HandlerOutcome> {
    let details = FieldActionDetails::parse(policy)?;

    apply_field_actions(document, &details.field_actions);

    debug!(
        handler = %handler,
        policy = policy.id,
        sequence = sequence_id,
        document = %document.reference,
        actions = details.field_actions.len(),
        "Applied field actions"
    );

    Ok(HandlerOutcome::Continue)
}
