//! Policy handler trait

use docpolicy_core::{Document, Result, SequenceId};

use crate::{resolve_policies, Policy};

/// Whether later handlers in the same classification pass should still run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Keep applying policies
    Continue,
    /// Stop applying policies to this document
    Stop,
}

/// Resolves and applies the policies of one policy type
pub trait PolicyHandler: Send + Sync {
    /// Get the handler name
    fn name(&self) -> &str;

    /// Resolve conflicts between policies of this handler's type
    ///
    /// Defaults to keeping every policy at the highest priority.
    fn resolve(&self, _document: &Document, policies: Vec<Policy>) -> Result<Vec<Policy>> {
        resolve_policies(policies)
    }

    /// Apply a single policy to the document
    fn apply(
        &self,
        document: &mut Document,
        policy: &Policy,
        sequence_id: SequenceId,
    ) -> Result<HandlerOutcome>;
}
