//! Policy handler registry

use docpolicy_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::handlers::{MetadataPolicyHandler, TagPolicyHandler};
use crate::{PolicyHandler, PolicyType};

/// Registry binding policy types to the handlers that apply them
///
/// Handlers are registered under a binding name at startup. A policy type
/// names its binding in [`PolicyType::handler`].
#[derive(Clone, Default)]
pub struct PolicyHandlerRegistry {
    handlers: HashMap<String, Arc<dyn PolicyHandler>>,
}

impl PolicyHandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the metadata and tag handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(MetadataPolicyHandler::new()));
        registry.register(Arc::new(TagPolicyHandler::new()));
        registry
    }

    /// Register a handler under its own name
    pub fn register(&mut self, handler: Arc<dyn PolicyHandler>) {
        let name = handler.name().to_string();
        self.register_as(name, handler);
    }

    /// Register a handler under an explicit binding name, replacing any existing one
    pub fn register_as(&mut self, binding: impl Into<String>, handler: Arc<dyn PolicyHandler>) {
        let binding = binding.into();
        if self.handlers.contains_key(&binding) {
            warn!(binding = %binding, handler = %handler.name(), "Replacing policy handler");
        } else {
            info!(binding = %binding, handler = %handler.name(), "Registered policy handler");
        }
        self.handlers.insert(binding, handler);
    }

    /// Look up a handler by binding name
    pub fn get(&self, binding: &str) -> Option<Arc<dyn PolicyHandler>> {
        self.handlers.get(binding).cloned()
    }

    /// Handler bound to a policy type
    pub fn handler_for(&self, policy_type: &PolicyType) -> Result<Arc<dyn PolicyHandler>> {
        self.get(&policy_type.handler)
            .ok_or_else(|| Error::HandlerNotFound(policy_type.handler.clone()))
    }

    /// Registered binding names, sorted
    pub fn bindings(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HandlerOutcome, Policy, METADATA_POLICY_HANDLER, TAG_POLICY_HANDLER};
    use docpolicy_core::{Document, SequenceId};

    struct StopHandler;

    impl PolicyHandler for StopHandler {
        fn name(&self) -> &str {
            "stop"
        }

        fn apply(&self, _: &mut Document, _: &Policy, _: SequenceId) -> Result<HandlerOutcome> {
            Ok(HandlerOutcome::Stop)
        }
    }

    #[test]
    fn test_defaults() {
        let registry = PolicyHandlerRegistry::with_defaults();
        assert_eq!(registry.bindings(), vec![METADATA_POLICY_HANDLER, TAG_POLICY_HANDLER]);
    }

    #[test]
    fn test_handler_for_policy_type() {
        let registry = PolicyHandlerRegistry::with_defaults();
        let handler = registry.handler_for(&PolicyType::tag_policy(2)).unwrap();
        assert_eq!(handler.name(), TAG_POLICY_HANDLER);
    }

    #[test]
    fn test_missing_binding() {
        let registry = PolicyHandlerRegistry::new();
        let err = registry
            .handler_for(&PolicyType::metadata_policy(1))
            .err()
            .unwrap();
        assert!(matches!(err, Error::HandlerNotFound(name) if name == METADATA_POLICY_HANDLER));
    }

    #[test]
    fn test_substitute_handler() {
        let mut registry = PolicyHandlerRegistry::with_defaults();
        registry.register_as(TAG_POLICY_HANDLER, Arc::new(StopHandler));

        let handler = registry.get(TAG_POLICY_HANDLER).unwrap();
        assert_eq!(handler.name(), "stop");
        assert_eq!(registry.len(), 2);
    }
}
