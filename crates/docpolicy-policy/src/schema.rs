//! JSON schema validation of policy details
//!
//! A policy type may carry a JSON schema (draft 7) for the details of its
//! policies. Details are validated before a handler applies the policy.

use docpolicy_core::{Error, Result};
use jsonschema::{Draft, JSONSchema};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::{Policy, PolicyType};

/// Outcome of validating policy details against a schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Validation errors, empty when the details are valid
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// A passing result
    pub fn valid() -> Self {
        Self::default()
    }

    /// A failing result with a single error
    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates policy details against a policy type schema
pub trait SchemaValidator: Send + Sync {
    /// Validate `details` against `schema`
    fn validate(&self, details: &Value, schema: &Value) -> ValidationResult;
}

/// Draft 7 JSON schema validator
///
/// Compiled schemas are kept per schema document, so each policy type
/// definition is compiled once and shared by every later validation.
#[derive(Default)]
pub struct JsonSchemaValidator {
    compiled: Mutex<HashMap<String, CompiledSchema>>,
}

type CompiledSchema = std::result::Result<Arc<JSONSchema>, String>;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct schemas compiled so far
    pub fn compiled_count(&self) -> usize {
        self.compiled.lock().len()
    }

    fn compile(&self, schema: &Value) -> CompiledSchema {
        let key = schema.to_string();
        let mut compiled = self.compiled.lock();
        if let Some(entry) = compiled.get(&key) {
            return entry.clone();
        }

        let entry = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map(Arc::new)
            .map_err(|e| format!("invalid policy type schema: {}", e));
        debug!(valid = entry.is_ok(), "Compiled policy type schema");
        compiled.insert(key, entry.clone());
        entry
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, details: &Value, schema: &Value) -> ValidationResult {
        let compiled = match self.compile(schema) {
            Ok(compiled) => compiled,
            Err(e) => return ValidationResult::invalid(e),
        };

        let errors: Vec<String> = match compiled.validate(details) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("{} at '{}'", e, e.instance_path))
                .collect(),
        };

        ValidationResult { errors }
    }
}

/// Validate a policy against its policy type
///
/// Policy types without a definition accept any details.
pub fn validate_policy(
    validator: &dyn SchemaValidator,
    policy: &Policy,
    policy_type: &PolicyType,
) -> Result<()> {
    let Some(schema) = policy_type.definition.as_ref() else {
        return Ok(());
    };

    let result = validator.validate(&policy.details, schema);
    if result.is_valid() {
        debug!(policy = policy.id, policy_type = %policy_type.short_name, "Policy details valid");
        Ok(())
    } else {
        Err(Error::SchemaValidation {
            policy_id: policy.id,
            errors: result.errors,
        })
    }
}
