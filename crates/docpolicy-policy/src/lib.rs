//! docpolicy Policy Engine
//!
//! Ranked policies that mutate document metadata once a document has been
//! classified into one or more collections.
//!
//! This crate provides:
//! - Policy and policy type definitions (YAML or JSON)
//! - Priority-based conflict resolution between policies of one type
//! - The `PolicyHandler` trait and a registry binding policy types to handlers
//! - Metadata and tag handlers built on field actions
//! - JSON-schema validation of policy details

pub mod action;
pub mod handler;
pub mod handlers;
pub mod policy;
pub mod registry;
pub mod resolver;
pub mod schema;

pub use action::{apply_field_actions, FieldAction, FieldActionDetails, FieldActionKind};
pub use handler::{HandlerOutcome, PolicyHandler};
pub use handlers::{MetadataPolicyHandler, TagPolicyHandler};
pub use policy::{Policy, PolicyType, METADATA_POLICY_HANDLER, TAG_POLICY_HANDLER};
pub use registry::PolicyHandlerRegistry;
pub use resolver::resolve_policies;
pub use schema::{validate_policy, JsonSchemaValidator, SchemaValidator, ValidationResult};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::action::{FieldAction, FieldActionKind};
    pub use crate::handler::{HandlerOutcome, PolicyHandler};
    pub use crate::policy::{Policy, PolicyType};
    pub use crate::registry::PolicyHandlerRegistry;
    pub use crate::resolver::resolve_policies;
    pub use crate::schema::{JsonSchemaValidator, SchemaValidator};
}
