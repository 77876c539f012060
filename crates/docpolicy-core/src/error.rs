//! Error types for docpolicy

use crate::types::{PolicyId, PolicyTypeId, SequenceId};

/// Result type alias using docpolicy's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for docpolicy operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No configuration snapshot could be obtained
    #[error("configuration unavailable: {0}")]
    ConfigurationUnavailable(String),

    /// The requested collection sequence is not part of the snapshot
    #[error("collection sequence {0} not found")]
    SequenceNotFound(SequenceId),

    /// A condition could not be evaluated against a document
    #[error("condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    /// Policies handed to a single resolve call span several policy types
    #[error("policies passed to resolve span multiple policy types: {0:?}")]
    MixedPolicyType(Vec<PolicyTypeId>),

    /// Policy details could not be interpreted by the policy handler
    #[error("policy {policy_id} details could not be parsed: {message}")]
    PolicyDetailsParse { policy_id: PolicyId, message: String },

    /// Policy details were rejected by the policy type schema
    #[error("policy {policy_id} failed schema validation: {}", errors.join("; "))]
    SchemaValidation {
        policy_id: PolicyId,
        errors: Vec<String>,
    },

    /// No handler is bound to the policy type
    #[error("no policy handler registered for '{0}'")]
    HandlerNotFound(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout errors
    #[error("operation timed out")]
    Timeout,

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new configuration unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::ConfigurationUnavailable(msg.into())
    }

    /// Create a new condition evaluation error
    pub fn condition(msg: impl Into<String>) -> Self {
        Self::ConditionEvaluation(msg.into())
    }

    /// Create a new policy details parse error
    pub fn policy_details(policy_id: PolicyId, msg: impl Into<String>) -> Self {
        Self::PolicyDetailsParse {
            policy_id,
            message: msg.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable name of the error variant for diagnostics and metrics labels
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationUnavailable(_) => "configuration_unavailable",
            Self::SequenceNotFound(_) => "sequence_not_found",
            Self::ConditionEvaluation(_) => "condition_evaluation",
            Self::MixedPolicyType(_) => "mixed_policy_type",
            Self::PolicyDetailsParse { .. } => "policy_details_parse",
            Self::SchemaValidation { .. } => "schema_validation",
            Self::HandlerNotFound(_) => "handler_not_found",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Internal(_) => "internal",
        }
    }
}
