//! docpolicy Core
//!
//! Core types, identifiers, and utilities shared across docpolicy components.
//!
//! This crate provides:
//! - The `Document` record that conditions read and policies mutate
//! - Integer identifiers for every configuration entity
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    CollectionId, ConditionId, Document, LexiconId, PolicyId, PolicyTypeId, SequenceId,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{
        CollectionId, ConditionId, Document, LexiconId, PolicyId, PolicyTypeId, SequenceId,
    };
}
