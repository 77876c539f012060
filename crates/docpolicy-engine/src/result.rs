//! Classification results

use docpolicy_core::{CollectionId, Document, Error, PolicyId, PolicyTypeId, SequenceId};
use serde::Serialize;
use std::collections::BTreeSet;

/// What a diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticScope {
    Snapshot,
    Collection { collection_id: CollectionId },
    Policy { policy_id: PolicyId },
    PolicyType { policy_type_id: PolicyTypeId },
}

/// A recoverable problem met while classifying one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub scope: DiagnosticScope,

    /// Error kind, see [`Error::kind`]
    pub kind: String,

    pub message: String,
}

impl Diagnostic {
    pub fn new(scope: DiagnosticScope, error: &Error) -> Self {
        Self {
            scope,
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn collection(collection_id: CollectionId, error: &Error) -> Self {
        Self::new(DiagnosticScope::Collection { collection_id }, error)
    }

    pub fn policy(policy_id: PolicyId, error: &Error) -> Self {
        Self::new(DiagnosticScope::Policy { policy_id }, error)
    }

    pub fn policy_type(policy_type_id: PolicyTypeId, error: &Error) -> Self {
        Self::new(DiagnosticScope::PolicyType { policy_type_id }, error)
    }
}

/// Marker for a document that could not be classified
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentError {
    pub kind: String,
    pub message: String,
}

impl From<&Error> for DocumentError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of classifying one document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifyDocumentResult {
    /// Reference of the input document
    pub reference: String,

    pub matched_collection_ids: BTreeSet<CollectionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_collection_id: Option<CollectionId>,

    /// Policies applied, in application order
    pub applied_policy_ids: Vec<PolicyId>,

    /// The document after policy application
    pub document: Document,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<DocumentError>,
}

impl ClassifyDocumentResult {
    /// Result for a document that was not classified; the document is returned as given
    pub fn failed(document: Document, error: &Error) -> Self {
        Self {
            reference: document.reference.clone(),
            matched_collection_ids: BTreeSet::new(),
            default_collection_id: None,
            applied_policy_ids: Vec::new(),
            document,
            diagnostics: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Results of one classify call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationBatch {
    pub sequence_id: SequenceId,

    /// Fingerprint of the snapshot every document was classified against
    pub fingerprint: String,

    /// Served from the last known-good snapshot
    pub degraded: bool,

    /// Cancelled before every document started
    pub cancelled: bool,

    /// One result per input document, in input order
    pub results: Vec<ClassifyDocumentResult>,
}

impl ClassificationBatch {
    /// Total matched collections over all documents
    pub fn total_matches(&self) -> usize {
        self.results
            .iter()
            .map(|r| r.matched_collection_ids.len())
            .sum()
    }

    /// Number of documents carrying an error marker
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_keeps_document() {
        let doc = Document::new("d-1").with_field("a", "1");
        let result = ClassifyDocumentResult::failed(doc.clone(), &Error::Timeout);

        assert!(!result.is_success());
        assert_eq!(result.reference, "d-1");
        assert_eq!(result.document, doc);
        assert_eq!(result.error.as_ref().unwrap().kind, "timeout");
    }

    #[test]
    fn test_diagnostic_serialization() {
        let diagnostic = Diagnostic::policy(7, &Error::policy_details(7, "missing fieldActions"));
        let json = serde_json::to_value(&diagnostic).unwrap();

        assert_eq!(json["scope"]["type"], "policy");
        assert_eq!(json["scope"]["policy_id"], 7);
        assert_eq!(json["kind"], "policy_details_parse");
    }
}
