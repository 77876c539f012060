//! Metrics collection and reporting

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics collector for classification activity
///
/// Counters are kept in-process for snapshots and also forwarded to the
/// `metrics` facade, which is a no-op until a recorder is installed.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsInner>,
}

#[derive(Default)]
struct MetricsInner {
    batches: AtomicU64,
    documents: AtomicU64,
    document_errors: AtomicU64,
    collection_matches: AtomicU64,
    policies_applied: AtomicU64,
    diagnostics: AtomicU64,
    snapshot_loads: AtomicU64,
    degraded_batches: AtomicU64,
    total_latency_us: AtomicU64,
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    /// Record a classify call
    pub fn record_batch(&self, degraded: bool) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("docpolicy_batches_total").increment(1);
        if degraded {
            self.inner.degraded_batches.fetch_add(1, Ordering::Relaxed);
            ::metrics::counter!("docpolicy_degraded_batches_total").increment(1);
        }
    }

    /// Record one classified document
    pub fn record_document(&self, matches: u64, policies_applied: u64, latency_us: u64) {
        self.inner.documents.fetch_add(1, Ordering::Relaxed);
        self.inner
            .collection_matches
            .fetch_add(matches, Ordering::Relaxed);
        self.inner
            .policies_applied
            .fetch_add(policies_applied, Ordering::Relaxed);
        self.inner
            .total_latency_us
            .fetch_add(latency_us, Ordering::Relaxed);

        ::metrics::counter!("docpolicy_documents_total").increment(1);
        ::metrics::counter!("docpolicy_collection_matches_total").increment(matches);
        ::metrics::counter!("docpolicy_policies_applied_total").increment(policies_applied);
        ::metrics::histogram!("docpolicy_document_latency_us").record(latency_us as f64);
    }

    /// Record a document whose result carries an error marker
    pub fn record_document_error(&self, kind: &'static str) {
        self.inner.document_errors.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("docpolicy_document_errors_total", "kind" => kind).increment(1);
    }

    /// Record recovered per-collection or per-policy problems
    pub fn record_diagnostics(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.inner.diagnostics.fetch_add(count, Ordering::Relaxed);
        ::metrics::counter!("docpolicy_diagnostics_total").increment(count);
    }

    /// Record a snapshot published by the snapshot store
    pub fn record_snapshot_load(&self) {
        self.inner.snapshot_loads.fetch_add(1, Ordering::Relaxed);
        ::metrics::counter!("docpolicy_snapshot_loads_total").increment(1);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            batches: self.inner.batches.load(Ordering::Relaxed),
            documents: self.inner.documents.load(Ordering::Relaxed),
            document_errors: self.inner.document_errors.load(Ordering::Relaxed),
            collection_matches: self.inner.collection_matches.load(Ordering::Relaxed),
            policies_applied: self.inner.policies_applied.load(Ordering::Relaxed),
            diagnostics: self.inner.diagnostics.load(Ordering::Relaxed),
            snapshot_loads: self.inner.snapshot_loads.load(Ordering::Relaxed),
            degraded_batches: self.inner.degraded_batches.load(Ordering::Relaxed),
            total_latency_us: self.inner.total_latency_us.load(Ordering::Relaxed),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub batches: u64,
    pub documents: u64,
    pub document_errors: u64,
    pub collection_matches: u64,
    pub policies_applied: u64,
    pub diagnostics: u64,
    pub snapshot_loads: u64,
    pub degraded_batches: u64,
    pub total_latency_us: u64,
}

impl MetricsSnapshot {
    /// Calculate average latency per document
    pub fn avg_latency_us(&self) -> u64 {
        if self.documents == 0 {
            0
        } else {
            self.total_latency_us / self.documents
        }
    }

    /// Average number of matched collections per document
    pub fn matches_per_document(&self) -> f64 {
        if self.documents == 0 {
            0.0
        } else {
            self.collection_matches as f64 / self.documents as f64
        }
    }
}
