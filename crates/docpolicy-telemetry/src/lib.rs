//! docpolicy Telemetry
//!
//! Counters for classification activity.
//!
//! Provides:
//! - An in-process collector with cheap atomic counters and snapshots
//! - Mirroring into the `metrics` facade so an installed exporter sees them

pub mod metrics;

pub use crate::metrics::{MetricsCollector, MetricsSnapshot};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
}
