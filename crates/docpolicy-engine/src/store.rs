//! Snapshot store with single-flight rebuilds
//!
//! The store owns the only mutable shared state of the engine: the current
//! `Arc<EnvironmentSnapshot>`. Readers clone the `Arc`; a rebuild publishes
//! a new snapshot with a single swap. Rebuilds are serialised by an async
//! guard and callers re-check after acquiring it, so concurrent callers
//! during a rebuild receive the freshly published snapshot instead of
//! triggering another load.

use docpolicy_core::{Error, Result};
use docpolicy_telemetry::MetricsCollector;
use parking_lot::{Mutex, RwLock};
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::source::{ConfigurationLoad, ConfigurationSource};
use crate::EnvironmentSnapshot;

/// Snapshot store settings
#[derive(Debug, Clone, Default)]
pub struct SnapshotStoreSettings {
    /// Ask the source for its fingerprint at most once per interval
    pub refresh_interval: Option<Duration>,
}

/// Snapshot handed to a caller
#[derive(Debug, Clone)]
pub struct CurrentSnapshot {
    pub snapshot: Arc<EnvironmentSnapshot>,

    /// The last check or reload of the source failed and this is the last
    /// known-good snapshot; stays set until a check succeeds
    pub degraded: bool,
}

impl Deref for CurrentSnapshot {
    type Target = EnvironmentSnapshot;

    fn deref(&self) -> &Self::Target {
        &self.snapshot
    }
}

/// Holds the current rule snapshot and rebuilds it on demand
pub struct SnapshotStore {
    source: Arc<dyn ConfigurationSource>,
    settings: SnapshotStoreSettings,
    instance_id: Uuid,
    current: RwLock<Option<Arc<EnvironmentSnapshot>>>,
    stale: AtomicBool,
    degraded: AtomicBool,
    last_checked: Mutex<Option<Instant>>,
    rebuild: tokio::sync::Mutex<()>,
    metrics: Option<MetricsCollector>,
}

impl SnapshotStore {
    /// Create a store over a configuration source
    pub fn new(source: Arc<dyn ConfigurationSource>) -> Self {
        Self {
            source,
            settings: SnapshotStoreSettings::default(),
            instance_id: Uuid::new_v4(),
            current: RwLock::new(None),
            stale: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            last_checked: Mutex::new(None),
            rebuild: tokio::sync::Mutex::new(()),
            metrics: None,
        }
    }

    pub fn with_settings(mut self, settings: SnapshotStoreSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Record snapshot loads in a metrics collector
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Process-local identity stamped on every snapshot this store builds
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Last published snapshot, without loading or polling
    pub fn current(&self) -> Option<Arc<EnvironmentSnapshot>> {
        self.current.read().clone()
    }

    /// Signal that the backing configuration changed
    ///
    /// The next `get_snapshot` reloads from the source. Snapshots already
    /// handed out stay valid.
    pub fn invalidate(&self) {
        self.stale.store(true, Ordering::Release);
        debug!(source = %self.source.name(), "Snapshot invalidated");
    }

    /// Get the current snapshot, loading or refreshing it when needed
    ///
    /// Fails with `ConfigurationUnavailable` only when no snapshot has ever
    /// been loaded; otherwise a failing source yields the last known-good
    /// snapshot flagged as degraded.
    pub async fn get_snapshot(&self) -> Result<CurrentSnapshot> {
        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }

        let _guard = self.rebuild.lock().await;

        // Another caller may have refreshed while we waited
        if let Some(current) = self.fresh_snapshot() {
            return Ok(current);
        }

        self.refresh().await
    }

    /// Ask the source whether its configuration moved away from the current snapshot
    ///
    /// Invalidates the store and returns `true` on a fingerprint mismatch.
    pub async fn check_for_changes(&self) -> bool {
        let Some(current) = self.current() else {
            return false;
        };

        match self.source.current_fingerprint().await {
            Ok(Some(fingerprint)) if fingerprint != current.fingerprint() => {
                info!(
                    previous = %current.fingerprint(),
                    current = %fingerprint,
                    "Configuration change detected"
                );
                self.invalidate();
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "Configuration change check failed");
                false
            }
        }
    }

    /// Poll the source on a timer until `cancel` fires
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        store.check_for_changes().await;
                    }
                }
            }
            debug!("Snapshot watcher stopped");
        })
    }

    fn fresh_snapshot(&self) -> Option<CurrentSnapshot> {
        if self.stale.load(Ordering::Acquire) || self.poll_due() {
            return None;
        }
        self.current().map(|snapshot| CurrentSnapshot {
            snapshot,
            degraded: self.degraded.load(Ordering::Acquire),
        })
    }

    fn poll_due(&self) -> bool {
        match (self.settings.refresh_interval, *self.last_checked.lock()) {
            (Some(interval), Some(checked)) => checked.elapsed() >= interval,
            _ => false,
        }
    }

    fn touch(&self) {
        *self.last_checked.lock() = Some(Instant::now());
    }

    async fn refresh(&self) -> Result<CurrentSnapshot> {
        let current = self.current();
        // Consumed before loading so an invalidate during the load survives it
        let invalidated = self.stale.swap(false, Ordering::AcqRel);
        let forced = invalidated || current.is_none();

        if let (false, Some(snapshot)) = (forced, current.as_ref()) {
            match self.source.current_fingerprint().await {
                Ok(Some(fingerprint)) if fingerprint == snapshot.fingerprint() => {
                    self.degraded.store(false, Ordering::Release);
                    self.touch();
                    return Ok(CurrentSnapshot {
                        snapshot: Arc::clone(snapshot),
                        degraded: false,
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        source = %self.source.name(),
                        error = %e,
                        fingerprint = %snapshot.fingerprint(),
                        "Configuration source unreachable, serving last known-good snapshot"
                    );
                    self.degraded.store(true, Ordering::Release);
                    self.touch();
                    return Ok(CurrentSnapshot {
                        snapshot: Arc::clone(snapshot),
                        degraded: true,
                    });
                }
            }
        }

        let hint = current.as_ref().map(|s| s.fingerprint().to_string());
        let loaded = match self.source.load(hint.as_deref()).await {
            Ok(load) => self.build(load, current.as_ref()),
            Err(e) => Err(e),
        };

        match loaded {
            Ok(snapshot) => {
                self.publish(&snapshot);
                self.degraded.store(false, Ordering::Release);
                self.touch();
                Ok(CurrentSnapshot {
                    snapshot,
                    degraded: false,
                })
            }
            Err(e) => {
                if invalidated {
                    self.stale.store(true, Ordering::Release);
                }
                let Some(snapshot) = current else {
                    return Err(Error::unavailable(format!(
                        "no snapshot could be loaded from {}: {}",
                        self.source.name(),
                        e
                    )));
                };
                warn!(
                    source = %self.source.name(),
                    error = %e,
                    fingerprint = %snapshot.fingerprint(),
                    "Configuration reload failed, serving last known-good snapshot"
                );
                self.degraded.store(true, Ordering::Release);
                self.touch();
                Ok(CurrentSnapshot {
                    snapshot,
                    degraded: true,
                })
            }
        }
    }

    fn build(
        &self,
        load: ConfigurationLoad,
        current: Option<&Arc<EnvironmentSnapshot>>,
    ) -> Result<Arc<EnvironmentSnapshot>> {
        match (load, current) {
            (ConfigurationLoad::Unchanged, Some(snapshot)) => Ok(Arc::clone(snapshot)),
            (ConfigurationLoad::Unchanged, None) => Err(Error::internal(
                "configuration source reported no change but no snapshot exists",
            )),
            (
                ConfigurationLoad::Loaded {
                    configuration,
                    persisted_date,
                },
                current,
            ) => {
                let built = EnvironmentSnapshot::build(configuration, self.instance_id, persisted_date)?;
                match current {
                    Some(snapshot) if snapshot.fingerprint() == built.fingerprint() => {
                        Ok(Arc::clone(snapshot))
                    }
                    _ => Ok(Arc::new(built)),
                }
            }
        }
    }

    fn publish(&self, snapshot: &Arc<EnvironmentSnapshot>) {
        let previous = self.current.write().replace(Arc::clone(snapshot));

        match previous {
            Some(previous) if Arc::ptr_eq(&previous, snapshot) => {
                debug!(fingerprint = %snapshot.fingerprint(), "Configuration unchanged");
            }
            previous => {
                if let Some(previous) = previous {
                    previous.mark_invalidated();
                }
                let summary = snapshot.summary();
                info!(
                    fingerprint = %snapshot.fingerprint(),
                    source = %self.source.name(),
                    sequences = summary.sequences,
                    collections = summary.collections,
                    policies = summary.policies,
                    "Published configuration snapshot"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_snapshot_load();
                }
            }
        }
    }
}
