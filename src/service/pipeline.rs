//! One snapshot pass: normalize, then persist and notify side by side.

use chrono::{DateTime, Utc};

use crate::domain::Snapshot;
use crate::error::{ScanError, StoreError};
use crate::ingest::{EntityNormalizer, NormalizedSnapshot};
use crate::notify::{DispatchReport, Dispatcher};
use crate::persistence::{EntityStore, UpsertReport};

/// Summary of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Scan point that captured the snapshot.
    pub scan_point: String,
    /// Capture time of the snapshot.
    pub captured_at: DateTime<Utc>,
    /// Records handed to the store.
    pub attempted: usize,
    /// Records committed.
    pub committed: usize,
    /// Per-kind upsert outcomes.
    pub upserts: Vec<UpsertReport>,
    /// Notification outcome.
    pub dispatch: DispatchReport,
}

#[derive(Debug, Default)]
struct PersistOutcome {
    attempted: usize,
    committed: usize,
    upserts: Vec<UpsertReport>,
    failures: Vec<StoreError>,
}

impl PersistOutcome {
    fn record(&mut self, attempted: usize, result: Result<UpsertReport, StoreError>) {
        self.attempted += attempted;
        match result {
            Ok(report) => {
                self.committed += report.committed;
                self.upserts.push(report);
            }
            Err(err) => {
                self.committed += err.committed();
                self.failures.push(err);
            }
        }
    }
}

/// Pushes snapshots through normalization, persistence and dispatch.
///
/// Persistence and dispatch consume the same normalized output concurrently
/// and independently: a storage failure does not suppress alerts and a
/// notification failure never affects storage.
#[derive(Debug, Clone)]
pub struct SnapshotPipeline {
    normalizer: EntityNormalizer,
    store: EntityStore,
    dispatcher: Dispatcher,
}

impl SnapshotPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(normalizer: EntityNormalizer, store: EntityStore, dispatcher: Dispatcher) -> Self {
        Self {
            normalizer,
            store,
            dispatcher,
        }
    }

    /// Store the pipeline writes to.
    #[must_use]
    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Dispatcher the pipeline notifies through.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Processes one snapshot.
    ///
    /// A pass is best-effort, not transactional: chunks committed before a
    /// storage failure stay committed.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Structural`] if the snapshot is malformed
    /// (nothing is persisted or dispatched), or [`ScanError::Persistence`]
    /// with attempted/committed counts if any entity kind failed to
    /// persist. Notifications have been dispatched in the latter case.
    pub async fn process(&self, snapshot: &Snapshot) -> Result<PassReport, ScanError> {
        let normalized = self.normalizer.normalize(snapshot).inspect_err(|err| {
            tracing::error!(scan_point = %snapshot.scan_point, error = %err, "malformed snapshot");
        })?;

        let (persisted, dispatch) =
            tokio::join!(self.persist(&normalized), self.dispatcher.dispatch(&normalized));

        let PersistOutcome {
            attempted,
            committed,
            upserts,
            failures,
        } = persisted;

        let failed = failures.len();
        if let Some(first) = failures.into_iter().next() {
            tracing::error!(
                scan_point = %snapshot.scan_point,
                attempted,
                committed,
                failed,
                "snapshot pass failed"
            );
            return Err(ScanError::Persistence {
                failed,
                attempted,
                committed,
                first,
            });
        }

        tracing::info!(
            scan_point = %snapshot.scan_point,
            pokemon = normalized.encounters.len(),
            pokestops = normalized.stops.len(),
            gyms = normalized.gyms.len(),
            committed,
            alerts = dispatch.alerts_sent,
            "snapshot pass complete"
        );

        Ok(PassReport {
            scan_point: snapshot.scan_point.key(),
            captured_at: snapshot.captured_at,
            attempted,
            committed,
            upserts,
            dispatch,
        })
    }

    async fn persist(&self, normalized: &NormalizedSnapshot) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();

        let result = self.store.upsert(normalized.encounters.values()).await;
        outcome.record(normalized.encounters.len(), result);

        let result = self.store.upsert(normalized.stops.values()).await;
        outcome.record(normalized.stops.len(), result);

        let result = self.store.upsert(normalized.gyms.values()).await;
        outcome.record(normalized.gyms.len(), result);

        let result = self
            .store
            .upsert(std::iter::once(&normalized.scanned_location))
            .await;
        outcome.record(1, result);

        outcome
    }
}
