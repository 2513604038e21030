//! Scan workers: periodic fetch-and-process loops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::domain::Coordinate;
use crate::error::ScanError;
use crate::service::pipeline::{PassReport, SnapshotPipeline};
use crate::service::source::SnapshotSource;

/// How scan points are spread over workers.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    /// Number of worker tasks.
    pub workers: usize,
    /// Points to scan, assigned round-robin.
    pub scan_points: Vec<Coordinate>,
    /// Pause after every pass.
    pub scan_delay: Duration,
}

impl WorkerSettings {
    /// Scan points handled by worker `index`.
    #[must_use]
    pub fn points_for(&self, index: usize) -> Vec<Coordinate> {
        let workers = self.workers.max(1);
        self.scan_points
            .iter()
            .enumerate()
            .filter(|(i, _)| i % workers == index)
            .map(|(_, point)| *point)
            .collect()
    }
}

/// Fetches the snapshot for `scan_point` and pushes it through `pipeline`.
///
/// # Errors
///
/// Returns [`ScanError::Source`] if the fetch fails, otherwise whatever
/// [`SnapshotPipeline::process`] returns.
pub async fn run_pass(
    pipeline: &SnapshotPipeline,
    source: &dyn SnapshotSource,
    scan_point: Coordinate,
) -> Result<PassReport, ScanError> {
    let snapshot = source.fetch(scan_point).await?;
    pipeline.process(&snapshot).await
}

/// Starts the scan workers. Each worker cycles through its scan points
/// until `shutdown` turns `true`, finishing the pass in progress first.
///
/// Workers left without a scan point are not started.
pub fn spawn_workers(
    pipeline: Arc<SnapshotPipeline>,
    source: Arc<dyn SnapshotSource>,
    settings: &WorkerSettings,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..settings.workers.max(1))
        .filter_map(|index| {
            let points = settings.points_for(index);
            if points.is_empty() {
                tracing::warn!(worker = index, "no scan points assigned, worker not started");
                return None;
            }
            let pipeline = Arc::clone(&pipeline);
            let source = Arc::clone(&source);
            let delay = settings.scan_delay;
            let shutdown = shutdown.clone();
            Some(tokio::spawn(async move {
                run_worker(index, pipeline, source, points, delay, shutdown).await;
            }))
        })
        .collect()
}

async fn run_worker(
    index: usize,
    pipeline: Arc<SnapshotPipeline>,
    source: Arc<dyn SnapshotSource>,
    points: Vec<Coordinate>,
    delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(worker = index, points = points.len(), "scan worker started");
    for point in points.iter().copied().cycle() {
        if *shutdown.borrow() {
            break;
        }

        match run_pass(&pipeline, source.as_ref(), point).await {
            Ok(report) => tracing::debug!(
                worker = index,
                scan_point = %point,
                attempted = report.attempted,
                committed = report.committed,
                "pass finished"
            ),
            Err(err) => tracing::warn!(
                worker = index,
                scan_point = %point,
                code = err.error_code(),
                class = ?err.class(),
                error = %err,
                "pass failed"
            ),
        }

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    tracing::info!(worker = index, "scan worker stopped");
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::FixedOffset;
    use serde_json::json;

    use crate::domain::{NotificationDeduplicator, ScannedLocation, Snapshot};
    use crate::error::NotifyError;
    use crate::ingest::EntityNormalizer;
    use crate::locale::JsonLocalizer;
    use crate::notify::{Alert, AlertComposer, Dispatcher, EmailTransport, Profile, WebhookClient};
    use crate::persistence::{EntityStore, StoreOptions};

    #[derive(Debug, Default)]
    struct EmptyMap {
        fetched: Mutex<Vec<Coordinate>>,
    }

    #[async_trait]
    impl SnapshotSource for EmptyMap {
        async fn fetch(&self, scan_point: Coordinate) -> Result<Snapshot, ScanError> {
            if let Ok(mut fetched) = self.fetched.lock() {
                fetched.push(scan_point);
            }
            Ok(Snapshot::captured_now(
                scan_point,
                json!({ "responses": { "GET_MAP_OBJECTS": { "map_cells": [] } } }),
            ))
        }
    }

    #[derive(Debug)]
    struct NoMail;

    #[async_trait]
    impl EmailTransport for NoMail {
        async fn send(&self, _to: &[String], _alert: &Alert) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    async fn pipeline() -> Arc<SnapshotPipeline> {
        let Ok(store) = EntityStore::in_memory(StoreOptions::default()).await else {
            panic!("in-memory store");
        };
        let Ok(profile) = Profile::from_json(r#"{"emails": ["a@b.c"], "interested_pokemons": [1]}"#)
        else {
            panic!("valid profile");
        };
        let Some(offset) = FixedOffset::east_opt(0) else {
            panic!("offset");
        };
        let composer = AlertComposer::new(
            Coordinate::new(0.0, 0.0),
            None,
            offset,
            Arc::new(JsonLocalizer::default()),
        );
        let dispatcher = Dispatcher::new(
            Arc::new(NotificationDeduplicator::default()),
            profile,
            composer,
            Arc::new(NoMail),
            WebhookClient::new(reqwest::Client::new(), Vec::new(), Duration::from_secs(1)),
        );
        Arc::new(SnapshotPipeline::new(EntityNormalizer::default(), store, dispatcher))
    }

    fn points(n: usize) -> Vec<Coordinate> {
        (0..n).map(|i| Coordinate::new(i as f64, 0.0)).collect()
    }

    #[test]
    fn points_are_assigned_round_robin() {
        let settings = WorkerSettings {
            workers: 2,
            scan_points: points(5),
            scan_delay: Duration::ZERO,
        };
        let first: Vec<f64> = settings.points_for(0).iter().map(|p| p.latitude).collect();
        assert_eq!(first, vec![0.0, 2.0, 4.0]);
        assert_eq!(settings.points_for(1).len(), 2);
        assert!(settings.points_for(2).is_empty());
    }

    #[tokio::test]
    async fn workers_scan_until_shutdown() {
        let pipeline = pipeline().await;
        let source = Arc::new(EmptyMap::default());
        let settings = WorkerSettings {
            workers: 3,
            scan_points: points(2),
            scan_delay: Duration::from_millis(10),
        };
        let (stop, shutdown) = watch::channel(false);

        let handles = spawn_workers(
            Arc::clone(&pipeline),
            Arc::clone(&source) as Arc<dyn SnapshotSource>,
            &settings,
            shutdown,
        );
        assert_eq!(handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(stop.send(true).is_ok());
        for handle in handles {
            assert!(handle.await.is_ok());
        }

        let fetched = source.fetched.lock().map(|f| f.len()).unwrap_or_default();
        assert!(fetched >= 2, "fetched {fetched}");
        let scanned = pipeline.store().count::<ScannedLocation>().await.ok();
        assert_eq!(scanned, Some(2));
    }
}
