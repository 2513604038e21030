//! Service layer: snapshot passes and the workers that drive them.
//!
//! [`SnapshotPipeline`] runs one pass (normalize, then persist and dispatch
//! concurrently). [`spawn_workers`] runs passes periodically for a set of
//! scan points, fetching snapshots from a [`SnapshotSource`].

pub mod pipeline;
pub mod source;
pub mod worker;

pub use pipeline::{PassReport, SnapshotPipeline};
pub use source::{HttpSnapshotSource, SnapshotSource};
pub use worker::{WorkerSettings, run_pass, spawn_workers};
