//! Ingestion: turning raw snapshots into normalized entities.
//!
//! [`EntityNormalizer`] decodes the nested cell tree into explicit record
//! types and flattens it into per-kind mappings. Its output feeds both the
//! persistence store and the notification dispatcher.

pub mod normalizer;

pub use normalizer::{EntityNormalizer, NormalizedSnapshot, NormalizerOptions};
