//! Persistence layer: idempotent SQLite storage of normalized entities.
//!
//! [`EntityStore`] owns the durable copies of every entity kind. Writes are
//! chunked multi-row upserts with a configurable retry policy for transient
//! errors; reads return coordinates through the regional mask.

pub mod filter;
pub mod models;
pub mod retry;
pub mod sqlite;

pub use filter::SpeciesFilter;
pub use models::StoredEntity;
pub use retry::RetryPolicy;
pub use sqlite::{DEFAULT_CHUNK_SIZE, EntityStore, StoreOptions, UpsertReport};
