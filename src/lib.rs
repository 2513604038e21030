//! # spawnwatch
//!
//! Map snapshot ingestion with idempotent persistence and deduplicated
//! spawn alerts.
//!
//! Scan workers periodically fetch a raw snapshot for a scan point. Each
//! snapshot is normalized into flat entity records, which are then consumed
//! by two independent stages: the SQLite store (chunked, retrying upserts)
//! and the dispatcher (webhook events for every entity, one email per
//! interesting encounter, at most once per encounter id).
//!
//! ## Architecture
//!
//! ```text
//! Scan workers (service/)
//!     │
//!     ├── SnapshotSource (service/)
//!     │
//!     ├── EntityNormalizer (ingest/)
//!     │       │
//!     │       ├── EntityStore (persistence/)
//!     │       │       └── SQLite
//!     │       │
//!     │       └── Dispatcher (notify/)
//!     │               ├── NotificationDeduplicator (domain/)
//!     │               ├── AlertComposer ── UrlShortener
//!     │               ├── EmailTransport (SMTP)
//!     │               └── WebhookClient
//!     │
//!     └── CoordinateMask (domain/), applied on reads
//! ```

pub mod config;
pub mod domain;
pub mod error;
pub mod ingest;
pub mod locale;
pub mod notify;
pub mod persistence;
pub mod service;
