//! Domain layer: entity model, raw snapshot shape, and notification state.
//!
//! This module contains the normalized entity records, their identifiers
//! and events, the coordinate masking transform, and the bounded recency
//! set shared by all scan workers.

pub mod coords;
pub mod encounter_id;
pub mod entities;
pub mod entity_event;
pub mod recency;
pub mod snapshot;

pub use coords::{Coordinate, CoordinateMask};
pub use encounter_id::EncounterId;
pub use entities::{Gym, Lure, ScannedLocation, SpeciesId, Stop, Team, WildEncounter};
pub use entity_event::{EntityEvent, EntityKind};
pub use recency::NotificationDeduplicator;
pub use snapshot::Snapshot;
