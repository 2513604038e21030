//! Post-normalization entity events.
//!
//! Every normalized entity becomes one [`EntityEvent`]. The dispatcher posts
//! them to webhook endpoints; serialization yields the webhook body
//! `{"type": ..., "message": {...}}` directly.

use std::fmt;

use serde::Serialize;

use super::entities::{Gym, ScannedLocation, Stop, WildEncounter};

/// Kind of normalized entity, one per storage table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// Wild encounters.
    Pokemon,
    /// Stop forts.
    Pokestop,
    /// Gym forts.
    Gym,
    /// Scan point freshness markers.
    ScannedLocation,
}

impl EntityKind {
    /// Returns the kind as a static string slice (also the webhook `type`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pokemon => "pokemon",
            Self::Pokestop => "pokestop",
            Self::Gym => "gym",
            Self::ScannedLocation => "scanned_location",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted for every created or updated entity.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "message", rename_all = "snake_case")]
pub enum EntityEvent {
    /// A wild encounter was seen.
    Pokemon(WildEncounter),
    /// A stop was seen.
    Pokestop(Stop),
    /// A gym was seen.
    Gym(Gym),
    /// A scan point was refreshed.
    ScannedLocation(ScannedLocation),
}

impl EntityEvent {
    /// Returns the kind of the carried entity.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Pokemon(_) => EntityKind::Pokemon,
            Self::Pokestop(_) => EntityKind::Pokestop,
            Self::Gym(_) => EntityKind::Gym,
            Self::ScannedLocation(_) => EntityKind::ScannedLocation,
        }
    }

    /// Returns the identifier of the carried entity.
    #[must_use]
    pub fn entity_id(&self) -> String {
        match self {
            Self::Pokemon(p) => p.encounter_id.to_string(),
            Self::Pokestop(s) => s.pokestop_id.clone(),
            Self::Gym(g) => g.gym_id.clone(),
            Self::ScannedLocation(l) => l.scanned_id.clone(),
        }
    }
}
