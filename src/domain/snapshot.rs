//! Raw snapshot shape as delivered by the remote map API.
//!
//! Only the fields the normalizer consumes are modelled. Optional fort
//! attributes default instead of failing; required attributes missing from
//! an entry make the whole snapshot malformed.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::coords::Coordinate;
use super::entities::SpeciesId;

/// One fetched snapshot together with the scan point that captured it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Scan point the snapshot was requested for.
    pub scan_point: Coordinate,
    /// Local capture time.
    pub captured_at: DateTime<Utc>,
    /// Undecoded response body.
    pub body: serde_json::Value,
}

impl Snapshot {
    /// Wraps a raw response body captured now.
    #[must_use]
    pub fn captured_now(scan_point: Coordinate, body: serde_json::Value) -> Self {
        Self {
            scan_point,
            captured_at: Utc::now(),
            body,
        }
    }
}

/// Top-level response envelope.
#[derive(Debug, Deserialize)]
pub struct RawMapResponse {
    /// Per-request responses.
    pub responses: RawResponses,
}

/// Response container keyed by request name.
#[derive(Debug, Deserialize)]
pub struct RawResponses {
    /// The map objects response.
    #[serde(rename = "GET_MAP_OBJECTS")]
    pub get_map_objects: RawMapObjects,
}

/// Map objects response body.
#[derive(Debug, Deserialize)]
pub struct RawMapObjects {
    /// Geographic cells around the scan point.
    pub map_cells: Vec<RawCell>,
}

/// One geographic cell.
#[derive(Debug, Default, Deserialize)]
pub struct RawCell {
    /// Wild encounters in this cell.
    #[serde(default)]
    pub wild_pokemons: Vec<RawWildPokemon>,
    /// Forts in this cell.
    #[serde(default)]
    pub forts: Vec<RawFort>,
}

/// A wild encounter entry.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWildPokemon {
    /// Opaque 64-bit encounter id.
    pub encounter_id: u64,
    /// Spawn point id.
    pub spawnpoint_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Time the entry was last modified (epoch millis).
    pub last_modified_timestamp_ms: i64,
    /// Remaining visibility (millis).
    pub time_till_hidden_ms: i64,
    /// Species data.
    pub pokemon_data: RawPokemonData,
}

/// Species part of a wild encounter.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPokemonData {
    /// Species id.
    pub pokemon_id: SpeciesId,
}

/// A fort entry (stop or gym).
#[derive(Debug, Clone, Deserialize)]
pub struct RawFort {
    /// Fort id.
    pub id: String,
    /// Type discriminator: `1` for stops, absent for gyms.
    #[serde(rename = "type", default)]
    pub fort_type: Option<i64>,
    /// Whether the fort is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Time the fort was last modified (epoch millis).
    pub last_modified_timestamp_ms: i64,
    /// Lure state for stops.
    #[serde(default)]
    pub lure_info: Option<RawLureInfo>,
    /// Owning team for gyms.
    #[serde(default)]
    pub owned_by_team: Option<i64>,
    /// Guarding species for gyms.
    #[serde(default)]
    pub guard_pokemon_id: Option<SpeciesId>,
    /// Prestige points for gyms.
    #[serde(default)]
    pub gym_points: Option<i64>,
}

/// Lure state of a stop.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLureInfo {
    /// Lure expiration (epoch millis).
    pub lure_expires_timestamp_ms: i64,
    /// Species attracted by the lure.
    #[serde(default)]
    pub active_pokemon_id: SpeciesId,
}
