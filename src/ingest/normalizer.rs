//! Snapshot normalization: nested cells in, flat entity mappings out.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::domain::snapshot::{RawFort, RawMapResponse, RawWildPokemon};
use crate::domain::{
    EncounterId, EntityEvent, Gym, Lure, ScannedLocation, Snapshot, Stop, Team, WildEncounter,
};
use crate::error::ScanError;

/// Fort type discriminator for stops.
const FORT_TYPE_STOP: i64 = 1;

/// Per-type enable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerOptions {
    /// Produce wild encounters.
    pub parse_pokemon: bool,
    /// Produce stops.
    pub parse_pokestops: bool,
    /// Produce gyms.
    pub parse_gyms: bool,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            parse_pokemon: true,
            parse_pokestops: true,
            parse_gyms: true,
        }
    }
}

/// Flat output of one snapshot.
#[derive(Debug, Clone)]
pub struct NormalizedSnapshot {
    /// Wild encounters keyed by encounter id.
    pub encounters: BTreeMap<EncounterId, WildEncounter>,
    /// Stops keyed by stop id.
    pub stops: BTreeMap<String, Stop>,
    /// Gyms keyed by gym id.
    pub gyms: BTreeMap<String, Gym>,
    /// Freshness marker for the capturing scan point.
    pub scanned_location: ScannedLocation,
}

impl NormalizedSnapshot {
    /// Number of encounter, stop and gym records.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.encounters.len() + self.stops.len() + self.gyms.len()
    }

    /// Builds the event list for every created or updated entity.
    #[must_use]
    pub fn events(&self) -> Vec<EntityEvent> {
        let mut events = Vec::with_capacity(self.entity_count() + 1);
        events.extend(self.encounters.values().cloned().map(EntityEvent::Pokemon));
        events.extend(self.stops.values().cloned().map(EntityEvent::Pokestop));
        events.extend(self.gyms.values().cloned().map(EntityEvent::Gym));
        events.push(EntityEvent::ScannedLocation(self.scanned_location.clone()));
        events
    }
}

/// Converts raw snapshots into [`NormalizedSnapshot`]s. Pure: no I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityNormalizer {
    options: NormalizerOptions,
}

impl EntityNormalizer {
    /// Creates a normalizer with the given enable flags.
    #[must_use]
    pub const fn new(options: NormalizerOptions) -> Self {
        Self { options }
    }

    /// Returns the enable flags.
    #[must_use]
    pub const fn options(&self) -> NormalizerOptions {
        self.options
    }

    /// Normalizes one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Structural`] if the snapshot lacks the cell
    /// container, an entry lacks a required field, or a timestamp is out of
    /// range.
    pub fn normalize(&self, snapshot: &Snapshot) -> Result<NormalizedSnapshot, ScanError> {
        let response: RawMapResponse = serde_json::from_value(snapshot.body.clone())
            .map_err(|e| ScanError::Structural(e.to_string()))?;

        let mut encounters = BTreeMap::new();
        let mut stops = BTreeMap::new();
        let mut gyms = BTreeMap::new();

        for cell in response.responses.get_map_objects.map_cells {
            if self.options.parse_pokemon {
                for raw in &cell.wild_pokemons {
                    if let Some(encounter) = normalize_encounter(raw)? {
                        tracing::debug!(
                            encounter_id = %encounter.encounter_id,
                            pokemon_id = encounter.pokemon_id,
                            latitude = encounter.latitude,
                            longitude = encounter.longitude,
                            disappear_time = %encounter.disappear_time,
                            "encounter normalized"
                        );
                        encounters.insert(encounter.encounter_id, encounter);
                    }
                }
            }

            for fort in &cell.forts {
                match fort.fort_type {
                    Some(FORT_TYPE_STOP) if self.options.parse_pokestops => {
                        let stop = normalize_stop(fort)?;
                        stops.insert(stop.pokestop_id.clone(), stop);
                    }
                    None if self.options.parse_gyms => {
                        let gym = normalize_gym(fort)?;
                        gyms.insert(gym.gym_id.clone(), gym);
                    }
                    _ => {}
                }
            }
        }

        Ok(NormalizedSnapshot {
            encounters,
            stops,
            gyms,
            scanned_location: ScannedLocation::new(snapshot.scan_point, snapshot.captured_at),
        })
    }
}

/// Converts epoch millis to a UTC timestamp, keeping sub-second precision.
/// Storage and webhook payloads truncate to whole seconds.
fn timestamp_from_millis(ms: i64, field: &str) -> Result<DateTime<Utc>, ScanError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ScanError::Structural(format!("{field} out of range: {ms}")))
}

/// Returns `None` for entries that are already hidden.
fn normalize_encounter(raw: &RawWildPokemon) -> Result<Option<WildEncounter>, ScanError> {
    if raw.time_till_hidden_ms <= 0 {
        tracing::debug!(
            encounter_id = raw.encounter_id,
            time_till_hidden_ms = raw.time_till_hidden_ms,
            "skipping hidden encounter"
        );
        return Ok(None);
    }
    let disappear_ms = raw
        .last_modified_timestamp_ms
        .checked_add(raw.time_till_hidden_ms)
        .ok_or_else(|| ScanError::Structural("disappear time overflows".to_string()))?;

    Ok(Some(WildEncounter {
        encounter_id: EncounterId::new(raw.encounter_id),
        spawnpoint_id: raw.spawnpoint_id.clone(),
        pokemon_id: raw.pokemon_data.pokemon_id,
        latitude: raw.latitude,
        longitude: raw.longitude,
        disappear_time: timestamp_from_millis(disappear_ms, "disappear_time")?,
    }))
}

fn normalize_stop(fort: &RawFort) -> Result<Stop, ScanError> {
    let lure = fort
        .lure_info
        .as_ref()
        .map(|info| {
            Ok::<_, ScanError>(Lure {
                expiration: timestamp_from_millis(
                    info.lure_expires_timestamp_ms,
                    "lure_expires_timestamp_ms",
                )?,
                active_pokemon_id: info.active_pokemon_id,
            })
        })
        .transpose()?;

    Ok(Stop {
        pokestop_id: fort.id.clone(),
        enabled: fort.enabled,
        latitude: fort.latitude,
        longitude: fort.longitude,
        last_modified: timestamp_from_millis(
            fort.last_modified_timestamp_ms,
            "last_modified_timestamp_ms",
        )?,
        lure,
    })
}

fn normalize_gym(fort: &RawFort) -> Result<Gym, ScanError> {
    let team_id = match fort.owned_by_team {
        None => Team::Neutral,
        Some(raw) => Team::from_id(raw).unwrap_or_else(|| {
            tracing::warn!(gym_id = %fort.id, team = raw, "unknown team id, treating as neutral");
            Team::Neutral
        }),
    };

    Ok(Gym {
        gym_id: fort.id.clone(),
        team_id,
        guard_pokemon_id: fort.guard_pokemon_id.unwrap_or(0),
        gym_points: fort.gym_points.unwrap_or(0),
        enabled: fort.enabled,
        latitude: fort.latitude,
        longitude: fort.longitude,
        last_modified: timestamp_from_millis(
            fort.last_modified_timestamp_ms,
            "last_modified_timestamp_ms",
        )?,
    })
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::Coordinate;

    fn snapshot(cells: serde_json::Value) -> Snapshot {
        Snapshot::captured_now(
            Coordinate::new(10.0, 20.0),
            json!({ "responses": { "GET_MAP_OBJECTS": { "map_cells": cells } } }),
        )
    }

    fn wild(encounter_id: u64, pokemon_id: u32) -> serde_json::Value {
        json!({
            "encounter_id": encounter_id,
            "spawnpoint_id": "sp",
            "latitude": 10.0,
            "longitude": 20.0,
            "last_modified_timestamp_ms": 1000,
            "time_till_hidden_ms": 5000,
            "pokemon_data": { "pokemon_id": pokemon_id }
        })
    }

    fn normalize(options: NormalizerOptions, snap: &Snapshot) -> NormalizedSnapshot {
        let Ok(n) = EntityNormalizer::new(options).normalize(snap) else {
            panic!("snapshot should normalize");
        };
        n
    }

    #[test]
    fn single_encounter_disappears_at_six_seconds() {
        let snap = snapshot(json!([{ "wild_pokemons": [wild(77, 1)] }]));
        let n = normalize(NormalizerOptions::default(), &snap);

        assert_eq!(n.encounters.len(), 1);
        let Some(encounter) = n.encounters.get(&EncounterId::new(77)) else {
            panic!("encounter missing");
        };
        assert_eq!(encounter.pokemon_id, 1);
        assert_eq!(encounter.disappear_time.timestamp(), 6);
        assert!((encounter.latitude - 10.0).abs() < f64::EPSILON);
        assert!((encounter.longitude - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn forts_are_split_by_type_discriminator() {
        let snap = snapshot(json!([{
            "forts": [
                {
                    "id": "stop-1", "type": 1, "enabled": true,
                    "latitude": 1.0, "longitude": 2.0,
                    "last_modified_timestamp_ms": 5000,
                    "lure_info": { "lure_expires_timestamp_ms": 9000, "active_pokemon_id": 16 }
                },
                {
                    "id": "gym-1", "enabled": true,
                    "latitude": 3.0, "longitude": 4.0,
                    "last_modified_timestamp_ms": 5000
                },
                {
                    "id": "other-1", "type": 2,
                    "latitude": 3.0, "longitude": 4.0,
                    "last_modified_timestamp_ms": 5000
                }
            ]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);

        assert_eq!(n.stops.len(), 1);
        assert_eq!(n.gyms.len(), 1);

        let Some(stop) = n.stops.get("stop-1") else {
            panic!("stop missing");
        };
        let Some(lure) = stop.lure else {
            panic!("lure missing");
        };
        assert_eq!(lure.expiration.timestamp(), 9);
        assert_eq!(lure.active_pokemon_id, 16);

        let Some(gym) = n.gyms.get("gym-1") else {
            panic!("gym missing");
        };
        assert_eq!(gym.team_id, Team::Neutral);
        assert_eq!(gym.guard_pokemon_id, 0);
        assert_eq!(gym.gym_points, 0);
    }

    #[test]
    fn stop_without_lure_has_no_lure_fields() {
        let snap = snapshot(json!([{
            "forts": [{
                "id": "stop-1", "type": 1, "enabled": true,
                "latitude": 1.0, "longitude": 2.0,
                "last_modified_timestamp_ms": 5000
            }]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        assert!(n.stops.get("stop-1").is_some_and(|s| s.lure.is_none()));
    }

    #[test]
    fn owned_gym_keeps_team_and_guard() {
        let snap = snapshot(json!([{
            "forts": [{
                "id": "gym-2", "enabled": true, "owned_by_team": 3,
                "guard_pokemon_id": 149, "gym_points": 4000,
                "latitude": 1.0, "longitude": 2.0,
                "last_modified_timestamp_ms": 5000
            }]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        let Some(gym) = n.gyms.get("gym-2") else {
            panic!("gym missing");
        };
        assert_eq!(gym.team_id, Team::Instinct);
        assert_eq!(gym.guard_pokemon_id, 149);
        assert_eq!(gym.gym_points, 4000);
    }

    #[test]
    fn unknown_team_becomes_neutral() {
        let snap = snapshot(json!([{
            "forts": [{
                "id": "gym-3", "enabled": true, "owned_by_team": 7,
                "latitude": 1.0, "longitude": 2.0,
                "last_modified_timestamp_ms": 5000
            }]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        assert_eq!(n.gyms.get("gym-3").map(|g| g.team_id), Some(Team::Neutral));
    }

    #[test]
    fn timestamps_keep_milliseconds() {
        let snap = snapshot(json!([{
            "forts": [{
                "id": "stop-2", "type": 1, "enabled": true,
                "latitude": 1.0, "longitude": 2.0,
                "last_modified_timestamp_ms": 2999,
                "lure_info": { "lure_expires_timestamp_ms": 4001, "active_pokemon_id": 16 }
            }]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        let Some(stop) = n.stops.get("stop-2") else {
            panic!("stop missing");
        };
        assert_eq!(stop.last_modified.timestamp_millis(), 2999);
        assert_eq!(stop.lure.map(|l| l.expiration.timestamp_millis()), Some(4001));
    }

    #[test]
    fn disabled_types_are_absent() {
        let snap = snapshot(json!([{
            "wild_pokemons": [wild(1, 1), wild(2, 2)],
            "forts": [
                { "id": "s", "type": 1, "latitude": 1.0, "longitude": 2.0, "last_modified_timestamp_ms": 0 },
                { "id": "g", "latitude": 1.0, "longitude": 2.0, "last_modified_timestamp_ms": 0 }
            ]
        }]));

        let only_gyms = NormalizerOptions {
            parse_pokemon: false,
            parse_pokestops: false,
            parse_gyms: true,
        };
        let n = normalize(only_gyms, &snap);
        assert!(n.encounters.is_empty());
        assert!(n.stops.is_empty());
        assert_eq!(n.gyms.len(), 1);

        let all = normalize(NormalizerOptions::default(), &snap);
        assert_eq!(all.encounters.len(), 2);
        assert_eq!(all.stops.len(), 1);
        assert_eq!(all.entity_count(), 4);
    }

    #[test]
    fn counts_span_multiple_cells() {
        let snap = snapshot(json!([
            { "wild_pokemons": [wild(1, 1)] },
            { "wild_pokemons": [wild(2, 2), wild(3, 3)] },
            {}
        ]));
        let n = normalize(NormalizerOptions::default(), &snap);
        assert_eq!(n.encounters.len(), 3);
    }

    #[test]
    fn missing_cell_container_is_structural() {
        let snap = Snapshot::captured_now(
            Coordinate::new(0.0, 0.0),
            json!({ "responses": { "GET_MAP_OBJECTS": {} } }),
        );
        let result = EntityNormalizer::default().normalize(&snap);
        assert!(matches!(result, Err(ScanError::Structural(_))));
    }

    #[test]
    fn hidden_encounters_are_skipped() {
        let mut entry = wild(9, 9);
        if let Some(obj) = entry.as_object_mut() {
            obj.insert("time_till_hidden_ms".to_string(), json!(-1));
        }
        let snap = snapshot(json!([{ "wild_pokemons": [entry] }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        assert!(n.encounters.is_empty());
    }

    #[test]
    fn scanned_location_is_the_scan_point() {
        let snap = snapshot(json!([]));
        let n = normalize(NormalizerOptions::default(), &snap);
        assert_eq!(n.scanned_location.scanned_id, "10,20");
        assert_eq!(n.scanned_location.last_modified, snap.captured_at);
    }

    #[test]
    fn events_cover_every_entity_plus_scan_point() {
        let snap = snapshot(json!([{
            "wild_pokemons": [wild(1, 1)],
            "forts": [{ "id": "g", "latitude": 1.0, "longitude": 2.0, "last_modified_timestamp_ms": 0 }]
        }]));
        let n = normalize(NormalizerOptions::default(), &snap);
        let kinds: Vec<_> = n.events().iter().map(|e| e.kind().as_str()).collect();
        assert_eq!(kinds, vec!["pokemon", "gym", "scanned_location"]);
    }
}
