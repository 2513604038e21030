//! Normalized map entities.
//!
//! These are the flat records produced from a nested snapshot. Their serde
//! representation is also the webhook `message` shape: attribute names match
//! the stored columns and time fields are Unix-epoch seconds.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use super::EncounterId;
use super::coords::Coordinate;

/// Numeric species identifier (national dex number).
pub type SpeciesId = u32;

/// A wild encounter visible on the map until `disappear_time`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WildEncounter {
    /// Encounter identity.
    pub encounter_id: EncounterId,
    /// Spawn point the encounter appeared at.
    pub spawnpoint_id: String,
    /// Species identifier.
    pub pokemon_id: SpeciesId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Absolute disappearance time (UTC, whole seconds).
    #[serde(with = "chrono::serde::ts_seconds")]
    pub disappear_time: DateTime<Utc>,
}

impl WildEncounter {
    /// Returns the encounter position.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// An active lure on a stop. Expiration and lured species always travel
/// together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lure {
    /// When the lure runs out.
    pub expiration: DateTime<Utc>,
    /// Species attracted by the lure.
    pub active_pokemon_id: SpeciesId,
}

/// A stop fort.
#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    /// Stop identity.
    pub pokestop_id: String,
    /// Whether the stop is enabled.
    pub enabled: bool,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Last modification time reported by the API.
    pub last_modified: DateTime<Utc>,
    /// Lure state, if lured.
    pub lure: Option<Lure>,
}

impl Stop {
    /// Returns the stop position.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

#[derive(Serialize)]
struct StopMessage<'a> {
    pokestop_id: &'a str,
    enabled: bool,
    latitude: f64,
    longitude: f64,
    last_modified: i64,
    lure_expiration: Option<i64>,
    active_pokemon_id: Option<SpeciesId>,
}

impl Serialize for Stop {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        StopMessage {
            pokestop_id: &self.pokestop_id,
            enabled: self.enabled,
            latitude: self.latitude,
            longitude: self.longitude,
            last_modified: self.last_modified.timestamp(),
            lure_expiration: self.lure.map(|l| l.expiration.timestamp()),
            active_pokemon_id: self.lure.map(|l| l.active_pokemon_id),
        }
        .serialize(serializer)
    }
}

/// Team controlling a gym.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Team {
    /// Uncontested.
    #[default]
    Neutral,
    /// Team Mystic.
    Mystic,
    /// Team Valor.
    Valor,
    /// Team Instinct.
    Instinct,
}

impl Team {
    /// Wire/storage discriminant.
    #[must_use]
    pub const fn id(self) -> u8 {
        match self {
            Self::Neutral => 0,
            Self::Mystic => 1,
            Self::Valor => 2,
            Self::Instinct => 3,
        }
    }

    /// Maps a wire discriminant back to a team. Unknown values yield `None`.
    #[must_use]
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            0 => Some(Self::Neutral),
            1 => Some(Self::Mystic),
            2 => Some(Self::Valor),
            3 => Some(Self::Instinct),
            _ => None,
        }
    }
}

impl Serialize for Team {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.id())
    }
}

/// A gym fort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gym {
    /// Gym identity.
    pub gym_id: String,
    /// Controlling team.
    pub team_id: Team,
    /// Species guarding the gym (0 when unguarded).
    pub guard_pokemon_id: SpeciesId,
    /// Prestige point total.
    pub gym_points: i64,
    /// Whether the gym is enabled.
    pub enabled: bool,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Last modification time reported by the API.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_modified: DateTime<Utc>,
}

impl Gym {
    /// Returns the gym position.
    #[must_use]
    pub const fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Freshness marker for one scan point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScannedLocation {
    /// Coordinate-derived key (`"lat,lon"`).
    pub scanned_id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Capture time of the snapshot that scanned this point.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_modified: DateTime<Utc>,
}

impl ScannedLocation {
    /// Builds the record for a scan point captured at `at`.
    #[must_use]
    pub fn new(point: Coordinate, at: DateTime<Utc>) -> Self {
        Self {
            scanned_id: point.key(),
            latitude: point.latitude,
            longitude: point.longitude,
            last_modified: at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        let Some(t) = DateTime::from_timestamp(secs, 0) else {
            panic!("valid timestamp");
        };
        t
    }

    #[test]
    fn team_ids_round_trip() {
        for team in [Team::Neutral, Team::Mystic, Team::Valor, Team::Instinct] {
            assert_eq!(Team::from_id(i64::from(team.id())), Some(team));
        }
        assert_eq!(Team::from_id(4), None);
        assert_eq!(Team::from_id(-1), None);
    }

    #[test]
    fn encounter_serializes_epoch_seconds() {
        let encounter = WildEncounter {
            encounter_id: EncounterId::new(1),
            spawnpoint_id: "sp1".to_string(),
            pokemon_id: 25,
            latitude: 1.0,
            longitude: 2.0,
            disappear_time: at(6),
        };
        let value = serde_json::to_value(&encounter).unwrap_or_default();
        assert_eq!(value.get("disappear_time"), Some(&serde_json::json!(6)));
        assert_eq!(value.get("pokemon_id"), Some(&serde_json::json!(25)));
        assert_eq!(value.get("encounter_id"), Some(&serde_json::json!("AAAAAAAAAAE=")));
    }

    #[test]
    fn unlured_stop_serializes_null_lure_fields() {
        let stop = Stop {
            pokestop_id: "s1".to_string(),
            enabled: true,
            latitude: 1.0,
            longitude: 2.0,
            last_modified: at(100),
            lure: None,
        };
        let value = serde_json::to_value(&stop).unwrap_or_default();
        assert_eq!(value.get("lure_expiration"), Some(&serde_json::Value::Null));
        assert_eq!(value.get("active_pokemon_id"), Some(&serde_json::Value::Null));
        assert_eq!(value.get("last_modified"), Some(&serde_json::json!(100)));
    }

    #[test]
    fn lured_stop_serializes_both_lure_fields() {
        let stop = Stop {
            pokestop_id: "s1".to_string(),
            enabled: true,
            latitude: 1.0,
            longitude: 2.0,
            last_modified: at(100),
            lure: Some(Lure {
                expiration: at(1900),
                active_pokemon_id: 16,
            }),
        };
        let value = serde_json::to_value(&stop).unwrap_or_default();
        assert_eq!(value.get("lure_expiration"), Some(&serde_json::json!(1900)));
        assert_eq!(value.get("active_pokemon_id"), Some(&serde_json::json!(16)));
    }

    #[test]
    fn gym_team_serializes_as_number() {
        let gym = Gym {
            gym_id: "g1".to_string(),
            team_id: Team::Valor,
            guard_pokemon_id: 0,
            gym_points: 0,
            enabled: true,
            latitude: 0.0,
            longitude: 0.0,
            last_modified: at(0),
        };
        let value = serde_json::to_value(&gym).unwrap_or_default();
        assert_eq!(value.get("team_id"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn scanned_location_is_keyed_by_coordinate() {
        let loc = ScannedLocation::new(Coordinate::new(10.0, 20.0), at(5));
        assert_eq!(loc.scanned_id, "10,20");
    }
}
