//! Table mappings for normalized entities.
//!
//! [`StoredEntity`] describes how a record type is laid out in its table so
//! the store can build one generic chunked upsert. The `*Row` tuples are the
//! raw column shapes read back by the query side.

use chrono::{DateTime, Utc};
use sqlx::Sqlite;
use sqlx::query_builder::Separated;

use crate::domain::{
    EncounterId, EntityKind, Gym, Lure, ScannedLocation, SpeciesId, Stop, Team, WildEncounter,
};
use crate::error::StoreError;

/// A record type with a dedicated table keyed by its first column.
pub trait StoredEntity {
    /// Entity kind, used for logging and error reporting.
    const KIND: EntityKind;
    /// Table name.
    const TABLE: &'static str;
    /// Column names in bind order. The first column is the primary key.
    const COLUMNS: &'static [&'static str];

    /// Binds this record's values in [`Self::COLUMNS`] order.
    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>);
}

impl StoredEntity for WildEncounter {
    const KIND: EntityKind = EntityKind::Pokemon;
    const TABLE: &'static str = "pokemon";
    const COLUMNS: &'static [&'static str] = &[
        "encounter_id",
        "spawnpoint_id",
        "pokemon_id",
        "latitude",
        "longitude",
        "disappear_time",
    ];

    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.encounter_id.encoded())
            .push_bind(self.spawnpoint_id.clone())
            .push_bind(i64::from(self.pokemon_id))
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.disappear_time.timestamp());
    }
}

impl StoredEntity for Stop {
    const KIND: EntityKind = EntityKind::Pokestop;
    const TABLE: &'static str = "pokestop";
    const COLUMNS: &'static [&'static str] = &[
        "pokestop_id",
        "enabled",
        "latitude",
        "longitude",
        "last_modified",
        "lure_expiration",
        "active_pokemon_id",
    ];

    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.pokestop_id.clone())
            .push_bind(self.enabled)
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.last_modified.timestamp())
            .push_bind(self.lure.map(|l| l.expiration.timestamp()))
            .push_bind(self.lure.map(|l| i64::from(l.active_pokemon_id)));
    }
}

impl StoredEntity for Gym {
    const KIND: EntityKind = EntityKind::Gym;
    const TABLE: &'static str = "gym";
    const COLUMNS: &'static [&'static str] = &[
        "gym_id",
        "team_id",
        "guard_pokemon_id",
        "gym_points",
        "enabled",
        "latitude",
        "longitude",
        "last_modified",
    ];

    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.gym_id.clone())
            .push_bind(i64::from(self.team_id.id()))
            .push_bind(i64::from(self.guard_pokemon_id))
            .push_bind(self.gym_points)
            .push_bind(self.enabled)
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.last_modified.timestamp());
    }
}

impl StoredEntity for ScannedLocation {
    const KIND: EntityKind = EntityKind::ScannedLocation;
    const TABLE: &'static str = "scannedlocation";
    const COLUMNS: &'static [&'static str] =
        &["scanned_id", "latitude", "longitude", "last_modified"];

    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Sqlite, &'static str>) {
        row.push_bind(self.scanned_id.clone())
            .push_bind(self.latitude)
            .push_bind(self.longitude)
            .push_bind(self.last_modified.timestamp());
    }
}

/// `pokemon` row: id, spawn point, species, lat, lon, disappear time.
pub type EncounterRow = (String, String, i64, f64, f64, i64);
/// `pokestop` row: id, enabled, lat, lon, modified, lure expiry, lure species.
pub type StopRow = (String, bool, f64, f64, i64, Option<i64>, Option<i64>);
/// `gym` row: id, team, guard, points, enabled, lat, lon, modified.
pub type GymRow = (String, i64, i64, i64, bool, f64, f64, i64);
/// `scannedlocation` row: key, lat, lon, modified.
pub type ScannedLocationRow = (String, f64, f64, i64);

fn corrupt(table: &'static str, reason: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        table,
        reason: reason.into(),
    }
}

fn from_epoch(secs: i64, table: &'static str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| corrupt(table, format!("timestamp {secs}")))
}

fn species(raw: i64, table: &'static str) -> Result<SpeciesId, StoreError> {
    SpeciesId::try_from(raw).map_err(|_| corrupt(table, format!("species id {raw}")))
}

impl TryFrom<EncounterRow> for WildEncounter {
    type Error = StoreError;

    fn try_from(row: EncounterRow) -> Result<Self, Self::Error> {
        let (encounter_id, spawnpoint_id, pokemon_id, latitude, longitude, disappear_time) = row;
        Ok(Self {
            encounter_id: encounter_id
                .parse::<EncounterId>()
                .map_err(|e| corrupt(Self::TABLE, e.to_string()))?,
            spawnpoint_id,
            pokemon_id: species(pokemon_id, Self::TABLE)?,
            latitude,
            longitude,
            disappear_time: from_epoch(disappear_time, Self::TABLE)?,
        })
    }
}

impl TryFrom<StopRow> for Stop {
    type Error = StoreError;

    fn try_from(row: StopRow) -> Result<Self, Self::Error> {
        let (pokestop_id, enabled, latitude, longitude, last_modified, lure_expiration, active) =
            row;
        let lure = match (lure_expiration, active) {
            (Some(expiration), Some(active_pokemon_id)) => Some(Lure {
                expiration: from_epoch(expiration, Self::TABLE)?,
                active_pokemon_id: species(active_pokemon_id, Self::TABLE)?,
            }),
            (None, None) => None,
            _ => return Err(corrupt(Self::TABLE, format!("half-set lure on {pokestop_id}"))),
        };
        Ok(Self {
            pokestop_id,
            enabled,
            latitude,
            longitude,
            last_modified: from_epoch(last_modified, Self::TABLE)?,
            lure,
        })
    }
}

impl TryFrom<GymRow> for Gym {
    type Error = StoreError;

    fn try_from(row: GymRow) -> Result<Self, Self::Error> {
        let (gym_id, team, guard, gym_points, enabled, latitude, longitude, last_modified) = row;
        Ok(Self {
            team_id: Team::from_id(team)
                .ok_or_else(|| corrupt(Self::TABLE, format!("team id {team}")))?,
            gym_id,
            guard_pokemon_id: species(guard, Self::TABLE)?,
            gym_points,
            enabled,
            latitude,
            longitude,
            last_modified: from_epoch(last_modified, Self::TABLE)?,
        })
    }
}

impl TryFrom<ScannedLocationRow> for ScannedLocation {
    type Error = StoreError;

    fn try_from(row: ScannedLocationRow) -> Result<Self, Self::Error> {
        let (scanned_id, latitude, longitude, last_modified) = row;
        Ok(Self {
            scanned_id,
            latitude,
            longitude,
            last_modified: from_epoch(last_modified, Self::TABLE)?,
        })
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn primary_key_is_first_column() {
        assert_eq!(WildEncounter::COLUMNS.first(), Some(&"encounter_id"));
        assert_eq!(Stop::COLUMNS.first(), Some(&"pokestop_id"));
        assert_eq!(Gym::COLUMNS.first(), Some(&"gym_id"));
        assert_eq!(ScannedLocation::COLUMNS.first(), Some(&"scanned_id"));
    }

    #[test]
    fn default_chunk_stays_under_sqlite_variable_limit() {
        for columns in [
            WildEncounter::COLUMNS.len(),
            Stop::COLUMNS.len(),
            Gym::COLUMNS.len(),
            ScannedLocation::COLUMNS.len(),
        ] {
            assert!(columns * crate::persistence::DEFAULT_CHUNK_SIZE < 999);
        }
    }

    #[test]
    fn half_set_lure_row_is_corrupt() {
        let row: StopRow = ("s".to_string(), true, 0.0, 0.0, 0, Some(10), None);
        assert!(matches!(
            Stop::try_from(row),
            Err(StoreError::CorruptRow { table: "pokestop", .. })
        ));
    }

    #[test]
    fn unknown_team_row_is_corrupt() {
        let row: GymRow = ("g".to_string(), 9, 0, 0, true, 0.0, 0.0, 0);
        assert!(Gym::try_from(row).is_err());
    }

    #[test]
    fn encounter_row_decodes_id() {
        let row: EncounterRow = ("AAAAAAAAAAE=".to_string(), "sp".to_string(), 4, 1.0, 2.0, 6);
        let Ok(encounter) = WildEncounter::try_from(row) else {
            panic!("row should decode");
        };
        assert_eq!(encounter.encounter_id.raw(), 1);
        assert_eq!(encounter.disappear_time.timestamp(), 6);
    }
}
