//! SQLite implementation of the entity store.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::filter::SpeciesFilter;
use super::models::{EncounterRow, GymRow, ScannedLocationRow, StopRow, StoredEntity};
use super::retry::RetryPolicy;
use crate::domain::coords::BoundingBox;
use crate::domain::{
    Coordinate, CoordinateMask, EntityKind, Gym, ScannedLocation, Stop, WildEncounter,
};
use crate::error::StoreError;
use crate::locale::SpeciesLocalizer;

/// Default number of records per upsert statement.
pub const DEFAULT_CHUNK_SIZE: usize = 120;

/// SQLite's default limit on bound parameters per statement.
pub const MAX_BIND_PARAMETERS: usize = 32_766;

/// Window in which a scanned location counts as fresh.
pub const RECENT_SCAN_WINDOW: chrono::Duration = chrono::Duration::minutes(15);

/// Tunables for [`EntityStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOptions {
    /// Records per upsert statement, capped per kind so one statement
    /// never binds more than [`MAX_BIND_PARAMETERS`] values.
    pub chunk_size: usize,
    /// Retry policy for transient errors.
    pub retry: RetryPolicy,
    /// Coordinate presentation mode for reads.
    pub mask: CoordinateMask,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            mask: CoordinateMask::None,
        }
    }
}

/// Outcome of one successful upsert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertReport {
    /// Entity kind written.
    pub kind: EntityKind,
    /// Records committed.
    pub committed: usize,
    /// Statements executed.
    pub chunks: usize,
    /// Transient failures retried along the way.
    pub retries: u32,
}

/// Idempotent, chunked entity store backed by a shared `SqlitePool`.
///
/// Writes keep coordinates in the stored frame; reads return them through
/// the configured [`CoordinateMask`].
#[derive(Debug, Clone)]
pub struct EntityStore {
    pool: SqlitePool,
    options: StoreOptions,
}

impl EntityStore {
    /// Creates a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: SqlitePool, options: StoreOptions) -> Self {
        Self { pool, options }
    }

    /// Opens (creating if needed) the database at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] if the URL is invalid or the pool
    /// cannot be opened.
    pub async fn connect(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let connect_options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(acquire_timeout);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(connect_options)
            .await?;
        Ok(Self::new(pool, options))
    }

    /// Opens a private in-memory database with the schema applied.
    ///
    /// The pool is pinned to one never-expiring connection, since every
    /// SQLite in-memory connection is its own database.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the database cannot be opened or migrated.
    pub async fn in_memory(options: StoreOptions) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self::new(pool, options);
        store.migrate().await?;
        Ok(store)
    }

    /// Applies pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Migrate`] on failure.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the store options.
    #[must_use]
    pub const fn options(&self) -> StoreOptions {
        self.options
    }

    /// Inserts or fully replaces `records`, keyed by primary id.
    ///
    /// Records are written in chunks of [`StoreOptions::chunk_size`]. A
    /// transient error retries the failing chunk per the retry policy; any
    /// other error aborts the call. Chunks committed before the abort stay
    /// committed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UpsertAborted`] with the committed count when
    /// a chunk fails for good.
    pub async fn upsert<'a, E, I>(&self, records: I) -> Result<UpsertReport, StoreError>
    where
        E: StoredEntity + 'a,
        I: IntoIterator<Item = &'a E>,
    {
        let kind = E::KIND;
        let records: Vec<&E> = records.into_iter().collect();
        let attempted = records.len();
        let mut report = UpsertReport {
            kind,
            committed: 0,
            chunks: 0,
            retries: 0,
        };
        if records.is_empty() {
            return Ok(report);
        }

        let mut conn = self.acquire(kind, attempted).await?;

        for chunk in records.chunks(chunk_limit::<E>(self.options.chunk_size)) {
            let mut attempts: u32 = 0;
            loop {
                attempts = attempts.saturating_add(1);
                let Err(err) = execute_chunk(&mut conn, chunk).await else {
                    break;
                };
                if let Some(delay) = self.options.retry.backoff(attempts, &err) {
                    report.retries = report.retries.saturating_add(1);
                    tracing::warn!(%kind, attempts, error = %err, "transient storage error, retrying chunk");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                tracing::error!(
                    %kind,
                    attempted,
                    committed = report.committed,
                    error = %err,
                    "upsert aborted"
                );
                return Err(StoreError::UpsertAborted {
                    kind,
                    attempted,
                    committed: report.committed,
                    source: err,
                });
            }
            report.committed += chunk.len();
            report.chunks += 1;
        }

        tracing::info!(%kind, count = report.committed, chunks = report.chunks, "upserted");
        Ok(report)
    }

    async fn acquire(
        &self,
        kind: EntityKind,
        attempted: usize,
    ) -> Result<PoolConnection<Sqlite>, StoreError> {
        let mut attempts: u32 = 0;
        loop {
            attempts = attempts.saturating_add(1);
            match self.pool.acquire().await {
                Ok(conn) => return Ok(conn),
                Err(err) => match self.options.retry.backoff(attempts, &err) {
                    Some(delay) => {
                        tracing::warn!(%kind, attempts, error = %err, "connection unavailable, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(StoreError::UpsertAborted {
                            kind,
                            attempted,
                            committed: 0,
                            source: err,
                        });
                    }
                },
            }
        }
    }

    /// Returns the number of stored rows of `E`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Query`] on database failure.
    pub async fn count<E: StoredEntity>(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", E::TABLE))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Loads encounters still visible at `now`, hiding species rejected by
    /// `filter`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure or corrupt rows.
    pub async fn active_encounters(
        &self,
        now: DateTime<Utc>,
        filter: &SpeciesFilter,
        names: &dyn SpeciesLocalizer,
    ) -> Result<Vec<WildEncounter>, StoreError> {
        let rows = sqlx::query_as::<_, EncounterRow>(
            "SELECT encounter_id, spawnpoint_id, pokemon_id, latitude, longitude, disappear_time \
             FROM pokemon WHERE disappear_time > ? ORDER BY disappear_time ASC, encounter_id ASC",
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;

        let mut encounters = Vec::with_capacity(rows.len());
        for row in rows {
            let encounter = self.present_encounter(WildEncounter::try_from(row)?);
            if filter.admits(encounter.pokemon_id, &names.name(encounter.pokemon_id)) {
                encounters.push(encounter);
            }
        }
        Ok(encounters)
    }

    /// Loads encounters visible at `now` inside `bounds` (stored frame).
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure or corrupt rows.
    pub async fn encounters_in_bounds(
        &self,
        bounds: BoundingBox,
        now: DateTime<Utc>,
    ) -> Result<Vec<WildEncounter>, StoreError> {
        let rows = sqlx::query_as::<_, EncounterRow>(
            "SELECT encounter_id, spawnpoint_id, pokemon_id, latitude, longitude, disappear_time \
             FROM pokemon \
             WHERE latitude BETWEEN ? AND ? AND longitude BETWEEN ? AND ? AND disappear_time > ?",
        )
        .bind(bounds.south)
        .bind(bounds.north)
        .bind(bounds.west)
        .bind(bounds.east)
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| WildEncounter::try_from(row).map(|e| self.present_encounter(e)))
            .collect()
    }

    /// Loads all stops.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure or corrupt rows.
    pub async fn stops(&self) -> Result<Vec<Stop>, StoreError> {
        let rows = sqlx::query_as::<_, StopRow>(
            "SELECT pokestop_id, enabled, latitude, longitude, last_modified, \
             lure_expiration, active_pokemon_id FROM pokestop",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Stop::try_from(row).map(|mut stop| {
                    let c = self.options.mask.apply(stop.coordinate());
                    stop.latitude = c.latitude;
                    stop.longitude = c.longitude;
                    stop
                })
            })
            .collect()
    }

    /// Loads all gyms.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure or corrupt rows.
    pub async fn gyms(&self) -> Result<Vec<Gym>, StoreError> {
        let rows = sqlx::query_as::<_, GymRow>(
            "SELECT gym_id, team_id, guard_pokemon_id, gym_points, enabled, \
             latitude, longitude, last_modified FROM gym",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Gym::try_from(row).map(|mut gym| {
                    let c = self.options.mask.apply(gym.coordinate());
                    gym.latitude = c.latitude;
                    gym.longitude = c.longitude;
                    gym
                })
            })
            .collect()
    }

    /// Loads scan points refreshed within [`RECENT_SCAN_WINDOW`] of `now`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] on database failure or corrupt rows.
    pub async fn recent_scanned_locations(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScannedLocation>, StoreError> {
        let rows = sqlx::query_as::<_, ScannedLocationRow>(
            "SELECT scanned_id, latitude, longitude, last_modified \
             FROM scannedlocation WHERE last_modified >= ?",
        )
        .bind((now - RECENT_SCAN_WINDOW).timestamp())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                ScannedLocation::try_from(row).map(|mut loc| {
                    let c = self
                        .options
                        .mask
                        .apply(Coordinate::new(loc.latitude, loc.longitude));
                    loc.latitude = c.latitude;
                    loc.longitude = c.longitude;
                    loc
                })
            })
            .collect()
    }

    fn present_encounter(&self, mut encounter: WildEncounter) -> WildEncounter {
        let c = self.options.mask.apply(encounter.coordinate());
        encounter.latitude = c.latitude;
        encounter.longitude = c.longitude;
        encounter
    }
}

/// Clamps a requested chunk size to `1..=` the rows of `E` that fit in
/// one statement.
fn chunk_limit<E: StoredEntity>(requested: usize) -> usize {
    let ceiling = (MAX_BIND_PARAMETERS / E::COLUMNS.len().max(1)).max(1);
    requested.clamp(1, ceiling)
}

/// Writes one chunk as a single multi-row upsert statement.
async fn execute_chunk<E: StoredEntity>(
    conn: &mut SqliteConnection,
    chunk: &[&E],
) -> Result<(), sqlx::Error> {
    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "INSERT INTO {} ({}) ",
        E::TABLE,
        E::COLUMNS.join(", ")
    ));
    qb.push_values(chunk, |mut row, record| record.push_values(&mut row));
    qb.push(conflict_clause(E::COLUMNS));
    qb.build().execute(conn).await?;
    Ok(())
}

/// `ON CONFLICT` clause replacing every non-key column.
fn conflict_clause(columns: &[&str]) -> String {
    match columns.split_first() {
        Some((key, rest)) if !rest.is_empty() => {
            let assignments: Vec<String> =
                rest.iter().map(|c| format!("{c} = excluded.{c}")).collect();
            format!(" ON CONFLICT ({key}) DO UPDATE SET {}", assignments.join(", "))
        }
        Some((key, _)) => format!(" ON CONFLICT ({key}) DO NOTHING"),
        None => String::new(),
    }
}
