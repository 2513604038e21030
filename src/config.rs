//! Scanner configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Numeric and boolean keys fall back to
//! their defaults when unset or unparsable; required keys and coordinate
//! lists fail loudly at startup.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{FixedOffset, Local, Offset};
use url::Url;

use crate::domain::Coordinate;
use crate::error::ScanError;

/// Top-level scanner configuration.
///
/// Loaded once at startup via [`ScannerConfig::from_env`].
#[derive(Clone)]
pub struct ScannerConfig {
    /// SQLite connection string.
    pub database_url: String,
    /// Maximum number of database connections in the pool.
    pub database_max_connections: u32,
    /// Timeout in seconds for acquiring a database connection.
    pub database_connect_timeout_secs: u64,

    /// Endpoint snapshots are fetched from.
    pub snapshot_url: Url,
    /// Bound on a single snapshot fetch, in seconds.
    pub snapshot_timeout_secs: u64,
    /// Operator home coordinate; centre of alert maps.
    pub home_location: Coordinate,
    /// Points the workers scan.
    pub scan_points: Vec<Coordinate>,
    /// Number of scan workers.
    pub num_workers: usize,
    /// Seconds each worker waits between passes.
    pub scan_delay_secs: f64,

    /// Produce wild encounters.
    pub parse_pokemon: bool,
    /// Produce stops.
    pub parse_pokestops: bool,
    /// Produce gyms.
    pub parse_gyms: bool,
    /// Shift read coordinates into the GCJ-02 frame.
    pub china_masking: bool,

    /// Records per upsert statement.
    pub upsert_chunk_size: usize,
    /// Delay between storage retries, in milliseconds.
    pub storage_retry_delay_ms: u64,
    /// Storage retry budget (0 = retry until success).
    pub storage_retry_max_attempts: u32,

    /// Webhook endpoints receiving entity events.
    pub webhooks: Vec<Url>,
    /// Bound on a single webhook post, in milliseconds.
    pub webhook_timeout_ms: u64,

    /// SMTP relay host.
    pub smtp_host: String,
    /// SMTP relay port.
    pub smtp_port: u16,
    /// SMTP login and sender address.
    pub smtp_username: String,
    /// SMTP password.
    pub smtp_password: String,
    /// Bound on a single email delivery, in seconds.
    pub email_timeout_secs: u64,

    /// Static maps API key.
    pub gmaps_key: Option<String>,
    /// URL shortener endpoint; shortening is off when unset.
    pub shortener_url: Option<Url>,
    /// URL shortener API key.
    pub shortener_api_key: Option<String>,
    /// Bound on a single shortening call, in milliseconds.
    pub shortener_timeout_ms: u64,

    /// Operator profile file.
    pub profile_path: PathBuf,
    /// Species catalog file.
    pub data_path: PathBuf,
    /// Directory of `<locale>.min.json` dictionaries.
    pub locales_dir: PathBuf,
    /// Display locale.
    pub locale: String,
    /// Offset alert times are rendered in.
    pub alert_utc_offset: FixedOffset,

    /// Recency set bound.
    pub dedup_capacity: usize,
    /// Ids evicted per recency set overflow.
    pub dedup_evict_batch: usize,
}

impl std::fmt::Debug for ScannerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerConfig")
            .field("database_url", &self.database_url)
            .field("snapshot_url", &self.snapshot_url.as_str())
            .field("home_location", &self.home_location)
            .field("scan_points", &self.scan_points.len())
            .field("num_workers", &self.num_workers)
            .field("webhooks", &self.webhooks.len())
            .field("smtp_host", &self.smtp_host)
            .field("smtp_username", &self.smtp_username)
            .field("locale", &self.locale)
            .finish_non_exhaustive()
    }
}

impl ScannerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Config`] if `SNAPSHOT_URL` or `HOME_LOCATION`
    /// is missing, or any URL or coordinate cannot be parsed.
    pub fn from_env() -> Result<Self, ScanError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let snapshot_url = parse_url("SNAPSHOT_URL", &env.required("SNAPSHOT_URL")?)?;
        let home_location = parse_coordinate("HOME_LOCATION", &env.required("HOME_LOCATION")?)?;
        let scan_points = match env.get("SCAN_POINTS") {
            Some(raw) => parse_scan_points(&raw)?,
            None => vec![home_location],
        };

        let webhooks = env
            .get("WEBHOOKS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_url("WEBHOOKS", s))
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let shortener_url = env
            .get("SHORTENER_URL")
            .map(|raw| parse_url("SHORTENER_URL", &raw))
            .transpose()?;

        let alert_utc_offset = env
            .parse::<i32>("ALERT_UTC_OFFSET_MINUTES")
            .and_then(|minutes| FixedOffset::east_opt(minutes.saturating_mul(60)))
            .unwrap_or_else(|| Local::now().offset().fix());

        Ok(Self {
            database_url: env
                .get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://spawnwatch.db?mode=rwc".to_string()),
            database_max_connections: env.parse_or("DATABASE_MAX_CONNECTIONS", 5),
            database_connect_timeout_secs: env.parse_or("DATABASE_CONNECT_TIMEOUT_SECS", 5),
            snapshot_url,
            snapshot_timeout_secs: env.parse_or("SNAPSHOT_TIMEOUT_SECS", 30),
            home_location,
            scan_points,
            num_workers: env.parse_or("NUM_WORKERS", 1),
            scan_delay_secs: env.parse_or("SCAN_DELAY_SECS", 5.0),
            parse_pokemon: env.bool_or("PARSE_POKEMON", true),
            parse_pokestops: env.bool_or("PARSE_POKESTOPS", true),
            parse_gyms: env.bool_or("PARSE_GYMS", true),
            china_masking: env.bool_or("CHINA_MASKING", false),
            upsert_chunk_size: env.parse_or("UPSERT_CHUNK_SIZE", 120),
            storage_retry_delay_ms: env.parse_or("STORAGE_RETRY_DELAY_MS", 1000),
            storage_retry_max_attempts: env.parse_or("STORAGE_RETRY_MAX_ATTEMPTS", 0),
            webhooks,
            webhook_timeout_ms: env.parse_or("WEBHOOK_TIMEOUT_MS", 1000),
            smtp_host: env
                .get("SMTP_HOST")
                .unwrap_or_else(|| "smtp.gmail.com".to_string()),
            smtp_port: env.parse_or("SMTP_PORT", 587),
            smtp_username: env.get("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env.get("SMTP_PASSWORD").unwrap_or_default(),
            email_timeout_secs: env.parse_or("EMAIL_TIMEOUT_SECS", 10),
            gmaps_key: env.get("GMAPS_KEY"),
            shortener_url,
            shortener_api_key: env.get("SHORTENER_API_KEY"),
            shortener_timeout_ms: env.parse_or("SHORTENER_TIMEOUT_MS", 2000),
            profile_path: env
                .get("PROFILE_PATH")
                .map_or_else(|| PathBuf::from("profile.json"), PathBuf::from),
            data_path: env
                .get("DATA_PATH")
                .map_or_else(|| PathBuf::from("static/data/pokemon.min.json"), PathBuf::from),
            locales_dir: env
                .get("LOCALES_DIR")
                .map_or_else(|| PathBuf::from("static/locales"), PathBuf::from),
            locale: env.get("LOCALE").unwrap_or_else(|| "en".to_string()),
            alert_utc_offset,
            dedup_capacity: env.parse_or("DEDUP_CAPACITY", 10_000),
            dedup_evict_batch: env.parse_or("DEDUP_EVICT_BATCH", 1_000),
        })
    }

    /// Pause between passes of one worker.
    #[must_use]
    pub fn scan_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.scan_delay_secs).unwrap_or(Duration::from_secs(5))
    }
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Returns the trimmed value of `key`, treating blank values as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ScanError> {
        self.get(key)
            .ok_or_else(|| ScanError::Config(format!("{key} is not set")))
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    /// Parses `key` as `T`, returning `default` on missing or invalid values.
    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.parse(key).unwrap_or(default)
    }

    /// Parses `key` as a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
    /// (case-insensitive). Returns `default` otherwise.
    fn bool_or(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("true" | "1") => true,
            Some("false" | "0") => false,
            _ => default,
        }
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url, ScanError> {
    Url::parse(raw).map_err(|e| ScanError::Config(format!("{key}: invalid url {raw:?}: {e}")))
}

fn parse_coordinate(key: &str, raw: &str) -> Result<Coordinate, ScanError> {
    raw.parse()
        .map_err(|e| ScanError::Config(format!("{key}: {e}")))
}

fn parse_scan_points(raw: &str) -> Result<Vec<Coordinate>, ScanError> {
    let points = raw
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_coordinate("SCAN_POINTS", s))
        .collect::<Result<Vec<_>, _>>()?;
    if points.is_empty() {
        return Err(ScanError::Config("SCAN_POINTS: no scan points".to_string()));
    }
    Ok(points)
}
