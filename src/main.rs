//! spawnwatch scanner entry point.
//!
//! Loads configuration, opens the store, wires the notification path and
//! runs the scan workers until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use spawnwatch::config::ScannerConfig;
use spawnwatch::domain::{CoordinateMask, NotificationDeduplicator};
use spawnwatch::ingest::{EntityNormalizer, NormalizerOptions};
use spawnwatch::locale::JsonLocalizer;
use spawnwatch::notify::{
    AlertComposer, Dispatcher, HttpUrlShortener, Profile, SmtpMailer, SmtpSettings, WebhookClient,
};
use spawnwatch::persistence::{EntityStore, RetryPolicy, StoreOptions};
use spawnwatch::service::{
    HttpSnapshotSource, SnapshotPipeline, SnapshotSource, WorkerSettings, spawn_workers,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = ScannerConfig::from_env()?;
    tracing::info!(
        home = %config.home_location,
        workers = config.num_workers,
        scan_points = config.scan_points.len(),
        "starting spawnwatch"
    );

    let profile = Profile::load(&config.profile_path)?;
    let localizer = JsonLocalizer::load(&config.data_path, &config.locales_dir, &config.locale)?;

    // Build persistence layer
    let store_options = StoreOptions {
        chunk_size: config.upsert_chunk_size,
        retry: RetryPolicy::from_config(
            config.storage_retry_max_attempts,
            Duration::from_millis(config.storage_retry_delay_ms),
        ),
        mask: CoordinateMask::from_flag(config.china_masking),
    };
    let store = EntityStore::connect(
        &config.database_url,
        config.database_max_connections,
        Duration::from_secs(config.database_connect_timeout_secs),
        store_options,
    )
    .await
    .context("opening database")?;
    store.migrate().await.context("migrating database")?;

    // Build notification path
    let http = reqwest::Client::new();
    let mut composer = AlertComposer::new(
        config.home_location,
        config.gmaps_key.clone(),
        config.alert_utc_offset,
        Arc::new(localizer),
    );
    if let Some(endpoint) = config.shortener_url.clone() {
        composer = composer.with_shortener(Arc::new(HttpUrlShortener::new(
            http.clone(),
            endpoint,
            config.shortener_api_key.as_deref(),
            Duration::from_millis(config.shortener_timeout_ms),
        )));
    }
    let mailer = SmtpMailer::new(SmtpSettings {
        host: config.smtp_host.clone(),
        port: config.smtp_port,
        username: config.smtp_username.clone(),
        password: config.smtp_password.clone(),
        timeout: Duration::from_secs(config.email_timeout_secs),
    })?;
    let webhooks = WebhookClient::new(
        http.clone(),
        config.webhooks.clone(),
        Duration::from_millis(config.webhook_timeout_ms),
    );
    let dedup = Arc::new(NotificationDeduplicator::new(
        config.dedup_capacity,
        config.dedup_evict_batch,
    ));
    let dispatcher = Dispatcher::new(dedup, profile, composer, Arc::new(mailer), webhooks);

    // Build pipeline and workers
    let normalizer = EntityNormalizer::new(NormalizerOptions {
        parse_pokemon: config.parse_pokemon,
        parse_pokestops: config.parse_pokestops,
        parse_gyms: config.parse_gyms,
    });
    let pipeline = Arc::new(SnapshotPipeline::new(normalizer, store, dispatcher));
    let source: Arc<dyn SnapshotSource> = Arc::new(HttpSnapshotSource::new(
        http,
        config.snapshot_url.clone(),
        Duration::from_secs(config.snapshot_timeout_secs),
    ));
    let settings = WorkerSettings {
        workers: config.num_workers,
        scan_points: config.scan_points.clone(),
        scan_delay: config.scan_delay(),
    };

    let (stop, shutdown) = tokio::sync::watch::channel(false);
    let handles = spawn_workers(pipeline, source, &settings, shutdown);

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested, finishing current passes");
    let _ = stop.send(true);
    for handle in handles {
        if let Err(err) = handle.await {
            tracing::error!(error = %err, "scan worker panicked");
        }
    }

    tracing::info!("spawnwatch stopped");
    Ok(())
}
