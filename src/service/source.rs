//! Where snapshots come from.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::domain::{Coordinate, Snapshot};
use crate::error::ScanError;

/// Supplies one snapshot per scan point on demand.
#[async_trait]
pub trait SnapshotSource: Send + Sync + fmt::Debug {
    /// Fetches the current map state around `scan_point`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::Source`] if no snapshot could be obtained.
    async fn fetch(&self, scan_point: Coordinate) -> Result<Snapshot, ScanError>;
}

/// Fetches snapshots as JSON from `GET <endpoint>?lat=..&lon=..`.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpSnapshotSource {
    /// Creates a source for `endpoint`.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoint: Url, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            timeout,
        }
    }

    fn request_url(&self, scan_point: Coordinate) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("lat", &scan_point.latitude.to_string())
            .append_pair("lon", &scan_point.longitude.to_string());
        url
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, scan_point: Coordinate) -> Result<Snapshot, ScanError> {
        let url = self.request_url(scan_point);
        let fetch = async {
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<serde_json::Value>()
                .await
        };
        let body = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| ScanError::Source(format!("snapshot fetch for {scan_point} timed out")))?
            .map_err(|e| ScanError::Source(e.to_string()))?;
        Ok(Snapshot::captured_now(scan_point, body))
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    async fn serve(app: Router) -> Url {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        let Ok(url) = Url::parse(&format!("http://{addr}/snapshot")) else {
            panic!("url");
        };
        url
    }

    #[tokio::test]
    async fn fetch_passes_scan_point_as_query() {
        let app = Router::new().route(
            "/snapshot",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                Json(json!({ "echo": { "lat": q.get("lat"), "lon": q.get("lon") } }))
            }),
        );
        let source = HttpSnapshotSource::new(reqwest::Client::new(), serve(app).await, Duration::from_secs(2));

        let Ok(snapshot) = source.fetch(Coordinate::new(1.5, -2.25)).await else {
            panic!("fetch should succeed");
        };
        assert_eq!(snapshot.scan_point, Coordinate::new(1.5, -2.25));
        let echo = snapshot.body.get("echo");
        assert_eq!(echo.and_then(|e| e.get("lat")).and_then(Value::as_str), Some("1.5"));
        assert_eq!(echo.and_then(|e| e.get("lon")).and_then(Value::as_str), Some("-2.25"));
    }

    #[tokio::test]
    async fn error_status_is_a_source_error() {
        let app = Router::new().route(
            "/snapshot",
            get(|| async { axum::http::StatusCode::SERVICE_UNAVAILABLE }),
        );
        let source = HttpSnapshotSource::new(reqwest::Client::new(), serve(app).await, Duration::from_secs(2));
        let result = source.fetch(Coordinate::new(0.0, 0.0)).await;
        assert!(matches!(result, Err(ScanError::Source(_))));
    }
}
