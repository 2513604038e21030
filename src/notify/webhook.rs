//! Structured event delivery to webhook endpoints.

use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use url::Url;

use crate::domain::EntityEvent;
use crate::error::NotifyError;

/// Default bound on a single webhook post.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(1);

/// Default cap on concurrent posts per [`WebhookClient::post_all`] call.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// Posts [`EntityEvent`]s to every configured endpoint.
///
/// Delivery is best-effort: failures and timeouts are logged and never
/// returned to the caller.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    endpoints: Vec<Url>,
    timeout: Duration,
    max_in_flight: usize,
}

/// Outcome counts of one [`WebhookClient::post_all`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebhookReport {
    /// Posts answered with a success status.
    pub delivered: usize,
    /// Posts that failed or timed out.
    pub failed: usize,
}

impl WebhookClient {
    /// Creates a client for `endpoints`.
    #[must_use]
    pub fn new(client: reqwest::Client, endpoints: Vec<Url>, timeout: Duration) -> Self {
        Self {
            client,
            endpoints,
            timeout,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    /// Caps concurrent posts; zero is treated as one.
    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    /// Configured endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[Url] {
        &self.endpoints
    }

    /// Posts `event` to one endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Timeout`] if the post exceeds the bound and
    /// [`NotifyError::Webhook`] for transport errors or error statuses.
    pub async fn post(&self, endpoint: &Url, event: &EntityEvent) -> Result<(), NotifyError> {
        let request = self.client.post(endpoint.clone()).json(event).send();
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| NotifyError::Timeout("webhook"))?
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError::Webhook {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    /// Posts every event to every endpoint, at most `max_in_flight` at a
    /// time.
    pub async fn post_all(&self, events: &[EntityEvent]) -> WebhookReport {
        if self.endpoints.is_empty() || events.is_empty() {
            return WebhookReport::default();
        }

        let targets: Vec<(&Url, &EntityEvent)> = events
            .iter()
            .flat_map(|event| self.endpoints.iter().map(move |endpoint| (endpoint, event)))
            .collect();
        let deliveries: Vec<_> = targets
            .into_iter()
            .map(|(endpoint, event)| async move {
                (endpoint, event, self.post(endpoint, event).await)
            })
            .collect();

        stream::iter(deliveries)
            .buffer_unordered(self.max_in_flight)
            .fold(WebhookReport::default(), |mut report, (endpoint, event, result)| async move {
                match result {
                    Ok(()) => report.delivered += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(
                            endpoint = %endpoint,
                            kind = %event.kind(),
                            id = %event.entity_id(),
                            error = %err,
                            "webhook delivery failed"
                        );
                    }
                }
                report
            })
            .await
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;

    use crate::domain::{Coordinate, ScannedLocation};

    type Received = Arc<Mutex<Vec<Value>>>;

    async fn bind() -> (tokio::net::TcpListener, Url) {
        let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
            panic!("bind");
        };
        let Ok(addr) = listener.local_addr() else {
            panic!("local addr");
        };
        let Ok(url) = Url::parse(&format!("http://{addr}/hook")) else {
            panic!("url");
        };
        (listener, url)
    }

    async fn recording_endpoint() -> (Url, Received) {
        let received: Received = Arc::default();
        let app = Router::new()
            .route(
                "/hook",
                post(|State(seen): State<Received>, Json(body): Json<Value>| async move {
                    if let Ok(mut seen) = seen.lock() {
                        seen.push(body);
                    }
                }),
            )
            .with_state(Arc::clone(&received));
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (url, received)
    }

    fn event() -> EntityEvent {
        let Some(at) = Utc.timestamp_opt(1_700_000_000, 0).single() else {
            panic!("valid time");
        };
        EntityEvent::ScannedLocation(ScannedLocation::new(Coordinate::new(1.0, 2.0), at))
    }

    #[tokio::test]
    async fn posts_typed_events_to_every_endpoint() {
        let (a, seen_a) = recording_endpoint().await;
        let (b, seen_b) = recording_endpoint().await;
        let client = WebhookClient::new(reqwest::Client::new(), vec![a, b], Duration::from_secs(2));

        let report = client.post_all(&[event()]).await;
        assert_eq!(report, WebhookReport { delivered: 2, failed: 0 });

        for seen in [seen_a, seen_b] {
            let Ok(seen) = seen.lock() else {
                panic!("lock");
            };
            assert_eq!(seen.len(), 1);
            let Some(body) = seen.first() else {
                panic!("one body");
            };
            assert_eq!(body.get("type").and_then(Value::as_str), Some("scanned_location"));
            assert!(body.get("message").is_some());
        }
    }

    #[derive(Debug, Default)]
    struct InFlight {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[tokio::test]
    async fn concurrent_posts_are_capped() {
        let in_flight = Arc::new(InFlight::default());
        let app = Router::new()
            .route(
                "/hook",
                post(|State(load): State<Arc<InFlight>>| async move {
                    let now = load.current.fetch_add(1, Ordering::SeqCst) + 1;
                    load.peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    load.current.fetch_sub(1, Ordering::SeqCst);
                }),
            )
            .with_state(Arc::clone(&in_flight));
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let client = WebhookClient::new(reqwest::Client::new(), vec![url], Duration::from_secs(2))
            .with_max_in_flight(2);
        let events = vec![event(); 6];
        let report = client.post_all(&events).await;

        assert_eq!(report, WebhookReport { delivered: 6, failed: 0 });
        let peak = in_flight.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency was {peak}");
    }

    #[tokio::test]
    async fn silent_endpoint_times_out_without_blocking_others() {
        let (silent, silent_url) = bind().await;
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = silent.accept().await {
                held.push(socket);
            }
        });
        let (live, seen) = recording_endpoint().await;

        let client = WebhookClient::new(
            reqwest::Client::new(),
            vec![silent_url, live],
            Duration::from_millis(200),
        );
        let report = client.post_all(&[event()]).await;
        assert_eq!(report, WebhookReport { delivered: 1, failed: 1 });
        assert_eq!(seen.lock().map(|s| s.len()).unwrap_or_default(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_webhook_error() {
        let (listener, url) = bind().await;
        drop(listener);
        let client = WebhookClient::new(reqwest::Client::new(), vec![url.clone()], Duration::from_secs(1));
        let result = client.post(&url, &event()).await;
        assert!(matches!(result, Err(NotifyError::Webhook { .. })));
    }

    #[tokio::test]
    async fn nothing_to_do_without_endpoints() {
        let client = WebhookClient::new(reqwest::Client::new(), Vec::new(), DEFAULT_WEBHOOK_TIMEOUT);
        assert_eq!(client.post_all(&[event()]).await, WebhookReport::default());
    }
}
