//! URL shortening collaborator.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::NotifyError;

/// Best-effort URL shortener.
#[async_trait]
pub trait UrlShortener: Send + Sync + fmt::Debug {
    /// Returns a shortened form of `url`.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] if the collaborator is unreachable, times
    /// out, or answers without a short URL.
    async fn shorten(&self, url: &str) -> Result<String, NotifyError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ShortenRequest<'a> {
    long_url: &'a str,
}

#[derive(Deserialize)]
struct ShortenResponse {
    id: String,
}

/// Shortener speaking the `{"longUrl"} -> {"id"}` JSON protocol.
#[derive(Debug, Clone)]
pub struct HttpUrlShortener {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpUrlShortener {
    /// Creates a shortener posting to `endpoint`, with `api_key` appended
    /// as the `key` query parameter when present.
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        mut endpoint: Url,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Self {
        if let Some(key) = api_key {
            endpoint.query_pairs_mut().append_pair("key", key);
        }
        Self {
            client,
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl UrlShortener for HttpUrlShortener {
    async fn shorten(&self, url: &str) -> Result<String, NotifyError> {
        let request = self
            .client
            .post(self.endpoint.clone())
            .json(&ShortenRequest { long_url: url })
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| NotifyError::Timeout("url shortener"))?
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| NotifyError::Shortener(e.to_string()))?;

        let body: ShortenResponse = tokio::time::timeout(self.timeout, response.json())
            .await
            .map_err(|_| NotifyError::Timeout("url shortener"))?
            .map_err(|e| NotifyError::Shortener(e.to_string()))?;

        if body.id.is_empty() {
            return Err(NotifyError::Shortener("empty short url".to_string()));
        }
        Ok(body.id)
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    use axum::routing::post;
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
        let Ok(url) = Url::parse(&format!("http://{addr}/shorten")) else {
            panic!("url");
        };
        url
    }

    #[tokio::test]
    async fn returns_the_id_field() {
        let app = Router::new().route(
            "/shorten",
            post(|Json(body): Json<Value>| async move {
                let long = body.get("longUrl").and_then(Value::as_str).unwrap_or("");
                Json(json!({ "id": format!("http://goo.gl/{}", long.len()) }))
            }),
        );
        let endpoint = serve(app).await;
        let shortener = HttpUrlShortener::new(
            reqwest::Client::new(),
            endpoint,
            Some("k"),
            Duration::from_secs(2),
        );

        let Ok(short) = shortener.shorten("http://example.com/abc").await else {
            panic!("shorten should succeed");
        };
        assert_eq!(short, "http://goo.gl/22");
    }

    #[tokio::test]
    async fn error_status_is_a_shortener_error() {
        let app = Router::new().route(
            "/shorten",
            post(|| async { axum::http::StatusCode::FORBIDDEN }),
        );
        let endpoint = serve(app).await;
        let shortener =
            HttpUrlShortener::new(reqwest::Client::new(), endpoint, None, Duration::from_secs(2));

        let result = shortener.shorten("http://example.com").await;
        assert!(matches!(result, Err(NotifyError::Shortener(_))));
    }

    #[test]
    fn api_key_is_appended_as_query() {
        let Ok(endpoint) = Url::parse("https://short.example/v1/url") else {
            panic!("url");
        };
        let shortener = HttpUrlShortener::new(
            reqwest::Client::new(),
            endpoint,
            Some("secret"),
            Duration::from_secs(1),
        );
        assert_eq!(shortener.endpoint.query(), Some("key=secret"));
    }
}
