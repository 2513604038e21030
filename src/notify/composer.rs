//! Human-readable alert payloads for interesting encounters.

use std::sync::Arc;

use chrono::FixedOffset;
use futures_util::future::join_all;
use url::Url;

use crate::domain::{Coordinate, WildEncounter};
use crate::locale::SpeciesLocalizer;
use crate::notify::shortener::UrlShortener;

const STATIC_MAP_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/staticmap";
const MARKER_ICON_BASE: &str = "http://media.pldh.net/pokexycons";
const MAP_SIZE: &str = "640x640";

/// Zoom levels of the two static map images attached to every alert.
pub const ALERT_ZOOMS: [u8; 2] = [15, 17];

/// A composed alert, ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Email subject: the species display name.
    pub subject: String,
    /// Plain-text body.
    pub text: String,
    /// HTML body.
    pub html: String,
    /// Static map links, shortened when possible, one per zoom level.
    pub image_urls: Vec<String>,
}

/// Builds [`Alert`]s from encounters.
#[derive(Debug, Clone)]
pub struct AlertComposer {
    home: Coordinate,
    maps_key: Option<String>,
    offset: FixedOffset,
    localizer: Arc<dyn SpeciesLocalizer>,
    shortener: Option<Arc<dyn UrlShortener>>,
}

impl AlertComposer {
    /// Creates a composer centred on `home`, rendering times at `offset`.
    #[must_use]
    pub fn new(
        home: Coordinate,
        maps_key: Option<String>,
        offset: FixedOffset,
        localizer: Arc<dyn SpeciesLocalizer>,
    ) -> Self {
        Self {
            home,
            maps_key,
            offset,
            localizer,
            shortener: None,
        }
    }

    /// Shortens image links through `shortener`.
    #[must_use]
    pub fn with_shortener(mut self, shortener: Arc<dyn UrlShortener>) -> Self {
        self.shortener = Some(shortener);
        self
    }

    /// Static map centred on the home coordinate with a species marker at
    /// the encounter.
    #[must_use]
    pub fn static_map_url(&self, encounter: &WildEncounter, zoom: u8) -> String {
        let marker = format!(
            "icon:{MARKER_ICON_BASE}/{:03}.png|{}",
            encounter.pokemon_id,
            encounter.coordinate()
        );
        let mut params = vec![
            ("center", self.home.key()),
            ("zoom", zoom.to_string()),
            ("size", MAP_SIZE.to_string()),
            ("markers", marker),
        ];
        if let Some(key) = &self.maps_key {
            params.push(("key", key.clone()));
        }
        match Url::parse_with_params(STATIC_MAP_ENDPOINT, &params) {
            Ok(url) => url.into(),
            // the endpoint is a valid constant; parsing cannot fail
            Err(_) => STATIC_MAP_ENDPOINT.to_string(),
        }
    }

    /// Composes the alert for `encounter`.
    ///
    /// Shortener failures are logged and the long URL is used instead.
    pub async fn compose(&self, encounter: &WildEncounter) -> Alert {
        let name = self.localizer.name(encounter.pokemon_id);
        let disappears = encounter
            .disappear_time
            .with_timezone(&self.offset)
            .format("%X")
            .to_string();

        let long_urls = ALERT_ZOOMS.map(|zoom| self.static_map_url(encounter, zoom));
        let image_urls = join_all(long_urls.iter().map(|url| self.shorten_or_keep(url))).await;

        let headline = format!("{name} will disappear at {disappears}");
        let text = format!("{headline}\n{}", image_urls.join("\n"));

        let images: String = image_urls
            .iter()
            .map(|url| {
                let url = escape_html(url);
                format!("<p><a href=\"{url}\"><img src=\"{url}\" alt=\"map\"></a></p>")
            })
            .collect();
        let html = format!("<p>{}</p>{images}", escape_html(&headline));

        Alert {
            subject: name,
            text,
            html,
            image_urls,
        }
    }

    async fn shorten_or_keep(&self, url: &str) -> String {
        let Some(shortener) = &self.shortener else {
            return url.to_string();
        };
        match shortener.shorten(url).await {
            Ok(short) => short,
            Err(err) => {
                tracing::warn!(error = %err, "url shortening failed, using long url");
                url.to_string()
            }
        }
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}
