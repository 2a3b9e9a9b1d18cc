use log::{debug, warn};
use reqwest::blocking::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::{DisplayItem, ItemsCache, Mode};

pub const DEFAULT_QUOTES_BASE_URL: &str = "https://zenquotes.io/api";
pub const DEFAULT_FEED_URL: &str = "https://feeds.quote-explorer.app/api/cards";

pub type FetchResult<T> = Result<T, FetchError>;

/// Errors from the item source. All of them are surfaced to the user as a
/// non-blocking notice; none are fatal.
#[derive(Debug)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, timeout, body read).
    Network(reqwest::Error),
    /// Non-2xx response, with the server's error message when it sent one.
    Status { status: u16, message: Option<String> },
    /// The response body did not match the expected shape.
    Payload(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Network(err) => write!(f, "network error: {}", err),
            FetchError::Status {
                status,
                message: Some(message),
            } => write!(f, "server returned {}: {}", status, message),
            FetchError::Status {
                status,
                message: None,
            } => write!(f, "server returned {}", status),
            FetchError::Payload(detail) => write!(f, "unexpected response: {}", detail),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err)
    }
}

/// Quote payload: the API answers with a single `{q, a}` object for the
/// single-quote endpoints and an array of them for the list endpoint.
#[derive(Debug, Deserialize)]
struct QuoteDto {
    q: String,
    #[serde(default)]
    a: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuotePayload {
    Many(Vec<QuoteDto>),
    One(QuoteDto),
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: String,
}

/// Article feed envelope: a nested card list. Cards missing any required
/// field are dropped during mapping.
#[derive(Debug, Deserialize)]
struct FeedEnvelope {
    data: FeedData,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    cards: Vec<FeedCard>,
}

#[derive(Debug, Deserialize)]
struct FeedCard {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    image: Option<FeedImage>,
}

#[derive(Debug, Deserialize)]
struct FeedImage {
    url: Option<String>,
}

/// Fetches display items for a mode, with a per-mode cache: a normal load
/// serves the cached list when one exists, a forced refresh bypasses the
/// cache and overwrites it. The concrete endpoints are constructor
/// parameters; the defaults point at the public APIs.
pub struct QuoteClient {
    client: Client,
    quotes_base_url: String,
    feed_url: String,
    pub(crate) cache: Arc<Mutex<ItemsCache>>,
}

impl QuoteClient {
    pub fn new() -> Self {
        Self::with_endpoints(DEFAULT_QUOTES_BASE_URL, DEFAULT_FEED_URL)
    }

    pub fn with_endpoints(quotes_base_url: impl Into<String>, feed_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("quote-explorer/0.1")
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            quotes_base_url: quotes_base_url.into(),
            feed_url: feed_url.into(),
            cache: Arc::new(Mutex::new(ItemsCache::new())),
        }
    }

    /// Normal load: serve the cached list for this mode when present,
    /// otherwise fetch and populate the cache.
    pub fn fetch_items(&self, mode: Mode) -> FetchResult<Vec<DisplayItem>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(items) = cache.get(mode) {
                debug!("serving {} cached items for {}", items.len(), mode.as_str());
                return Ok(items.clone());
            }
        }
        self.fetch_fresh_items(mode)
    }

    /// Forced refresh: always hit the network and overwrite the cache entry.
    pub fn fetch_fresh_items(&self, mode: Mode) -> FetchResult<Vec<DisplayItem>> {
        let items = self.fetch_over_network(mode)?;
        if let Ok(mut cache) = self.cache.lock() {
            cache.update(mode, items.clone());
        }
        Ok(items)
    }

    /// Drop one mode's cache partition so the next normal load refetches.
    pub fn invalidate(&self, mode: Mode) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.invalidate(mode);
        }
    }

    fn fetch_over_network(&self, mode: Mode) -> FetchResult<Vec<DisplayItem>> {
        match mode {
            Mode::Random | Mode::DailyPick | Mode::ListAll => self.fetch_quotes(mode),
            Mode::ArticleFeed => self.fetch_feed(),
        }
    }

    fn fetch_quotes(&self, mode: Mode) -> FetchResult<Vec<DisplayItem>> {
        let url = format!("{}/{}", self.quotes_base_url, mode.as_str());
        let body = self.get_checked(&url)?;
        parse_quote_payload(&body)
    }

    fn fetch_feed(&self) -> FetchResult<Vec<DisplayItem>> {
        let body = self.get_checked(&self.feed_url)?;
        let envelope: FeedEnvelope = serde_json::from_str(&body)
            .map_err(|e| FetchError::Payload(format!("feed envelope: {}", e)))?;
        Ok(map_feed_cards(envelope.data.cards))
    }

    /// GET a URL, turning non-2xx responses into `FetchError::Status` with
    /// the server's `{error}` message when the body carries one.
    fn get_checked(&self, url: &str) -> FetchResult<String> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        let body = response.text()?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .map(|b| b.error);
            warn!("fetch of {} failed with status {}", url, status);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(body)
    }
}

impl Clone for QuoteClient {
    fn clone(&self) -> Self {
        // New reqwest handle, shared cache.
        Self {
            client: self.client.clone(),
            quotes_base_url: self.quotes_base_url.clone(),
            feed_url: self.feed_url.clone(),
            cache: Arc::clone(&self.cache),
        }
    }
}

fn parse_quote_payload(body: &str) -> FetchResult<Vec<DisplayItem>> {
    let payload: QuotePayload = serde_json::from_str(body)
        .map_err(|e| FetchError::Payload(format!("quote payload: {}", e)))?;
    let quotes = match payload {
        QuotePayload::Many(quotes) => quotes,
        QuotePayload::One(quote) => vec![quote],
    };
    Ok(quotes
        .into_iter()
        .filter(|q| !q.q.is_empty())
        .map(|q| DisplayItem::quote(q.q, q.a))
        .collect())
}

fn map_feed_cards(cards: Vec<FeedCard>) -> Vec<DisplayItem> {
    cards
        .into_iter()
        .filter_map(|card| {
            let id = card.id?;
            let title = card.title?;
            let url = card.url?;
            // The image is required by the feed contract even though cards
            // render without it.
            card.image.as_ref()?.url.as_ref()?;
            Some(DisplayItem::article(id, title, url))
        })
        .collect()
}
