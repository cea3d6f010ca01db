//! Transport responses, pagination metadata and decoded payloads.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Query parameters of a pagination link, in order.
pub type PageQuery = Vec<(String, String)>;

/// A response exactly as the transport received it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl RawResponse {
    /// Response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header named `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether the status is in the 200–399 success range.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 400
    }

    /// Whether this is a success that carries no content: 202, 204, or an
    /// empty body with a 2xx/3xx status.
    #[must_use]
    pub fn is_empty_success(&self) -> bool {
        self.status == 202 || self.status == 204 || (self.body.is_empty() && self.is_success())
    }
}

/// Pagination and caching metadata of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// HTTP status code.
    pub status_code: Option<u16>,
    /// Raw `Last-Modified` header.
    pub last_modified: Option<String>,
    /// Total number of pages.
    pub total_pages: Option<u64>,
    /// Total number of items.
    pub total_count: Option<u64>,
    /// Pages left after this one.
    pub total_pages_remaining: Option<u64>,
    /// Query of the next page.
    pub next_query: Option<PageQuery>,
    /// Query of the previous page.
    pub prev_query: Option<PageQuery>,
    /// Query of the first page.
    pub first_query: Option<PageQuery>,
    /// Query of the last page.
    pub last_query: Option<PageQuery>,
}

impl ResponseConfig {
    /// Metadata derived from the response status and headers.
    #[must_use]
    pub fn from_response(response: &RawResponse) -> Self {
        let mut config = Self {
            status_code: Some(response.status),
            last_modified: response.header("Last-Modified").map(str::to_string),
            total_pages: response.header("X-Total-Pages").and_then(parse_count),
            total_count: response.header("X-Total-Count").and_then(parse_count),
            total_pages_remaining: response
                .header("X-Total-Pages-Remaining")
                .and_then(parse_count),
            ..Self::default()
        };

        if let Some(link) = response.header("Link") {
            for (rel, url) in parse_link_header(link) {
                let query = Some(query_pairs(&url));
                match rel.as_str() {
                    "next" => config.next_query = query,
                    "prev" | "previous" => config.prev_query = query,
                    "first" => config.first_query = query,
                    "last" => config.last_query = query,
                    _ => {},
                }
            }
        }

        config
    }

    /// Metadata from an embedded `pagination` object
    /// (`{total_pages, total_count, total_pages_remaining, next}`).
    ///
    /// Returns `None` unless `pagination` is a JSON object.
    #[must_use]
    pub fn from_body_pagination(pagination: &Value) -> Option<Self> {
        let node = pagination.as_object()?;
        let count = |key: &str| node.get(key).and_then(value_count);

        Some(Self {
            total_pages: count("total_pages"),
            total_count: count("total_count"),
            total_pages_remaining: count("total_pages_remaining"),
            next_query: node
                .get("next")
                .and_then(Value::as_str)
                .and_then(parse_url)
                .map(|url| query_pairs(&url)),
            ..Self::default()
        })
    }

    /// Parsed `Last-Modified` timestamp.
    #[must_use]
    pub fn last_modified_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.last_modified.as_deref()?;
        DateTime::parse_from_rfc2822(raw)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc))
    }

    /// Whether another page can be fetched.
    #[must_use]
    pub fn has_more(&self) -> bool {
        match self.total_pages_remaining {
            Some(remaining) => remaining > 0 && self.next_query.is_some(),
            None => self.next_query.is_some(),
        }
    }
}

fn parse_count(raw: &str) -> Option<u64> {
    raw.trim().parse().ok()
}

fn value_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(raw) => parse_count(raw),
        _ => None,
    }
}

fn parse_url(raw: &str) -> Option<Url> {
    // Pagination links are frequently relative ("/api/v2/posts?before=...").
    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost/")
            .ok()?
            .join(raw)
            .ok(),
        Err(_) => None,
    }
}

fn query_pairs(url: &Url) -> PageQuery {
    url.query_pairs()
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Parse an RFC 5988 `Link` header into `(rel, url)` pairs.
fn parse_link_header(header: &str) -> Vec<(String, Url)> {
    header
        .split(',')
        .filter_map(|part| {
            let mut segments = part.split(';');
            let target = segments.next()?.trim();
            let target = target.strip_prefix('<')?.strip_suffix('>')?;
            let url = parse_url(target)?;
            let rel = segments.find_map(|param| {
                let (key, value) = param.split_once('=')?;
                (key.trim() == "rel").then(|| value.trim().trim_matches('"').to_string())
            })?;
            Some((rel, url))
        })
        .collect()
}

/// Success value of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// Nothing to map.
    #[default]
    Empty,
    /// A single mapped object node.
    One(Value),
    /// A mapped array of object nodes.
    Many(Vec<Value>),
}

impl Payload {
    /// Deserialize the payload into a typed model.
    ///
    /// `Empty` decodes from JSON `null`, `Many` from a JSON array.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the payload does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.to_value())
    }

    /// The payload as a single JSON value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Payload::Empty => Value::Null,
            Payload::One(node) => node.clone(),
            Payload::Many(nodes) => Value::Array(nodes.clone()),
        }
    }

    /// Whether the payload is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// A successful response: mapped payload plus its metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    /// Mapped payload.
    pub payload: Payload,
    /// Pagination and caching metadata.
    pub config: ResponseConfig,
}
