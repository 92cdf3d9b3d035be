//! Raw request data.
//!
//! These types hold the unprocessed request inputs the pipeline stages read
//! from: path parameters supplied by the router, the query string, cookies
//! and the decoded body.

use crate::error::{PipelineError, PipelineResult};
use crate::media_type;
use bytes::Bytes;
use http::{header, HeaderMap};
use http_body_util::Full;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The HTTP request type accepted by the pipeline.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type produced by the pipeline.
pub type Response = http::Response<Full<Bytes>>;

/// Path parameters extracted by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: HashMap<String, String>,
}

impl PathParams {
    /// Creates an empty set of path parameters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params.insert(name.into(), value.into());
    }

    /// Adds a parameter, builder style.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns a parameter value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            params: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Parsed query string.
///
/// A key that appears once yields a string, a repeated key yields an array
/// of strings in order of appearance.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    /// Parses a raw query string (without the leading `?`).
    ///
    /// A malformed query string is logged and treated as empty.
    #[must_use]
    pub fn parse(query: Option<&str>) -> Self {
        let Some(query) = query.filter(|q| !q.is_empty()) else {
            return Self::default();
        };
        let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query) {
            Ok(pairs) => pairs,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring malformed query string");
                return Self::default();
            }
        };
        let mut values: HashMap<String, Vec<String>> = HashMap::new();
        for (key, value) in pairs {
            values.entry(key).or_default().push(value);
        }
        Self { values }
    }

    /// Returns the value of a query key as JSON.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.values.get(name)?.as_slice() {
            [] => None,
            [single] => Some(Value::String(single.clone())),
            many => Some(Value::Array(
                many.iter().cloned().map(Value::String).collect(),
            )),
        }
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the query string was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Request cookies, parsed from every `Cookie` header.
#[derive(Debug, Clone, Default)]
pub struct Cookies {
    cookies: HashMap<String, String>,
}

impl Cookies {
    /// Creates an empty cookie jar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses all `Cookie` headers. Headers that are not valid UTF-8 are skipped.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut cookies = Self::new();
        for value in headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                cookies.parse_into(value);
            }
        }
        cookies
    }

    /// Parses a single `Cookie` header value.
    #[must_use]
    pub fn parse(header_value: &str) -> Self {
        let mut cookies = Self::new();
        cookies.parse_into(header_value);
        cookies
    }

    fn parse_into(&mut self, header_value: &str) {
        for pair in header_value.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                let value = value.trim().trim_matches('"');
                // First occurrence wins, as browsers send the most specific path first.
                self.cookies
                    .entry(name.trim().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
    }

    /// Returns a cookie value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Returns `true` if the cookie exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    /// Number of cookies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    /// Returns `true` if there are no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Decodes a raw request body according to its `Content-Type`.
///
/// - zero bytes decode to `None` (no body)
/// - JSON media types are parsed; malformed JSON is a bad request
/// - urlencoded forms become an object of strings (arrays for repeated keys)
/// - anything else must be UTF-8 and becomes a JSON string
pub fn decode_body(content_type: Option<&str>, body: &Bytes) -> PipelineResult<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    let content_type = content_type.unwrap_or_default();

    if media_type::is_json(content_type) {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        return serde_json::from_slice(body)
            .map(Some)
            .map_err(|err| PipelineError::bad_request(format!("Invalid JSON request body: {err}")));
    }

    if media_type::is_form(content_type) {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body).map_err(|err| {
            PipelineError::bad_request(format!("Invalid form request body: {err}"))
        })?;
        let mut object = Map::new();
        for (key, value) in pairs {
            match object.get_mut(&key) {
                Some(Value::Array(existing)) => existing.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
                None => {
                    object.insert(key, Value::String(value));
                }
            }
        }
        return Ok(Some(Value::Object(object)));
    }

    match std::str::from_utf8(body) {
        Ok(text) => Ok(Some(Value::String(text.to_string()))),
        Err(_) => Err(PipelineError::bad_request(
            "Request body could not be decoded as text.",
        )),
    }
}
