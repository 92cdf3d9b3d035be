//! Response construction.
//!
//! [`ResponseWriter`] is the mutable response attached to every request
//! context. Handlers may write to it directly; once anything has been sent
//! its headers are frozen. [`HandlerResult`] is a complete response
//! description a handler can return instead, applied by the
//! handler-result stage.

use crate::request::Response;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Mutable response under construction.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    headers_sent: bool,
    closed: bool,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseWriter {
    /// Creates an empty `200 OK` response.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            headers_sent: false,
            closed: false,
        }
    }

    /// Current status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Sets the status code. Ignored once headers are sent.
    pub fn set_status(&mut self, status: StatusCode) {
        if self.headers_sent {
            tracing::warn!(%status, "ignoring status change after headers were sent");
            return;
        }
        self.status = status;
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Sets a header, replacing existing values. Ignored once headers are sent.
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.headers_sent {
            tracing::warn!(header = %name, "ignoring header change after headers were sent");
            return;
        }
        self.headers.insert(name, value);
    }

    /// Appends a header value. Ignored once headers are sent.
    pub fn append_header(&mut self, name: HeaderName, value: HeaderValue) {
        if self.headers_sent {
            tracing::warn!(header = %name, "ignoring header change after headers were sent");
            return;
        }
        self.headers.append(name, value);
    }

    /// Returns `true` once the status line and headers have been sent.
    #[must_use]
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Freezes the status and headers, as a streaming handler would by flushing.
    pub fn flush_headers(&mut self) {
        self.headers_sent = true;
    }

    /// Returns `true` if the client connection went away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Marks the connection as closed. Later writes are discarded.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Sends a JSON body, defaulting `Content-Type` to `application/json`.
    pub fn json(&mut self, value: &Value) {
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.set_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        self.send(value.to_string());
    }

    /// Sends a body and completes the response.
    pub fn send(&mut self, body: impl Into<Bytes>) {
        if self.closed {
            tracing::debug!("discarding response body for closed connection");
            return;
        }
        self.body = body.into();
        self.headers_sent = true;
    }

    /// Completes the response without a body.
    pub fn end(&mut self) {
        self.send(Bytes::new());
    }

    /// Body written so far.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Converts into an HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    /// Sent with cross-site requests.
    None,
    /// Sent with same-site requests and top-level navigations.
    #[default]
    Lax,
    /// Only sent with same-site requests.
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Lax => write!(f, "Lax"),
            Self::Strict => write!(f, "Strict"),
        }
    }
}

/// A `Set-Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<Duration>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl SetCookie {
    /// Creates a cookie with no attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// Creates a cookie that clears `name` on the client.
    #[must_use]
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(Duration::ZERO)
    }

    /// Sets `Path`.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets `Domain`.
    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Sets `Max-Age`.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets `Secure`.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets `HttpOnly`.
    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sets `SameSite`.
    #[must_use]
    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    /// Cookie name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if let Some(path) = &self.path {
            write!(f, "; Path={path}")?;
        }
        if let Some(domain) = &self.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = self.max_age {
            write!(f, "; Max-Age={}", max_age.as_secs())?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
enum ResultBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Bytes),
}

/// A full response description returned by a handler.
///
/// Header names and values are validated lazily, like
/// [`http::response::Builder`]: the first invalid one is reported when the
/// result is applied.
///
/// # Example
///
/// ```
/// use daedalus_core::{HandlerResult, ResponseWriter, SetCookie};
/// use http::StatusCode;
///
/// let result = HandlerResult::new()
///     .status(StatusCode::CREATED)
///     .header("location", "/users/42")
///     .cookie(SetCookie::new("seen", "1").path("/"))
///     .json(serde_json::json!({"id": 42}));
///
/// let mut response = ResponseWriter::new();
/// result.apply(&mut response).unwrap();
/// assert_eq!(response.status(), StatusCode::CREATED);
/// assert_eq!(response.header("location"), Some("/users/42"));
/// ```
#[derive(Debug, Default)]
pub struct HandlerResult {
    status: Option<StatusCode>,
    headers: Vec<(HeaderName, HeaderValue)>,
    cookies: Vec<SetCookie>,
    body: ResultBody,
    error: Option<http::Error>,
}

impl HandlerResult {
    /// Creates an empty result: status untouched, no body.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code.
    #[must_use]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if self.error.is_some() {
            return self;
        }
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => self.headers.push((name, value)),
            (Err(err), _) => self.error = Some(err.into()),
            (_, Err(err)) => self.error = Some(err.into()),
        }
        self
    }

    /// Adds a `Set-Cookie` header.
    #[must_use]
    pub fn cookie(mut self, cookie: SetCookie) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn json(mut self, value: Value) -> Self {
        self.body = ResultBody::Json(value);
        self
    }

    /// Sets a plain text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = ResultBody::Text(text.into());
        self
    }

    /// Sets a raw body.
    #[must_use]
    pub fn bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = ResultBody::Bytes(body.into());
        self
    }

    /// Writes this result onto a response and completes it.
    pub fn apply(self, response: &mut ResponseWriter) -> Result<(), http::Error> {
        if let Some(err) = self.error {
            return Err(err);
        }
        if let Some(status) = self.status {
            response.set_status(status);
        }
        for (name, value) in self.headers {
            response.set_header(name, value);
        }
        for cookie in self.cookies {
            let value = HeaderValue::try_from(cookie.to_string())?;
            response.append_header(header::SET_COOKIE, value);
        }
        match self.body {
            ResultBody::Empty => response.end(),
            ResultBody::Json(value) => response.json(&value),
            ResultBody::Text(text) => {
                if !response.headers().contains_key(header::CONTENT_TYPE) {
                    response.set_header(
                        header::CONTENT_TYPE,
                        HeaderValue::from_static("text/plain; charset=utf-8"),
                    );
                }
                response.send(text);
            }
            ResultBody::Bytes(bytes) => response.send(bytes),
        }
        Ok(())
    }
}
