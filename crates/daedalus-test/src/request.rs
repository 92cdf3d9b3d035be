//! Test request building.

use crate::error::TestError;
use bytes::Bytes;
use daedalus_core::{PathParams, Request};
use http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use http_body_util::Full;
use serde::Serialize;

/// Builder for a request that has already been routed to an operation.
///
/// The path may contain `{name}` templates; each [`path_param`] both fills
/// the template and records the value in the [`PathParams`] handed to the
/// pipeline. Errors from individual setters are deferred until
/// [`into_parts`] so the builder can stay chainable.
///
/// [`path_param`]: TestRequest::path_param
/// [`into_parts`]: TestRequest::into_parts
#[must_use]
#[derive(Debug)]
pub struct TestRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: Vec<(String, String)>,
    path_params: PathParams,
    body: Bytes,
    error: Option<TestError>,
}

impl TestRequest {
    /// Creates a request builder.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            path_params: PathParams::new(),
            body: Bytes::new(),
            error: None,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Creates a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Creates a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Creates a PATCH request.
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    /// Creates a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Sets a path parameter and fills the matching `{name}` template.
    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        self.path = self.path.replace(&format!("{{{name}}}"), &value);
        self.path_params.insert(name, value);
        self
    }

    /// Appends a query string parameter.
    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Sets a header, replacing any previous value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        match (
            HeaderName::try_from(name.as_ref()),
            HeaderValue::try_from(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => self.fail(TestError::InvalidHeader(name.as_ref().to_string())),
        }
        self
    }

    /// Adds a cookie to the `Cookie` header.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Sets the Content-Type header.
    pub fn content_type(self, content_type: impl AsRef<str>) -> Self {
        self.header(header::CONTENT_TYPE.as_str(), content_type)
    }

    /// Sets the Authorization header with a Bearer token.
    pub fn bearer_token(self, token: impl AsRef<str>) -> Self {
        self.header(
            header::AUTHORIZATION.as_str(),
            format!("Bearer {}", token.as_ref()),
        )
    }

    /// Sets the raw body without touching Content-Type.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and `Content-Type: application/json`.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.body = Bytes::from(bytes),
            Err(e) => self.fail(e.into()),
        }
        self.content_type("application/json")
    }

    /// Sets a form-urlencoded body and its Content-Type.
    pub fn form<T: Serialize>(mut self, value: &T) -> Self {
        match serde_urlencoded::to_string(value) {
            Ok(encoded) => self.body = Bytes::from(encoded),
            Err(e) => self.fail(TestError::RequestBuild(format!("form encoding: {e}"))),
        }
        self.content_type("application/x-www-form-urlencoded")
    }

    fn fail(&mut self, error: TestError) {
        self.error.get_or_insert(error);
    }

    fn uri(&self) -> Result<String, TestError> {
        if self.query.is_empty() {
            return Ok(self.path.clone());
        }
        let query = serde_urlencoded::to_string(&self.query)
            .map_err(|e| TestError::RequestBuild(format!("query encoding: {e}")))?;
        Ok(format!("{}?{query}", self.path))
    }

    /// Builds the request and the path parameters a router would have
    /// extracted for it.
    pub fn into_parts(self) -> Result<(Request, PathParams), TestError> {
        let uri = self.uri()?;
        if let Some(error) = self.error {
            return Err(error);
        }

        let mut builder = http::Request::builder().method(self.method).uri(uri);
        if let Some(headers) = builder.headers_mut() {
            headers.extend(self.headers);
            if !self.cookies.is_empty() {
                let cookie = self
                    .cookies
                    .iter()
                    .map(|(name, value)| format!("{name}={value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                let value = HeaderValue::try_from(cookie)
                    .map_err(|e| TestError::InvalidHeader(e.to_string()))?;
                headers.insert(header::COOKIE, value);
            }
        }

        let request = builder
            .body(Full::new(self.body))
            .map_err(|e| TestError::RequestBuild(e.to_string()))?;
        Ok((request, self.path_params))
    }
}
