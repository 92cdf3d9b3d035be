//! Test response wrapper.

use crate::error::TestError;
use bytes::Bytes;
use daedalus_core::Response;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// A fully-read response with helpers for assertions.
#[derive(Debug, Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl TestResponse {
    /// Reads a pipeline response into memory.
    pub async fn from_response(response: Response) -> Self {
        let (parts, body) = response.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Self {
            status: parts.status,
            headers: parts.headers,
            body,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the status code as a u16.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Returns the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets a header value by name.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// Gets a header value as a string.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the Content-Type header value.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header_str(header::CONTENT_TYPE.as_str())
    }

    /// Returns the raw body.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns true when the body has no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Returns the body as a string.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("Invalid UTF-8: {e}")))
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns the `error.message` of a JSON error envelope.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let value: serde_json::Value = self.json().ok()?;
        value
            .pointer("/error/message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
    }

    /// Asserts the status code, printing the body on mismatch.
    ///
    /// # Panics
    ///
    /// Panics when the status differs.
    #[track_caller]
    pub fn assert_status(&self, expected: impl Into<StatusCode>) -> &Self {
        let expected = expected.into();
        assert_eq!(
            self.status,
            expected,
            "unexpected status, body: {}",
            String::from_utf8_lossy(&self.body)
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;
    use serde_json::json;

    fn response(status: u16, body: &'static str) -> Response {
        http::Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_reads_status_headers_and_body() {
        let res = TestResponse::from_response(response(201, r#"{"id":1}"#)).await;
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.status_code(), 201);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(res.json::<serde_json::Value>().unwrap(), json!({"id": 1}));
        assert_eq!(res.text().unwrap(), r#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_error_message() {
        let body = r#"{"error":{"code":"BAD_REQUEST","message":"nope","category":"bad_request"}}"#;
        let res = TestResponse::from_response(response(400, body)).await;
        res.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(res.error_message().as_deref(), Some("nope"));
    }

    #[tokio::test]
    async fn test_empty_body() {
        let res = TestResponse::from_response(response(204, "")).await;
        assert!(res.is_empty());
        assert!(res.json::<serde_json::Value>().is_err());
        assert!(res.error_message().is_none());
    }
}
