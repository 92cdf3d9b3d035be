//! Request context types.
//!
//! The [`RequestContext`] carries all per-request state through the pipeline
//! and into the handler: the raw request inputs, the values produced by the
//! processing stages, and the response under construction.

use crate::error::{PipelineError, PipelineResult};
use crate::operation::{OperationSpec, ParameterLocation};
use crate::request::{self, Cookies, PathParams, QueryParams, Request, Response};
use crate::response::ResponseWriter;
use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Header carrying a caller-supplied request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A unique identifier for each request, using UUID v7.
///
/// UUID v7 is time-ordered, which keeps log lines for one request easy to
/// correlate and sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Creates a new unique request ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Reuses the `x-request-id` header when it holds a UUID.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map_or_else(Self::new, Self)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Key of a processed value stored on the request context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestDataKey {
    /// The processed value of a parameter, by name.
    Parameter(String),
    /// The processed request body.
    Body,
    /// The value produced by a security scheme, by scheme name.
    Security(String),
    /// Free-form data stored by custom middleware.
    Extension(String),
}

impl fmt::Display for RequestDataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameter(name) => write!(f, "openapi-parameter-{name}"),
            Self::Body => f.write_str("openapi-body"),
            Self::Security(scheme) => write!(f, "openapi-security-{scheme}"),
            Self::Extension(name) => f.write_str(name),
        }
    }
}

/// Per-request context that flows through the pipeline.
///
/// Processed values are stored as `Option<Value>`: a key that is present with
/// `None` means "processed, and absent", which is different from a key that
/// no stage has written.
pub struct RequestContext {
    request_id: RequestId,
    operation: Arc<OperationSpec>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    path_params: PathParams,
    query: QueryParams,
    cookies: Cookies,
    body: Bytes,
    response: ResponseWriter,
    data: HashMap<RequestDataKey, Option<Value>>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    started_at: Instant,
}

impl RequestContext {
    /// Creates a context from request parts and a fully read body.
    #[must_use]
    pub fn from_parts(
        operation: Arc<OperationSpec>,
        parts: http::request::Parts,
        body: Bytes,
        path_params: PathParams,
    ) -> Self {
        let query = QueryParams::parse(parts.uri.query());
        let cookies = Cookies::from_headers(&parts.headers);
        Self {
            request_id: RequestId::from_headers(&parts.headers),
            operation,
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            path_params,
            query,
            cookies,
            body,
            response: ResponseWriter::new(),
            data: HashMap::new(),
            extensions: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Creates a context from a request, reading its body.
    pub async fn from_request(
        operation: Arc<OperationSpec>,
        request: Request,
        path_params: PathParams,
    ) -> Self {
        let (parts, body) = request.into_parts();
        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        Self::from_parts(operation, parts, body, path_params)
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// The operation this request was routed to.
    #[must_use]
    pub fn operation(&self) -> &OperationSpec {
        &self.operation
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is valid UTF-8. Names are case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request `Content-Type`, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Router-supplied path parameters.
    #[must_use]
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Parsed query string.
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Parsed cookies.
    #[must_use]
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// The raw, unprocessed value of a parameter.
    ///
    /// Query keys repeated in the query string come back as an array. A
    /// header that is present but not valid UTF-8 reads as `None`; tell it
    /// apart from a missing one through [`headers`](Self::headers).
    #[must_use]
    pub fn raw_parameter(&self, location: ParameterLocation, name: &str) -> Option<Value> {
        match location {
            ParameterLocation::Path => self.path_params.get(name).map(|v| Value::String(v.into())),
            ParameterLocation::Query => self.query.get(name),
            ParameterLocation::Header => self.header(name).map(|v| Value::String(v.into())),
            ParameterLocation::Cookie => self.cookies.get(name).map(|v| Value::String(v.into())),
        }
    }

    /// Raw body bytes.
    #[must_use]
    pub fn raw_body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Decodes the raw body according to the request `Content-Type`.
    ///
    /// Returns `Ok(None)` when no body was sent.
    pub fn raw_body(&self) -> PipelineResult<Option<Value>> {
        request::decode_body(self.content_type(), &self.body)
    }

    /// Stores a processed value.
    pub fn set_request_data(&mut self, key: RequestDataKey, value: Option<Value>) {
        self.data.insert(key, value);
    }

    /// Returns a processed value; the outer `None` means "never written".
    #[must_use]
    pub fn request_data(&self, key: &RequestDataKey) -> Option<&Option<Value>> {
        self.data.get(key)
    }

    /// Processed value of a parameter.
    ///
    /// Fails with a contract violation if the parameter stage did not run for
    /// this parameter, which means the handler asked for something the
    /// operation does not declare.
    pub fn parameter(&self, name: &str) -> PipelineResult<Option<&Value>> {
        self.data
            .get(&RequestDataKey::Parameter(name.to_string()))
            .map(Option::as_ref)
            .ok_or_else(|| {
                PipelineError::contract_violation(
                    self.operation.display_name(),
                    format!(
                        "Operation {} read parameter {name}, which was not processed.",
                        self.operation
                    ),
                )
            })
    }

    /// Processed request body.
    pub fn body(&self) -> PipelineResult<Option<&Value>> {
        self.data
            .get(&RequestDataKey::Body)
            .map(Option::as_ref)
            .ok_or_else(|| {
                PipelineError::contract_violation(
                    self.operation.display_name(),
                    format!(
                        "Operation {} read the request body before it was processed.",
                        self.operation
                    ),
                )
            })
    }

    /// Value produced by a security scheme, if it ran and succeeded.
    #[must_use]
    pub fn security(&self, scheme: &str) -> Option<&Value> {
        self.data
            .get(&RequestDataKey::Security(scheme.to_string()))
            .and_then(Option::as_ref)
    }

    /// Deserializes a processed parameter.
    pub fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> PipelineResult<Option<T>> {
        self.parameter(name)?
            .map(|value| self.deserialize(value, &format!("parameter {name}")))
            .transpose()
    }

    /// Deserializes the processed body.
    pub fn body_as<T: DeserializeOwned>(&self) -> PipelineResult<Option<T>> {
        self.body()?
            .map(|value| self.deserialize(value, "request body"))
            .transpose()
    }

    fn deserialize<T: DeserializeOwned>(&self, value: &Value, what: &str) -> PipelineResult<T> {
        T::deserialize(value).map_err(|err| {
            PipelineError::contract_violation(
                self.operation.display_name(),
                format!(
                    "Operation {} could not read {what} as the requested type: {err}",
                    self.operation
                ),
            )
        })
    }

    /// The response under construction.
    #[must_use]
    pub fn response(&self) -> &ResponseWriter {
        &self.response
    }

    /// Mutable access to the response under construction.
    pub fn response_mut(&mut self) -> &mut ResponseWriter {
        &mut self.response
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|boxed| boxed.downcast_ref())
    }

    /// Time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Finishes the request, producing the HTTP response.
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response.into_response()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("operation", &self.operation.display_name())
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("data", &self.data)
            .field("response", &self.response)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::ParameterSpec;
    use http_body_util::Full;
    use serde_json::json;

    fn operation() -> Arc<OperationSpec> {
        Arc::new(
            OperationSpec::builder(Method::GET, "/users/{id}")
                .operation_id("getUser")
                .parameter(ParameterSpec::new("id", ParameterLocation::Path))
                .build(),
        )
    }

    fn request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header("X-Tenant", "acme")
            .header(header::COOKIE, "session=s1")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from_static(br#"{"a":1}"#)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_from_request_reads_everything() {
        let params = PathParams::new().with("id", "42");
        let ctx = RequestContext::from_request(operation(), request("/users/42?q=x"), params).await;

        assert_eq!(ctx.raw_parameter(ParameterLocation::Path, "id"), Some(json!("42")));
        assert_eq!(ctx.raw_parameter(ParameterLocation::Query, "q"), Some(json!("x")));
        assert_eq!(ctx.raw_parameter(ParameterLocation::Header, "x-tenant"), Some(json!("acme")));
        assert_eq!(ctx.raw_parameter(ParameterLocation::Cookie, "session"), Some(json!("s1")));
        assert_eq!(ctx.raw_parameter(ParameterLocation::Query, "nope"), None);
        assert_eq!(ctx.raw_body().unwrap(), Some(json!({"a": 1})));
    }

    #[test]
    fn test_request_id_from_header() {
        let id = Uuid::now_v7();
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, id.to_string().parse().unwrap());
        assert_eq!(*RequestId::from_headers(&headers).as_uuid(), id);

        headers.insert(REQUEST_ID_HEADER, "not-a-uuid".parse().unwrap());
        assert_ne!(*RequestId::from_headers(&headers).as_uuid(), id);
    }

    #[test]
    fn test_request_data_distinguishes_absent_from_unset() {
        let (parts, _) = request("/users/1").into_parts();
        let mut ctx = RequestContext::from_parts(operation(), parts, Bytes::new(), PathParams::new());

        assert!(ctx.parameter("id").is_err());
        ctx.set_request_data(RequestDataKey::Parameter("id".into()), None);
        assert_eq!(ctx.parameter("id").unwrap(), None);
        ctx.set_request_data(RequestDataKey::Parameter("id".into()), Some(json!(1)));
        assert_eq!(ctx.parameter_as::<u32>("id").unwrap(), Some(1));

        let err = ctx.parameter_as::<String>("id").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, PartialEq)]
        struct Tenant(&'static str);

        let (parts, _) = request("/").into_parts();
        let mut ctx = RequestContext::from_parts(operation(), parts, Bytes::new(), PathParams::new());
        assert!(ctx.extension::<Tenant>().is_none());
        ctx.set_extension(Tenant("acme"));
        assert_eq!(ctx.extension::<Tenant>(), Some(&Tenant("acme")));
    }

    #[test]
    fn test_request_data_key_names() {
        assert_eq!(RequestDataKey::Parameter("id".into()).to_string(), "openapi-parameter-id");
        assert_eq!(RequestDataKey::Body.to_string(), "openapi-body");
    }
}
