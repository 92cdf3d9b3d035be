//! HTTP types used at the pipeline boundary.

use bytes::Bytes;
use daedalus_core::{PipelineError, REQUEST_ID_HEADER};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;

pub use daedalus_core::{Request, Response};

/// Extension trait for building error responses.
pub trait ResponseExt {
    /// Renders a pipeline error as an envelope response.
    ///
    /// With `expose_details` unset only the canonical reason phrase is sent.
    /// `404`s from path parameters never carry detail.
    fn from_pipeline_error(
        error: &PipelineError,
        request_id: Option<&str>,
        expose_details: bool,
    ) -> Response;
}

impl ResponseExt for Response {
    fn from_pipeline_error(
        error: &PipelineError,
        request_id: Option<&str>,
        expose_details: bool,
    ) -> Response {
        let envelope = error.to_envelope(request_id, expose_details);
        let body = serde_json::to_string(&envelope).unwrap_or_else(|_| {
            serde_json::json!({"error": {"code": envelope.error.code}}).to_string()
        });
        json_response(error.status_code(), body, request_id)
    }
}

fn json_response(status: StatusCode, body: String, request_id: Option<&str>) -> Response {
    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(value) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_pipeline_error_with_details() {
        let error = PipelineError::bad_request("Query parameter \"id\" is required.");
        let response = Response::from_pipeline_error(&error, Some("req-1"), true);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        assert_eq!(response.headers().get(REQUEST_ID_HEADER).unwrap(), "req-1");

        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "BAD_REQUEST");
        assert_eq!(body["error"]["message"], "Query parameter \"id\" is required.");
        assert_eq!(body["request_id"], "req-1");
    }

    #[tokio::test]
    async fn test_pipeline_error_without_details() {
        let error = PipelineError::bad_request("Query parameter \"id\" is required.");
        let body = body_json(Response::from_pipeline_error(&error, None, false)).await;
        assert_eq!(body["error"]["message"], "Bad Request");
    }

    #[tokio::test]
    async fn test_not_found_never_has_detail() {
        let body = body_json(Response::from_pipeline_error(
            &PipelineError::not_found(),
            None,
            true,
        ))
        .await;
        assert_eq!(body["error"]["message"], "Not Found");
        assert_eq!(body["error"]["category"], "not_found");
    }
}
