//! End-to-end tests driving whole operation pipelines with in-memory requests.

use std::sync::Arc;

use daedalus_core::{
    handler_fn, ArgumentBinding, ErrorCategory, HandlerResult, OperationHandler, OperationSpec,
    Outcome, ParameterLocation, ParameterSpec, PipelineError, RequestBodySpec, Response,
};
use daedalus_middleware::{security_fn, OperationPipeline, PipelineOptions, ResponseExt};
use daedalus_test::{TestRequest, TestResponse};
use http::{Method, StatusCode};
use serde_json::{json, Value};

fn document() -> Value {
    json!({
        "components": {
            "schemas": {
                "NewPet": {
                    "type": "object",
                    "required": ["name"],
                    "properties": {
                        "name": {"type": "string", "minLength": 1},
                        "tag": {"type": "string"}
                    }
                }
            }
        }
    })
}

fn build(operation: OperationSpec, handler: Arc<dyn OperationHandler>) -> OperationPipeline {
    build_with(operation, handler, &PipelineOptions::default())
}

fn build_with(
    operation: OperationSpec,
    handler: Arc<dyn OperationHandler>,
    options: &PipelineOptions,
) -> OperationPipeline {
    OperationPipeline::build(operation, &document(), handler, options).unwrap()
}

/// Runs the pipeline and renders client errors the way a host would.
async fn send(pipeline: &OperationPipeline, request: TestRequest) -> TestResponse {
    let (request, path_params) = request.into_parts().unwrap();
    let response = match pipeline.handle(request, path_params).await {
        Ok(response) => response,
        Err(err) => {
            assert!(!err.is_fatal(), "unexpected fatal error: {err}");
            Response::from_pipeline_error(&err, None, true)
        }
    };
    TestResponse::from_response(response).await
}

fn echo_first_argument() -> Arc<dyn OperationHandler> {
    Arc::new(handler_fn(|_ctx, args| {
        let value = args.get(0).cloned().unwrap_or(Value::Null);
        Box::pin(async move { Ok(Outcome::Json(json!({ "value": value }))) })
    }))
}

fn get_pet_by_query() -> OperationSpec {
    OperationSpec::builder(Method::GET, "/pets")
        .operation_id("findPet")
        .parameter(
            ParameterSpec::new("id", ParameterLocation::Query)
                .required(true)
                .schema(json!({"type": "integer"})),
        )
        .bind(ArgumentBinding::parameter("id"))
        .build()
}

#[tokio::test]
async fn test_query_parameter_is_coerced_and_bound() {
    let pipeline = build(get_pet_by_query(), echo_first_argument());

    let res = send(&pipeline, TestRequest::get("/pets").query_param("id", "42")).await;

    res.assert_status(StatusCode::OK);
    assert_eq!(res.content_type(), Some("application/json"));
    assert_eq!(res.json::<Value>().unwrap(), json!({"value": 42}));
}

#[tokio::test]
async fn test_invalid_query_parameter_is_rejected() {
    let pipeline = build(get_pet_by_query(), echo_first_argument());

    let res = send(&pipeline, TestRequest::get("/pets").query_param("id", "abc")).await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let message = res.error_message().unwrap();
    assert!(message.starts_with("Query parameter \"id\" is invalid"), "{message}");
}

#[tokio::test]
async fn test_missing_required_query_parameter() {
    let pipeline = build(get_pet_by_query(), echo_first_argument());

    let res = send(&pipeline, TestRequest::get("/pets")).await;

    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        res.error_message().as_deref(),
        Some("Query parameter \"id\" is required.")
    );
}

fn create_pet() -> OperationSpec {
    OperationSpec::builder(Method::POST, "/pets")
        .operation_id("createPet")
        .request_body(RequestBodySpec::new().required(true).content(
            "application/json",
            Some(json!({"$ref": "#/components/schemas/NewPet"})),
        ))
        .bind(ArgumentBinding::Body)
        .build()
}

#[tokio::test]
async fn test_body_is_validated_against_referenced_schema() {
    let pipeline = build(create_pet(), echo_first_argument());

    let res = send(&pipeline, TestRequest::post("/pets").json(&json!({"name": "Rex"}))).await;
    res.assert_status(StatusCode::OK);
    assert_eq!(res.json::<Value>().unwrap(), json!({"value": {"name": "Rex"}}));

    let res = send(&pipeline, TestRequest::post("/pets").json(&json!({}))).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    let message = res.error_message().unwrap();
    assert!(message.starts_with("Invalid request body:"), "{message}");
    assert!(message.contains("name"), "{message}");
}

#[tokio::test]
async fn test_missing_required_body() {
    let pipeline = build(create_pet(), echo_first_argument());

    let res = send(&pipeline, TestRequest::post("/pets")).await;

    res.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        res.error_message().as_deref(),
        Some("Request body is required.")
    );
}

#[tokio::test]
async fn test_unsupported_body_content_type() {
    let pipeline = build(create_pet(), echo_first_argument());

    let res = send(
        &pipeline,
        TestRequest::post("/pets")
            .content_type("text/plain")
            .body("Rex"),
    )
    .await;

    res.assert_status(StatusCode::BAD_REQUEST);
    let message = res.error_message().unwrap();
    assert!(message.contains("text/plain is not supported"), "{message}");
    assert!(message.contains("application/json"), "{message}");
}

#[tokio::test]
async fn test_handler_result_is_applied() {
    let operation = OperationSpec::builder(Method::DELETE, "/pets/{id}")
        .operation_id("deletePet")
        .parameter(
            ParameterSpec::new("id", ParameterLocation::Path)
                .required(true)
                .schema(json!({"type": "string"})),
        )
        .build();
    let handler = Arc::new(handler_fn(|_ctx, _args| {
        Box::pin(async move {
            Ok(HandlerResult::new()
                .status(StatusCode::NO_CONTENT)
                .header("x-deleted", "true")
                .into())
        })
    }));
    let pipeline = build(operation, handler);

    let res = send(&pipeline, TestRequest::delete("/pets/{id}").path_param("id", "7")).await;

    res.assert_status(StatusCode::NO_CONTENT);
    assert_eq!(res.header_str("x-deleted"), Some("true"));
    assert!(res.is_empty());
}

#[tokio::test]
async fn test_result_after_headers_sent_is_fatal() {
    let operation = OperationSpec::builder(Method::GET, "/stream")
        .operation_id("streamEvents")
        .build();
    let handler = Arc::new(handler_fn(|ctx, _args| {
        Box::pin(async move {
            ctx.response_mut().flush_headers();
            Ok(Outcome::Json(json!({"late": true})))
        })
    }));
    let pipeline = build(operation, handler);

    let (request, path_params) = TestRequest::get("/stream").into_parts().unwrap();
    let err = pipeline.handle(request, path_params).await.unwrap_err();

    assert!(err.is_fatal());
    assert_eq!(err.category(), ErrorCategory::ContractViolation);
    assert!(err.to_string().contains("streamEvents"), "{err}");
}

#[tokio::test]
async fn test_non_json_result_is_fatal() {
    let operation = OperationSpec::builder(Method::GET, "/raw")
        .operation_id("rawThing")
        .build();
    let handler = Arc::new(handler_fn(|_ctx, _args| {
        Box::pin(async move { Ok(Outcome::other(17_u8)) })
    }));
    let pipeline = build(operation, handler);

    let (request, path_params) = TestRequest::get("/raw")
        .header("accept", "text/csv")
        .into_parts()
        .unwrap();
    let err = pipeline.handle(request, path_params).await.unwrap_err();

    assert!(matches!(err, PipelineError::ContractViolation { .. }));
    assert!(err.to_string().contains("text/csv"), "{err}");
}

#[tokio::test]
async fn test_invalid_path_parameter_is_not_found() {
    let operation = OperationSpec::builder(Method::GET, "/pets/{id}")
        .operation_id("getPet")
        .parameter(
            ParameterSpec::new("id", ParameterLocation::Path)
                .required(true)
                .schema(json!({"type": "integer"})),
        )
        .bind(ArgumentBinding::parameter("id"))
        .build();
    let pipeline = build(operation, echo_first_argument());

    let res = send(&pipeline, TestRequest::get("/pets/{id}").path_param("id", "abc")).await;
    res.assert_status(StatusCode::NOT_FOUND);

    let res = send(&pipeline, TestRequest::get("/pets/{id}").path_param("id", "9")).await;
    res.assert_status(StatusCode::OK);
    assert_eq!(res.json::<Value>().unwrap(), json!({"value": 9}));
}

#[tokio::test]
async fn test_security_runs_before_body_validation() {
    let options = PipelineOptions::new().with_security_scheme(
        "apiKey",
        security_fn(|ctx, _scopes| {
            let granted = ctx
                .header("x-api-key")
                .filter(|key| *key == "secret")
                .map(|_| json!({"user": "ann"}));
            Box::pin(async move { Ok(granted) })
        }),
    );
    let operation = OperationSpec::builder(Method::POST, "/pets")
        .operation_id("createPet")
        .security([("apiKey", Vec::new())])
        .request_body(RequestBodySpec::new().required(true).content(
            "application/json",
            Some(json!({"$ref": "#/components/schemas/NewPet"})),
        ))
        .bind(ArgumentBinding::security("apiKey"))
        .build();
    let pipeline = build_with(operation, echo_first_argument(), &options);

    let res = send(&pipeline, TestRequest::post("/pets").body("not json")).await;
    res.assert_status(StatusCode::UNAUTHORIZED);

    let res = send(
        &pipeline,
        TestRequest::post("/pets")
            .header("x-api-key", "secret")
            .json(&json!({"name": "Rex"})),
    )
    .await;
    res.assert_status(StatusCode::OK);
    assert_eq!(res.json::<Value>().unwrap(), json!({"value": {"user": "ann"}}));
}
