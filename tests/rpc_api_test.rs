// Integration tests for the RPC surface.
//
// Requests are driven through the full axum router with
// `tower::ServiceExt::oneshot`, so routing, extraction, and the error
// mapping are all exercised end to end.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use vendor_connectors::error::ConnectorError;
use vendor_connectors::rpc::create_router;
use vendor_connectors::tools::handler_fn;
use vendor_connectors::tools::schema::{ParamSpec, ParamType, ToolSchema};
use vendor_connectors::ToolRegistry;

// ── Test registry & helpers ───────────────────────────────────────────────────

fn test_registry() -> Arc<ToolRegistry> {
    let registry = ToolRegistry::new();
    registry
        .register(
            "calc",
            "add",
            "Adds two integers",
            ToolSchema::new(vec![
                ParamSpec::required("a", ParamType::Integer, "First addend"),
                ParamSpec::required("b", ParamType::Integer, "Second addend"),
            ]),
            handler_fn(|args| async move {
                let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                Ok(json!({"sum": sum}))
            }),
        )
        .unwrap();
    registry
        .register(
            "calc",
            "fail",
            "Always fails with a provider error",
            ToolSchema::empty(),
            handler_fn(|_| async { Err(ConnectorError::Provider("backend down".to_string())) }),
        )
        .unwrap();
    Arc::new(registry)
}

fn test_app() -> Router {
    create_router(test_registry())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_returns_all_tools_with_schemas() {
    let response = test_app()
        .oneshot(post_json("/tools/list", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    let tools = body["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 2);
    // Sorted by namespaced name
    assert_eq!(tools[0]["name"], "calc_add");
    assert_eq!(tools[1]["name"], "calc_fail");
    assert_eq!(tools[0]["schema"]["properties"]["a"]["type"], "integer");
    assert_eq!(tools[0]["schema"]["required"], json!(["a", "b"]));
}

#[tokio::test]
async fn test_call_executes_and_wraps_result() {
    let response = test_app()
        .oneshot(post_json(
            "/tools/call",
            json!({"name": "calc_add", "arguments": {"a": 2, "b": 3}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["result"]["sum"], 5);
}

#[tokio::test]
async fn test_unknown_tool_is_404_with_structured_error() {
    let response = test_app()
        .oneshot(post_json(
            "/tools/call",
            json!({"name": "calc_nope", "arguments": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "unknown_tool");
    assert!(body["error"]["message"].as_str().unwrap().contains("calc_nope"));
}

#[tokio::test]
async fn test_invalid_arguments_are_400() {
    let response = test_app()
        .oneshot(post_json(
            "/tools/call",
            json!({"name": "calc_add", "arguments": {"a": 2}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "tool_argument_error");
}

#[tokio::test]
async fn test_handler_failure_is_500_not_a_panic() {
    let response = test_app()
        .oneshot(post_json(
            "/tools/call",
            json!({"name": "calc_fail", "arguments": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body = body_json(response).await;
    assert_eq!(body["error"]["kind"], "provider_error");
}

#[tokio::test]
async fn test_missing_arguments_field_defaults_to_empty() {
    let registry = test_registry();
    registry
        .register(
            "calc",
            "ping",
            "No arguments",
            ToolSchema::empty(),
            handler_fn(|_| async { Ok(json!("pong")) }),
        )
        .unwrap();
    let response = create_router(registry)
        .oneshot(post_json("/tools/call", json!({"name": "calc_ping"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["result"], "pong");
}
