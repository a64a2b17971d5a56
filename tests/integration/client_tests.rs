//! Integration tests for `AgentClient` against an in-process server.

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use agent_stream::client::AgentClient;
use agent_stream::framing::FramingMode;
use agent_stream::AppError;

use super::test_helpers::{closed_port_url, spawn_server, test_config};

fn agent_router() -> Router {
    Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route("/v1/health", get(|| async { Json(json!({"status": "alive"})) }))
        .route(
            "/transport/config",
            get(|| async { Json(json!({"transport": "SLIM"})) }),
        )
        .route(
            "/agent/prompt",
            post(|Json(body): Json<Value>| async move {
                let prompt = body["prompt"].as_str().unwrap_or_default().to_owned();
                Json(json!({"response": format!("echo: {prompt}")}))
            }),
        )
}

/// Health and transport endpoints decode into typed responses.
#[tokio::test]
async fn health_and_transport_config() {
    let base = spawn_server(agent_router()).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert_eq!(client.health().await.unwrap().status, "ok");
    assert_eq!(client.transport_config().await.unwrap().transport, "SLIM");
}

/// The connectivity check reads `/v1/health`.
#[tokio::test]
async fn connectivity_reports_alive() {
    let base = spawn_server(agent_router()).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert_eq!(client.connectivity().await.unwrap().status, "alive");
}

/// A failed connectivity check on a live agent is a transport error.
#[tokio::test]
async fn failed_connectivity_is_transport_error() {
    let router = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .route(
            "/v1/health",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "backend timeout") }),
        );
    let base = spawn_server(router).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert_eq!(client.health().await.unwrap().status, "ok");
    assert!(matches!(
        client.connectivity().await,
        Err(AppError::Transport(_))
    ));
}

/// The non-streaming prompt returns the `response` field.
#[tokio::test]
async fn prompt_returns_response_text() {
    let base = spawn_server(agent_router()).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert_eq!(client.prompt("hello").await.unwrap(), "echo: hello");
}

/// A base URL with a path prefix keeps the prefix for every endpoint.
#[tokio::test]
async fn base_path_prefix_is_preserved() {
    let router = Router::new().nest("/api", agent_router());
    let base = spawn_server(router).await;
    let client = AgentClient::new(&test_config(&format!("{base}/api"), FramingMode::Lines)).unwrap();

    assert_eq!(client.health().await.unwrap().status, "ok");
    assert!(client.base_url().path().ends_with("/api/"));
}

/// Non-success statuses are transport errors.
#[tokio::test]
async fn server_error_is_transport_error() {
    let router = Router::new().route(
        "/agent/prompt",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = spawn_server(router).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert!(matches!(
        client.prompt("hello").await,
        Err(AppError::Transport(_))
    ));
}

/// An unexpected body shape is a parse error.
#[tokio::test]
async fn unexpected_body_is_parse_error() {
    let router = Router::new().route(
        "/agent/prompt",
        post(|| async { Json(json!({"answer": "wrong field"})) }),
    );
    let base = spawn_server(router).await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert!(matches!(
        client.prompt("hello").await,
        Err(AppError::Parse(_))
    ));
}

/// Connection failures are transport errors.
#[tokio::test]
async fn unreachable_agent_is_transport_error() {
    let base = closed_port_url().await;
    let client = AgentClient::new(&test_config(&base, FramingMode::Lines)).unwrap();

    assert!(matches!(client.health().await, Err(AppError::Transport(_))));
}
