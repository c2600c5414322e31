//! HTTP API tests against the in-memory chain backend

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use scf_token_server::{api, config::Config, AppState};

fn create_test_app() -> Router {
    let config = Config {
        retry_base_delay: Duration::from_millis(1),
        balance_refresh_delay: Duration::from_millis(10),
        ..Config::default()
    };
    api::router(AppState::from_config(config).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(b) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&b).unwrap())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::GET, "/api/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mockChainBackend"], true);
}

#[tokio::test]
async fn test_balances_before_connect_are_flagged() {
    let app = create_test_app();
    let (status, body) = send(&app, Method::GET, "/api/balances", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cat"]["isRealData"], false);
    assert_eq!(body["cat"]["formatted"], "1,000");
    assert_eq!(body["account"], Value::Null);
}

#[tokio::test]
async fn test_operations_require_connection() {
    let app = create_test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tokens/transfer",
        Some(json!({"recipient": "0xb0b", "amount": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "NOT_CONNECTED");
}

#[tokio::test]
async fn test_connect_and_transfer() {
    let app = create_test_app();

    let (status, wallets) = send(&app, Method::GET, "/api/wallets", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallets["wallets"], json!(["mock-wallet"]));

    let (status, state) = send(&app, Method::POST, "/api/wallet/connect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["isConnected"], true);
    assert_eq!(state["catBalance"]["isRealData"], true);

    let (status, result) = send(
        &app,
        Method::POST,
        "/api/tokens/transfer",
        Some(json!({"recipient": "0xb0b", "amount": "100.25"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(result["status"], "pending");
    let tx_hash = result["transactionHash"].as_str().unwrap().to_string();

    // The mock confirms immediately; give the monitor a moment
    tokio::time::sleep(Duration::from_millis(100)).await;
    let (status, tx) = send(&app, Method::GET, &format!("/api/transactions/{}", tx_hash), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tx["status"], "confirmed");

    let (status, balances) = send(&app, Method::POST, "/api/balances/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balances["cat"]["formatted"], "899.75");
    assert_eq!(balances["cat"]["numericValue"], 899.75);
}

#[tokio::test]
async fn test_transfer_over_balance_is_rejected() {
    let app = create_test_app();
    send(&app, Method::POST, "/api/wallet/connect", None).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tokens/transfer",
        Some(json!({"recipient": "0xb0b", "amount": "1000.5"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INSUFFICIENT_BALANCE");
}

#[tokio::test]
async fn test_request_validation() {
    let app = create_test_app();
    send(&app, Method::POST, "/api/wallet/connect", None).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tokens/issue",
        Some(json!({"recipient": "", "amount": "5"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tokens/issue",
        Some(json!({"recipient": "not-an-address", "amount": "5"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_ADDRESS");
}

#[tokio::test]
async fn test_issue_and_supply() {
    let app = create_test_app();
    send(&app, Method::POST, "/api/wallet/connect", None).await;

    let (status, result) = send(
        &app,
        Method::POST,
        "/api/tokens/issue",
        Some(json!({"recipient": "0xb0b", "amount": "500"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(result["operation"], "mint");

    let (status, supply) = send(&app, Method::GET, "/api/tokens/supply?token=cat", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(supply["formatted"], "1,500");
}

#[tokio::test]
async fn test_unknown_transaction() {
    let app = create_test_app();
    let (status, _) = send(&app, Method::GET, "/api/transactions/0x1234", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/api/transactions/nothex", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_resets_state() {
    let app = create_test_app();
    send(&app, Method::POST, "/api/wallet/connect", None).await;
    let (status, state) = send(&app, Method::POST, "/api/wallet/disconnect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(state["isConnected"], false);
    assert_eq!(state["catBalance"]["isRealData"], false);
}

#[tokio::test]
async fn test_rpc_endpoint_forwards_to_mcp() {
    let app = create_test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/rpc",
        Some(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["result"]["tools"].as_array().unwrap().len() >= 9);
}
