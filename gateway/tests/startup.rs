mod common;

use reqwest::StatusCode;
use serde_json::{Value, json};

use common::start_gateway_on_random_port;

#[tokio::test]
async fn test_gateway_serves_status_routes() {
    let child_data = start_gateway_on_random_port("").await;
    let client = reqwest::Client::new();

    let root = client
        .get(format!("http://{}/", child_data.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(root.text().await.unwrap(), "Gateway says hello!");

    let health: Value = client
        .get(format!("http://{}/health", child_data.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"gateway": "ok"}));

    assert!(
        child_data
            .output
            .iter()
            .any(|line| line.contains("PostgreSQL: disabled")),
        "Expected startup summary in output: {:?}",
        child_data.output
    );
}

#[tokio::test]
async fn test_gateway_lists_embedded_catalog() {
    let child_data = start_gateway_on_random_port("[gateway]\nis_remote = false\n").await;
    let models: Value = reqwest::Client::new()
        .get(format!("http://{}/v1/models", child_data.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    assert!(!models["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_metrics_count_requests() {
    let child_data = start_gateway_on_random_port("").await;
    let client = reqwest::Client::new();

    // Without Postgres the model lookup fails, but the request is still counted.
    let response = client
        .post(format!("http://{}/v1/chat/completions", child_data.addr))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "server_error");

    let metrics = client
        .get(format!("http://{}/metrics", child_data.addr))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(
        metrics.contains("gateway_requests_total{endpoint=\"chat_completions\"} 1"),
        "Missing request counter in metrics:\n{metrics}"
    );
}

#[tokio::test]
async fn test_gateway_unknown_route() {
    let child_data = start_gateway_on_random_port("").await;
    let response = reqwest::Client::new()
        .get(format!("http://{}/inference", child_data.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
