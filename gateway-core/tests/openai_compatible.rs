use futures::StreamExt;
use gateway_core::ui_stream::{UiMessageChunk, translate_sse_stream};
use reqwest::StatusCode;
use serde_json::{Value, json};

use crate::common::{InMemoryBranches, start_gateway};

mod common;

fn acme_branches() -> InMemoryBranches {
    InMemoryBranches::default()
        .with_model("acme", "main", "default", "openai/gpt-oss-120b", None)
        .with_model("acme", "main", "custom", "openai/gpt-oss-120b", Some("bedrock"))
        .with_model("acme", "main", "embedder", "cohere/embed-v4.0", None)
}

#[tokio::test]
async fn test_chat_completion_routes_to_first_catalog_provider() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [
                {"role": "system", "content": "Be brief."},
                {"role": "user", "content": "Hi"}
            ],
            "max_tokens": 32,
            "temperature": 0.2
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "acme/main/default");
    assert_eq!(body["choices"][0]["message"]["content"], "Hello there");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["total_tokens"], 11);

    assert_eq!(gateway.upstream.request_count(), 1);
    let upstream_body = gateway.upstream.last_body();
    assert_eq!(upstream_body["model"], "openai/gpt-oss-120b");
    assert_eq!(upstream_body["messages"][0]["role"], "system");
    assert_eq!(upstream_body["temperature"], json!(0.2));

    // A second request reuses the cached Groq client.
    reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [{"role": "user", "content": "Again"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(gateway.state.provider_cache.len(), 1);
    assert_eq!(gateway.upstream.request_count(), 2);
}

#[tokio::test]
async fn test_streaming_chat_completion_ends_with_done() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.text().await.unwrap();
    let data = body
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .collect::<Vec<_>>();
    assert_eq!(data.last(), Some(&"[DONE]"));

    let chunks = data[..data.len() - 1]
        .iter()
        .map(|d| serde_json::from_str::<Value>(d).unwrap())
        .collect::<Vec<_>>();
    let text = chunks
        .iter()
        .filter_map(|c| c["choices"][0]["delta"]["content"].as_str())
        .collect::<String>();
    assert_eq!(text, "Hello there");
    let last = chunks.last().unwrap();
    assert_eq!(last["object"], "chat.completion.chunk");
    assert_eq!(last["choices"][0]["finish_reason"], "stop");
    assert_eq!(last["usage"]["total_tokens"], 11);
    assert!(chunks.iter().all(|c| c["id"] == chunks[0]["id"]));
    assert_eq!(gateway.upstream.last_body()["stream"], true);
}

#[tokio::test]
async fn test_ui_translator_over_gateway_stream() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        }))
        .send()
        .await
        .unwrap();
    let events = reqwest_sse_stream::events_from_byte_stream(response.bytes_stream());
    let chunks = translate_sse_stream(events).collect::<Vec<_>>().await;

    let deltas = chunks
        .iter()
        .filter_map(|chunk| match chunk {
            UiMessageChunk::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect::<String>();
    assert_eq!(deltas, "Hello there");
    assert!(matches!(chunks.first(), Some(UiMessageChunk::Start { .. })));
    assert!(matches!(
        chunks.get(1),
        Some(UiMessageChunk::TextStart { .. })
    ));
    assert_eq!(
        chunks.last(),
        Some(&UiMessageChunk::Finish {
            finish_reason: "stop".to_string()
        })
    );
    assert!(
        !chunks
            .iter()
            .any(|chunk| matches!(chunk, UiMessageChunk::Error { .. })),
        "Unexpected error chunk: {chunks:?}"
    );
}

#[tokio::test]
async fn test_custom_routing_without_stored_config_is_rejected() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/custom",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "provider_unsupported");
    assert_eq!(gateway.upstream.request_count(), 0);
    assert!(gateway.state.provider_cache.is_empty());
}

#[tokio::test]
async fn test_dangling_tool_result_fails_before_upstream_call() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default",
            "messages": [
                {"role": "user", "content": "What's the weather?"},
                {"role": "tool", "tool_call_id": "call_missing", "content": "sunny"}
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "server_error");
    assert_eq!(gateway.upstream.request_count(), 0);
}

#[tokio::test]
async fn test_unknown_alias_and_branch() {
    let gateway = start_gateway(acme_branches()).await;
    let client = reqwest::Client::new();
    for (model, status) in [
        ("acme/main/missing", StatusCode::NOT_FOUND),
        ("acme/other/default", StatusCode::NOT_FOUND),
        ("acme/main", StatusCode::NOT_FOUND),
    ] {
        let response = client
            .post(gateway.url("/v1/chat/completions"))
            .json(&json!({
                "model": model,
                "messages": [{"role": "user", "content": "Hi"}]
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), status, "Unexpected status for `{model}`");
        let body: Value = response.json().await.unwrap();
        assert!(body["error"]["message"].is_string());
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], "not_found", "Unexpected code for `{model}`");
    }
    assert_eq!(gateway.upstream.request_count(), 0);
}

#[tokio::test]
async fn test_segments_after_alias_are_ignored() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/default/extra",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(gateway.upstream.request_count(), 1);
    assert_eq!(gateway.upstream.last_body()["model"], "openai/gpt-oss-120b");
}

#[tokio::test]
async fn test_embedding_model_rejected_for_chat() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({
            "model": "acme/main/embedder",
            "messages": [{"role": "user", "content": "Hi"}]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gateway.upstream.request_count(), 0);
}

#[tokio::test]
async fn test_malformed_request_body() {
    let gateway = start_gateway(acme_branches()).await;
    let response = reqwest::Client::new()
        .post(gateway.url("/v1/chat/completions"))
        .json(&json!({"model": "acme/main/default"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["param"], Value::Null);
}

#[tokio::test]
async fn test_models_health_and_fallback() {
    let gateway = start_gateway(acme_branches()).await;
    let client = reqwest::Client::new();

    let models: Value = client
        .get(gateway.url("/v1/models"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(models["object"], "list");
    assert!(
        models["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|m| m["id"] == "openai/gpt-oss-120b")
    );

    let model = client
        .get(gateway.url("/v1/models/openai/gpt-oss-120b"))
        .send()
        .await
        .unwrap();
    assert_eq!(model.status(), StatusCode::OK);
    let model: Value = model.json().await.unwrap();
    assert_eq!(model["id"], "openai/gpt-oss-120b");

    let missing = client
        .get(gateway.url("/v1/models/acme/not-a-model"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let health: Value = client
        .get(gateway.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health, json!({"gateway": "ok"}));

    let root = client.get(gateway.url("/")).send().await.unwrap();
    assert_eq!(root.text().await.unwrap(), "Gateway says hello!");

    let not_found = client.get(gateway.url("/v2/nothing")).send().await.unwrap();
    assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
    let body: Value = not_found.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");
}
