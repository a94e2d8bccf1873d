//! An in-process gateway wired to a fake Groq upstream.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::print_stdout,
    clippy::allow_attributes
)]
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use gateway_core::catalog::Catalog;
use gateway_core::db::{BranchQueries, ProviderConfigQueries};
use gateway_core::endpoints::fallback::handle_404;
use gateway_core::endpoints::openai_compatible::RouterExt as _;
use gateway_core::endpoints::status::{health_handler, root_handler};
use gateway_core::error::Error;
use gateway_core::model_config::ModelConfig;
use gateway_core::providers::{ProviderConfig, ProviderContext, ProviderName};
use gateway_core::secrets::StaticSecretStore;
use gateway_core::utils::gateway::AppStateData;
use serde_json::{Value, json};

/// Branches keyed by `(agent, branch)`.
#[derive(Default)]
pub struct InMemoryBranches {
    branches: HashMap<(String, String), Vec<ModelConfig>>,
}

impl InMemoryBranches {
    pub fn with_model(
        mut self,
        agent: &str,
        branch: &str,
        alias: &str,
        model_type: &str,
        custom_routing: Option<&str>,
    ) -> Self {
        self.branches
            .entry((agent.to_string(), branch.to_string()))
            .or_default()
            .push(ModelConfig {
                alias: alias.to_string(),
                model_type: model_type.to_string(),
                custom_routing: custom_routing.map(str::to_string),
            });
        self
    }
}

#[async_trait]
impl BranchQueries for InMemoryBranches {
    async fn get_branch_models(
        &self,
        agent_slug: &str,
        branch_slug: &str,
    ) -> Result<Option<Vec<ModelConfig>>, Error> {
        Ok(self
            .branches
            .get(&(agent_slug.to_string(), branch_slug.to_string()))
            .cloned())
    }
}

/// A tenant that has stored no provider credentials.
pub struct NoStoredProviders;

#[async_trait]
impl ProviderConfigQueries for NoStoredProviders {
    async fn get_unredacted_provider_config(
        &self,
        _name: ProviderName,
    ) -> Result<Option<ProviderConfig>, Error> {
        Ok(None)
    }
}

#[derive(Clone, Default)]
pub struct UpstreamState {
    pub requests: Arc<AtomicUsize>,
    pub last_body: Arc<std::sync::Mutex<Option<Value>>>,
}

impl UpstreamState {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_body(&self) -> Value {
        self.last_body.lock().unwrap().clone().unwrap()
    }
}

fn sse_body(events: &[Value]) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {event}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

async fn fake_groq_chat_completions(
    State(state): State<UpstreamState>,
    axum::Json(body): axum::Json<Value>,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    let stream = body["stream"].as_bool().unwrap_or(false);
    *state.last_body.lock().unwrap() = Some(body);
    if stream {
        let body = sse_body(&[
            json!({"id": "u1", "choices": [{"index": 0, "delta": {"role": "assistant", "content": "Hello"}, "finish_reason": null}]}),
            json!({"id": "u1", "choices": [{"index": 0, "delta": {"content": " there"}, "finish_reason": null}]}),
            json!({"id": "u1", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
                   "x_groq": {"usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}}}),
        ]);
        ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
    } else {
        axum::Json(json!({
            "id": "u1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello there"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}
        }))
        .into_response()
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn start_fake_groq() -> (SocketAddr, UpstreamState) {
    let state = UpstreamState::default();
    let router = Router::new()
        .route(
            "/openai/v1/chat/completions",
            post(fake_groq_chat_completions),
        )
        .with_state(state.clone());
    (serve(router).await, state)
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub upstream: UpstreamState,
    pub state: AppStateData,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

/// Starts a gateway whose Groq traffic goes to a fake upstream.
pub async fn start_gateway(branches: InMemoryBranches) -> TestGateway {
    let (upstream_addr, upstream) = start_fake_groq().await;
    let secrets = StaticSecretStore::new()
        .with("GroqApiKey", "gsk-test")
        .with("GroqBaseUrl", &format!("http://{upstream_addr}/openai/v1"));
    let state = AppStateData::new(
        Arc::new(Catalog::embedded().unwrap()),
        ProviderContext {
            secrets: Arc::new(secrets),
            http_client: reqwest::Client::new(),
            is_remote: false,
        },
        Arc::new(branches),
        Arc::new(NoStoredProviders),
    );
    let router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .register_openai_compatible_routes()
        .fallback(handle_404)
        .with_state(state.clone());
    TestGateway {
        addr: serve(router).await,
        upstream,
        state,
    }
}
