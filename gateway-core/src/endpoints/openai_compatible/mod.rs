//! OpenAI-compatible API endpoints.
//!
//! Chat completions, embeddings and the model list. Routing, request/response
//! conversion and the error envelope all live under this module.

pub mod chat_completions;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod types;

use chat_completions::chat_completions_handler;
use embeddings::embeddings_handler;
pub use error::{OpenAICompatibleError, OpenAIStructuredJson};
use models::{get_model_handler, list_models_handler};

use axum::Router;
use axum::routing::{get, post};

use crate::endpoints::RouteHandlers;
use crate::utils::gateway::AppStateData;

/// Constructs (but does not register) all of our OpenAI-compatible endpoints.
/// The `RouterExt::register_openai_compatible_routes` is a convenience method
/// to register all of the routes on a router.
pub fn build_openai_compatible_routes() -> RouteHandlers {
    RouteHandlers {
        routes: vec![
            ("/v1/chat/completions", post(chat_completions_handler)),
            ("/v1/embeddings", post(embeddings_handler)),
            ("/v1/models", get(list_models_handler)),
            // Catalog ids contain a `/`, e.g. `openai/gpt-oss-120b`
            ("/v1/models/{*model_id}", get(get_model_handler)),
        ],
    }
}

pub trait RouterExt {
    /// Applies our OpenAI-compatible endpoints to the router.
    fn register_openai_compatible_routes(self) -> Self;
}

impl RouterExt for Router<AppStateData> {
    fn register_openai_compatible_routes(mut self) -> Self {
        for (path, handler) in build_openai_compatible_routes().routes {
            self = self.route(path, handler);
        }
        self
    }
}
