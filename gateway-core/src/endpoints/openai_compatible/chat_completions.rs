//! Chat completions endpoint handler for OpenAI-compatible API.
//!
//! This module implements the HTTP handler for the `/v1/chat/completions` endpoint.
//! The request's `model` is an alias path, resolved to a provider client before the
//! call; the response is either a single completion or an SSE stream of chunks.

use axum::Json;
use axum::extract::State;
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::instrument;

use crate::catalog::Modality;
use crate::observability::REQUESTS_TOTAL;
use crate::utils::gateway::{AppState, AppStateData};

use super::types::chat_completions::{OpenAICompatibleParams, OpenAICompatibleResponse};
use super::types::streaming::prepare_serialized_openai_compatible_events;
use super::{OpenAICompatibleError, OpenAIStructuredJson};

/// A handler for the OpenAI-compatible chat completions endpoint
#[instrument(
    name = "chat_completions",
    skip_all,
    fields(model = tracing::field::Empty, stream = tracing::field::Empty)
)]
pub async fn chat_completions_handler(
    State(app_state): AppState,
    OpenAIStructuredJson(params): OpenAIStructuredJson<OpenAICompatibleParams>,
) -> Result<Response, OpenAICompatibleError> {
    let span = tracing::Span::current();
    span.record("model", params.model.as_str());
    span.record("stream", params.is_streaming());
    counter!(REQUESTS_TOTAL, "endpoint" => "chat_completions").increment(1);
    chat_completions(&app_state, params).await
}

async fn chat_completions(
    app_state: &AppStateData,
    params: OpenAICompatibleParams,
) -> Result<Response, OpenAICompatibleError> {
    // Convert the conversation first, so a malformed one never reaches a provider.
    let mut request = params.to_generate_request()?;
    let resolved = app_state
        .model_resolver()
        .resolve(&params.model, Modality::Chat)
        .await?;
    request.reasoning = params.reasoning_config(resolved.definition.family)?;

    if params.is_streaming() {
        let stream = resolved
            .provider
            .stream(&resolved.model_id, &request)
            .await?;
        let events = prepare_serialized_openai_compatible_events(stream, params.model);
        Ok(Sse::new(events)
            .keep_alive(KeepAlive::new())
            .into_response())
    } else {
        let result = resolved
            .provider
            .generate(&resolved.model_id, &request)
            .await?;
        Ok(Json(OpenAICompatibleResponse::new(&result, params.model)).into_response())
    }
}
