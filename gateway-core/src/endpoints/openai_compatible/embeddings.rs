//! Embeddings endpoint handler for OpenAI-compatible API.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::instrument;

use crate::catalog::Modality;
use crate::observability::REQUESTS_TOTAL;
use crate::utils::gateway::AppState;

use super::types::embeddings::{OpenAICompatibleEmbeddingParams, OpenAIEmbeddingResponse};
use super::{OpenAICompatibleError, OpenAIStructuredJson};

#[instrument(name = "embeddings", skip_all, fields(model = tracing::field::Empty))]
pub async fn embeddings_handler(
    State(app_state): AppState,
    OpenAIStructuredJson(params): OpenAIStructuredJson<OpenAICompatibleEmbeddingParams>,
) -> Result<Response, OpenAICompatibleError> {
    tracing::Span::current().record("model", params.model.as_str());
    counter!(REQUESTS_TOTAL, "endpoint" => "embeddings").increment(1);
    let inputs = params.inputs()?;
    let resolved = app_state
        .model_resolver()
        .resolve(&params.model, Modality::Embedding)
        .await?;
    let result = resolved.provider.embed(&resolved.model_id, &inputs).await?;
    Ok(Json(OpenAIEmbeddingResponse::new(result, params.model)).into_response())
}
