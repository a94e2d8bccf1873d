use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, ErrorDetails};
use crate::inference::types::EmbeddingResult;
use crate::providers::helpers::{join_url, send_and_parse, serialize_request_body};
use crate::providers::{ApiKeyProviderConfig, ProviderContext, ProviderName};

const PROVIDER_NAME: ProviderName = ProviderName::Voyage;

lazy_static! {
    static ref VOYAGE_DEFAULT_BASE_URL: Url = {
        #[expect(clippy::expect_used)]
        Url::parse("https://api.voyageai.com/v1").expect("Failed to parse VOYAGE_DEFAULT_BASE_URL")
    };
}

pub struct VoyageProvider {
    api_key: SecretString,
    base_url: Url,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for VoyageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoyageProvider")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl VoyageProvider {
    pub fn new(config: &ApiKeyProviderConfig, ctx: &ProviderContext) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| VOYAGE_DEFAULT_BASE_URL.clone()),
            http_client: ctx.http_client.clone(),
        }
    }

    pub async fn embed(&self, model_id: &str, inputs: &[String]) -> Result<EmbeddingResult, Error> {
        let body = serialize_request_body(
            PROVIDER_NAME,
            &VoyageEmbeddingRequest {
                model: model_id,
                input: inputs,
            },
        )?;
        let request = self
            .http_client
            .post(join_url(&self.base_url, "embeddings")?)
            .bearer_auth(self.api_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        let response: VoyageEmbeddingResponse = send_and_parse(PROVIDER_NAME, request).await?;
        response.into_embedding_result(inputs.len())
    }
}

#[derive(Debug, Serialize)]
struct VoyageEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct VoyageEmbeddingResponse {
    data: Vec<VoyageEmbedding>,
    #[serde(default)]
    usage: Option<VoyageUsage>,
}

#[derive(Debug, Deserialize)]
struct VoyageEmbedding {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct VoyageUsage {
    total_tokens: Option<u32>,
}

impl VoyageEmbeddingResponse {
    fn into_embedding_result(mut self, expected: usize) -> Result<EmbeddingResult, Error> {
        if self.data.len() != expected {
            return Err(Error::new(ErrorDetails::UpstreamResponse {
                provider: PROVIDER_NAME,
                message: format!(
                    "Expected {expected} embeddings, got {}",
                    self.data.len()
                ),
                raw_response: None,
            }));
        }
        self.data.sort_by_key(|embedding| embedding.index);
        Ok(EmbeddingResult {
            embeddings: self.data.into_iter().map(|e| e.embedding).collect(),
            input_tokens: self.usage.and_then(|usage| usage.total_tokens),
        })
    }
}
