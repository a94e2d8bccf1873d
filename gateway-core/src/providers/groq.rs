use lazy_static::lazy_static;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::error::Error;
use crate::inference::types::{GenerateRequest, GenerateResult, GenerationStream};
use crate::providers::chat_completions::{
    ChatCompletionRequest, ChatCompletionResponse, stream_chat_completions,
};
use crate::providers::helpers::{
    convert_stream_error, join_url, send_and_parse, serialize_request_body,
};
use crate::providers::{ApiKeyProviderConfig, ProviderContext, ProviderName};

const PROVIDER_NAME: ProviderName = ProviderName::Groq;

lazy_static! {
    static ref GROQ_DEFAULT_BASE_URL: Url = {
        #[expect(clippy::expect_used)]
        Url::parse("https://api.groq.com/openai/v1").expect("Failed to parse GROQ_DEFAULT_BASE_URL")
    };
}

pub struct GroqProvider {
    api_key: SecretString,
    base_url: Url,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GroqProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroqProvider")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl GroqProvider {
    pub fn new(config: &ApiKeyProviderConfig, ctx: &ProviderContext) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GROQ_DEFAULT_BASE_URL.clone()),
            http_client: ctx.http_client.clone(),
        }
    }

    fn chat_completions_request(
        &self,
        body: String,
    ) -> Result<reqwest::RequestBuilder, Error> {
        let url = join_url(&self.base_url, "chat/completions")?;
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(self.api_key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body))
    }

    pub async fn generate(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, Error> {
        let body = ChatCompletionRequest::new(PROVIDER_NAME, model_id, request, false)?;
        let body = serialize_request_body(PROVIDER_NAME, &body)?;
        let response: ChatCompletionResponse =
            send_and_parse(PROVIDER_NAME, self.chat_completions_request(body)?).await?;
        response.into_generate_result(PROVIDER_NAME)
    }

    pub async fn stream(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerationStream, Error> {
        let body = ChatCompletionRequest::new(PROVIDER_NAME, model_id, request, true)?;
        let body = serialize_request_body(PROVIDER_NAME, &body)?;
        let events = reqwest_sse_stream::into_sse_stream(self.chat_completions_request(body)?)
            .await;
        match events {
            Ok(events) => Ok(stream_chat_completions(PROVIDER_NAME, events)),
            Err(e) => Err(convert_stream_error(PROVIDER_NAME, e).await),
        }
    }
}
