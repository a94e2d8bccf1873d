//! AWS Bedrock model provider using direct HTTP calls to the Converse API.
//!
//! The gateway never talks to Bedrock with ambient credentials: every client
//! assumes the configured role first and signs requests with the temporary
//! credentials it gets back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_smithy_eventstream::frame::{DecodedFrame, MessageFrameDecoder};
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use bytes::BytesMut;
use futures::StreamExt;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use url::Url;

#[cfg(test)]
use mockall::automock;

use super::aws_common::{
    SdkStsClient, StsOperations, check_eventstream_exception, config_with_region,
    eventstream_event_type, send_aws_request,
};
use super::chat_completions::parse_tool_arguments;
use super::helpers::{parse_response, serialize_request_body};
use super::{AwsProviderConfig, ProviderContext, ProviderName, optional_url_secret};
use crate::error::{BadRequestCode, DisplayOrDebug, Error, ErrorDetails};
use crate::inference::reasoning::ReasoningConfig;
use crate::inference::types::{
    AssistantContent, AssistantContentPart, EmbeddingResult, FinishReason, GenerateRequest,
    GenerateResult, GenerationMessage, GenerationStream, ImageData, StreamPart, ToolCallPart,
    ToolChoice, ToolResultOutput, Usage, UserContent, UserContentPart,
};
use crate::secrets::SecretStore;

const PROVIDER_NAME: ProviderName = ProviderName::Bedrock;
const SIGNING_SERVICE: &str = "bedrock";
pub const ROLE_SESSION_NAME: &str = "GatewayBedrockSession";
/// Assumed credentials are renewed this long before they expire.
const CREDENTIALS_REFRESH_MARGIN: Duration = Duration::from_secs(300);
const INPUT_TOKEN_COUNT_HEADER: &str = "x-amzn-bedrock-input-token-count";

/// Reads the platform's own Bedrock role and region.
pub async fn get_default_config(secrets: &dyn SecretStore) -> Result<AwsProviderConfig, Error> {
    Ok(AwsProviderConfig {
        bedrock_role_arn: secrets.get("BedrockRoleArn").await?.expose_secret().to_string(),
        region: secrets.get("BedrockRegion").await?.expose_secret().to_string(),
        base_url: optional_url_secret(secrets, "BedrockBaseUrl").await?,
    })
}

/// AWS Bedrock provider using direct HTTP calls.
pub struct AWSBedrockProvider {
    role_arn: String,
    region: String,
    base_url: Url,
    http_client: reqwest::Client,
    sts: Arc<dyn StsOperations>,
    credentials: Mutex<Credentials>,
}

impl std::fmt::Debug for AWSBedrockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AWSBedrockProvider")
            .field("role_arn", &self.role_arn)
            .field("region", &self.region)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl AWSBedrockProvider {
    /// Assumes the configured role. Fails with `UpstreamAuthFailed` if STS refuses.
    pub async fn new(config: &AwsProviderConfig, ctx: &ProviderContext) -> Result<Self, Error> {
        let sts = SdkStsClient::new(&config.region, PROVIDER_NAME).await;
        Self::with_sts(config, ctx, Arc::new(sts)).await
    }

    pub async fn with_sts(
        config: &AwsProviderConfig,
        ctx: &ProviderContext,
        sts: Arc<dyn StsOperations>,
    ) -> Result<Self, Error> {
        let base_url = match &config.base_url {
            Some(base_url) => base_url.clone(),
            None => default_base_url(&config.region)?,
        };
        let credentials = sts
            .assume_role(&config.bedrock_role_arn, ROLE_SESSION_NAME)
            .await?;
        Ok(Self {
            role_arn: config.bedrock_role_arn.clone(),
            region: config.region.clone(),
            base_url,
            http_client: ctx.http_client.clone(),
            sts,
            credentials: Mutex::new(credentials),
        })
    }

    async fn current_credentials(&self) -> Result<Credentials, Error> {
        let mut credentials = self.credentials.lock().await;
        if needs_refresh(&credentials, SystemTime::now()) {
            tracing::debug!("Refreshing assumed credentials for `{}`", self.role_arn);
            *credentials = self
                .sts
                .assume_role(&self.role_arn, ROLE_SESSION_NAME)
                .await?;
        }
        Ok(credentials.clone())
    }

    fn model_url(&self, model_id: &str, operation: &str) -> String {
        format!(
            "{}/model/{}/{operation}",
            self.base_url.as_str().trim_end_matches('/'),
            urlencoding::encode(model_id)
        )
    }

    async fn send(
        &self,
        model_id: &str,
        operation: &str,
        body: String,
        accept: &'static str,
    ) -> Result<reqwest::Response, Error> {
        let credentials = self.current_credentials().await?;
        send_aws_request(
            &self.http_client,
            &self.model_url(model_id, operation),
            body.into_bytes(),
            &credentials,
            &self.region,
            SIGNING_SERVICE,
            PROVIDER_NAME,
            accept,
        )
        .await
    }

    pub async fn generate(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, Error> {
        let body = serialize_request_body(PROVIDER_NAME, &ConverseRequest::new(request)?)?;
        let response = self
            .send(model_id, "converse", body, "application/json")
            .await?;
        let raw_response = response.text().await.map_err(|e| {
            Error::new(ErrorDetails::UpstreamTransport {
                provider: PROVIDER_NAME,
                message: format!("Error reading response body: {}", DisplayOrDebug::display(e)),
            })
        })?;
        let response: ConverseResponse = parse_response(PROVIDER_NAME, &raw_response)?;
        response.try_into()
    }

    pub async fn stream(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerationStream, Error> {
        let body = serialize_request_body(PROVIDER_NAME, &ConverseRequest::new(request)?)?;
        let response = self
            .send(
                model_id,
                "converse-stream",
                body,
                "application/vnd.amazon.eventstream",
            )
            .await?;
        Ok(stream_bedrock(response.bytes_stream()))
    }

    /// Embeds `inputs` with a Cohere embedding model hosted on Bedrock.
    pub async fn embed(&self, model_id: &str, inputs: &[String]) -> Result<EmbeddingResult, Error> {
        let body = serialize_request_body(
            PROVIDER_NAME,
            &BedrockEmbeddingRequest {
                texts: inputs,
                input_type: "search_document",
                embedding_types: &["float"],
            },
        )?;
        let response = self.send(model_id, "invoke", body, "application/json").await?;
        let input_tokens = response
            .headers()
            .get(INPUT_TOKEN_COUNT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let raw_response = response.text().await.map_err(|e| {
            Error::new(ErrorDetails::UpstreamTransport {
                provider: PROVIDER_NAME,
                message: format!("Error reading response body: {}", DisplayOrDebug::display(e)),
            })
        })?;
        let response: BedrockEmbeddingResponse = parse_response(PROVIDER_NAME, &raw_response)?;
        Ok(EmbeddingResult {
            embeddings: response.embeddings.into_float(),
            input_tokens,
        })
    }
}

fn default_base_url(region: &str) -> Result<Url, Error> {
    Url::parse(&format!("https://bedrock-runtime.{region}.amazonaws.com")).map_err(|e| {
        Error::new(ErrorDetails::InvalidProviderConfig {
            provider: PROVIDER_NAME,
            message: format!("Invalid region `{region}`: {e}"),
        })
    })
}

fn needs_refresh(credentials: &Credentials, now: SystemTime) -> bool {
    credentials
        .expiry()
        .is_some_and(|expiry| expiry <= now + CREDENTIALS_REFRESH_MARGIN)
}

// =============================================================================
// Inference profiles
// =============================================================================

#[derive(Debug, Default)]
pub struct InferenceProfilePage {
    pub arns: Vec<String>,
    pub next_token: Option<String>,
}

/// One page of `ListInferenceProfiles`.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait InferenceProfileLister: Send + Sync {
    async fn list_page(&self, next_token: Option<String>) -> Result<InferenceProfilePage, Error>;
}

/// `InferenceProfileLister` backed by the Bedrock control-plane SDK.
pub struct SdkInferenceProfileLister {
    client: aws_sdk_bedrock::Client,
}

impl SdkInferenceProfileLister {
    pub async fn new(region: &str, credentials: Credentials) -> Self {
        let sdk_config = config_with_region(region).await;
        let bedrock_config = aws_sdk_bedrock::config::Builder::from(&sdk_config)
            .credentials_provider(credentials)
            .build();
        Self {
            client: aws_sdk_bedrock::Client::from_conf(bedrock_config),
        }
    }
}

#[async_trait]
impl InferenceProfileLister for SdkInferenceProfileLister {
    async fn list_page(&self, next_token: Option<String>) -> Result<InferenceProfilePage, Error> {
        let output = self
            .client
            .list_inference_profiles()
            .set_next_token(next_token)
            .send()
            .await
            .map_err(|e| {
                Error::new(ErrorDetails::UpstreamTransport {
                    provider: PROVIDER_NAME,
                    message: format!(
                        "Failed to list inference profiles: {}",
                        DisplayOrDebug::debug(e)
                    ),
                })
            })?;
        Ok(InferenceProfilePage {
            arns: output
                .inference_profile_summaries()
                .iter()
                .map(|summary| summary.inference_profile_arn().to_string())
                .collect(),
            next_token: output.next_token().map(str::to_string),
        })
    }
}

/// Maps a base model id onto the inference profile ARN Bedrock expects for on-demand use.
pub async fn transform_model_id(
    model_id: &str,
    config: &AwsProviderConfig,
    _ctx: &ProviderContext,
) -> Result<String, Error> {
    let sts = SdkStsClient::new(&config.region, PROVIDER_NAME).await;
    let credentials = sts
        .assume_role(&config.bedrock_role_arn, ROLE_SESSION_NAME)
        .await?;
    let lister = SdkInferenceProfileLister::new(&config.region, credentials).await;
    resolve_inference_profile(&lister, model_id).await
}

/// Returns the first profile ARN containing `model_id`, or `model_id` itself once
/// every page has been checked.
pub async fn resolve_inference_profile(
    lister: &dyn InferenceProfileLister,
    model_id: &str,
) -> Result<String, Error> {
    let mut next_token = None;
    loop {
        let page = lister.list_page(next_token).await?;
        if let Some(arn) = page.arns.into_iter().find(|arn| arn.contains(model_id)) {
            tracing::debug!("Resolved Bedrock model `{model_id}` to inference profile `{arn}`");
            return Ok(arn);
        }
        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }
    tracing::warn!("No Bedrock inference profile matches `{model_id}`, using the base model id");
    Ok(model_id.to_string())
}

// =============================================================================
// Request conversion
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConverseRequest<'a> {
    messages: Vec<BedrockMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    system: Vec<SystemContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inference_config: Option<InferenceConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ToolConfig<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    additional_model_request_fields: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum SystemContentBlock {
    Text(String),
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct InferenceConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum BedrockRole {
    User,
    Assistant,
}

#[derive(Debug, Serialize)]
struct BedrockMessage {
    role: BedrockRole,
    content: Vec<BedrockContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum BedrockContentBlock {
    Text(String),
    Image(BedrockImageBlock),
    Document(BedrockDocumentBlock),
    ToolUse(BedrockToolUse),
    ToolResult(BedrockToolResult),
}

#[derive(Debug, Serialize)]
struct BedrockImageBlock {
    format: &'static str,
    source: BedrockBytesSource,
}

#[derive(Debug, Serialize)]
struct BedrockDocumentBlock {
    format: &'static str,
    name: String,
    source: BedrockBytesSource,
}

#[derive(Debug, Serialize)]
struct BedrockBytesSource {
    bytes: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolUse {
    tool_use_id: String,
    name: String,
    input: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolResult {
    tool_use_id: String,
    content: Vec<BedrockToolResultContent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum BedrockToolResultContent {
    Json(Value),
    Text(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolConfig<'a> {
    tools: Vec<BedrockTool<'a>>,
    tool_choice: BedrockToolChoice<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum BedrockTool<'a> {
    ToolSpec(BedrockToolSpec<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BedrockToolSpec<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    input_schema: BedrockToolInputSchema<'a>,
}

#[derive(Debug, Serialize)]
struct BedrockToolInputSchema<'a> {
    json: &'a Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum BedrockToolChoice<'a> {
    Auto {},
    Any {},
    Tool { name: &'a str },
}

impl<'a> ConverseRequest<'a> {
    fn new(request: &'a GenerateRequest) -> Result<Self, Error> {
        let (system, conversation) = request.system_and_conversation();
        let mut messages: Vec<BedrockMessage> = Vec::with_capacity(conversation.len());
        for message in conversation {
            let (role, content) = convert_message(message)?;
            if content.is_empty() {
                continue;
            }
            // Bedrock rejects consecutive turns with the same role.
            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(content),
                _ => messages.push(BedrockMessage { role, content }),
            }
        }

        let inference_config = InferenceConfig {
            max_tokens: request.max_output_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: (!request.stop.is_empty()).then_some(request.stop.as_slice()),
        };
        let has_inference_config = inference_config.max_tokens.is_some()
            || inference_config.temperature.is_some()
            || inference_config.top_p.is_some()
            || inference_config.stop_sequences.is_some();

        Ok(Self {
            messages,
            system: system.map(SystemContentBlock::Text).into_iter().collect(),
            inference_config: has_inference_config.then_some(inference_config),
            tool_config: convert_tool_config(request),
            additional_model_request_fields: request.reasoning.as_ref().map(|reasoning| {
                match reasoning {
                    ReasoningConfig::Effort(effort) => json!({ "reasoning_effort": effort }),
                    ReasoningConfig::ThinkingBudget { budget_tokens, .. } => json!({
                        "thinking": { "type": "enabled", "budget_tokens": budget_tokens }
                    }),
                }
            }),
        })
    }
}

/// `ToolChoice::None` and an empty tool list both mean no tool config at all.
fn convert_tool_config(request: &GenerateRequest) -> Option<ToolConfig<'_>> {
    if request.tools.is_empty() {
        return None;
    }
    let tool_choice = match request.tool_choice.as_ref() {
        Some(ToolChoice::None) => return None,
        Some(ToolChoice::Auto) | None => BedrockToolChoice::Auto {},
        Some(ToolChoice::Required) => BedrockToolChoice::Any {},
        Some(ToolChoice::Tool { tool_name }) => BedrockToolChoice::Tool { name: tool_name },
    };
    Some(ToolConfig {
        tools: request
            .tools
            .iter()
            .map(|tool| {
                BedrockTool::ToolSpec(BedrockToolSpec {
                    name: &tool.name,
                    description: tool.description.as_deref(),
                    input_schema: BedrockToolInputSchema {
                        json: &tool.input_schema,
                    },
                })
            })
            .collect(),
        tool_choice,
    })
}

fn convert_message(
    message: &GenerationMessage,
) -> Result<(BedrockRole, Vec<BedrockContentBlock>), Error> {
    Ok(match message {
        // Already hoisted into the `system` field.
        GenerationMessage::System { .. } => (BedrockRole::User, vec![]),
        GenerationMessage::User { content } => {
            let blocks = match content {
                UserContent::Text(text) => vec![BedrockContentBlock::Text(text.clone())],
                UserContent::Parts(parts) => parts
                    .iter()
                    .enumerate()
                    .map(|(index, part)| convert_user_part(index, part))
                    .collect::<Result<_, _>>()?,
            };
            (BedrockRole::User, blocks)
        }
        GenerationMessage::Assistant { content } => {
            let blocks = match content {
                AssistantContent::Text(text) if text.is_empty() => vec![],
                AssistantContent::Text(text) => vec![BedrockContentBlock::Text(text.clone())],
                AssistantContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|part| match part {
                        AssistantContentPart::Text { text } if !text.is_empty() => {
                            Some(BedrockContentBlock::Text(text.clone()))
                        }
                        AssistantContentPart::Text { .. } => None,
                        // Bedrock rejects reasoning blocks without their signature.
                        AssistantContentPart::Reasoning { .. } => None,
                        AssistantContentPart::ToolCall(call) => {
                            Some(BedrockContentBlock::ToolUse(BedrockToolUse {
                                tool_use_id: call.tool_call_id.clone(),
                                name: call.tool_name.clone(),
                                input: call.input.clone(),
                            }))
                        }
                    })
                    .collect(),
            };
            (BedrockRole::Assistant, blocks)
        }
        GenerationMessage::Tool { content } => (
            BedrockRole::User,
            content
                .iter()
                .map(|result| {
                    BedrockContentBlock::ToolResult(BedrockToolResult {
                        tool_use_id: result.tool_call_id.clone(),
                        content: vec![match &result.output {
                            ToolResultOutput::Json(value) if value.is_object() => {
                                BedrockToolResultContent::Json(value.clone())
                            }
                            // `json` blocks must hold an object.
                            other => BedrockToolResultContent::Text(other.to_text()),
                        }],
                    })
                })
                .collect(),
        ),
    })
}

fn convert_user_part(index: usize, part: &UserContentPart) -> Result<BedrockContentBlock, Error> {
    match part {
        UserContentPart::Text { text } => Ok(BedrockContentBlock::Text(text.clone())),
        UserContentPart::Image { image, media_type } => {
            let ImageData::Bytes(bytes) = image else {
                return Err(unsupported_content(
                    "AWS Bedrock only accepts inline image data, not image URLs".to_string(),
                ));
            };
            let format = image_format(media_type.as_deref().unwrap_or("image/png"))?;
            Ok(BedrockContentBlock::Image(BedrockImageBlock {
                format,
                source: BedrockBytesSource {
                    bytes: BASE64_STANDARD.encode(bytes),
                },
            }))
        }
        UserContentPart::File {
            data,
            media_type,
            filename,
        } => Ok(BedrockContentBlock::Document(BedrockDocumentBlock {
            format: document_format(media_type)?,
            name: document_name(index, filename.as_deref()),
            source: BedrockBytesSource {
                bytes: BASE64_STANDARD.encode(data),
            },
        })),
    }
}

fn image_format(media_type: &str) -> Result<&'static str, Error> {
    match media_type {
        "image/png" => Ok("png"),
        "image/jpeg" | "image/jpg" => Ok("jpeg"),
        "image/gif" => Ok("gif"),
        "image/webp" => Ok("webp"),
        other => Err(unsupported_content(format!(
            "AWS Bedrock does not support images of type `{other}`"
        ))),
    }
}

fn document_format(media_type: &str) -> Result<&'static str, Error> {
    match media_type {
        "application/pdf" => Ok("pdf"),
        "text/csv" => Ok("csv"),
        "text/plain" => Ok("txt"),
        "text/html" => Ok("html"),
        "text/markdown" => Ok("md"),
        "application/msword" => Ok("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Ok("docx"),
        "application/vnd.ms-excel" => Ok("xls"),
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Ok("xlsx"),
        other => Err(unsupported_content(format!(
            "AWS Bedrock does not support documents of type `{other}`"
        ))),
    }
}

/// Document names may only contain alphanumerics, whitespace, hyphens, parentheses and brackets.
fn document_name(index: usize, filename: Option<&str>) -> String {
    let stem = filename
        .map(|name| name.rsplit_once('.').map_or(name, |(stem, _)| stem))
        .unwrap_or_default();
    let sanitized: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '-' | '(' | ')' | '[' | ']'))
        .collect();
    if sanitized.trim().is_empty() {
        format!("document-{index}")
    } else {
        sanitized
    }
}

fn unsupported_content(message: String) -> Error {
    Error::new(ErrorDetails::BadRequest {
        message,
        code: BadRequestCode::ModelUnsupported,
    })
}

// =============================================================================
// Response conversion
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConverseResponse {
    output: ConverseOutput,
    stop_reason: BedrockStopReason,
    #[serde(default)]
    usage: Option<BedrockUsage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutput {
    message: Option<ConverseOutputMessage>,
}

#[derive(Debug, Deserialize)]
struct ConverseOutputMessage {
    #[serde(default)]
    content: Vec<ResponseContentBlock>,
}

/// Exactly one field is set per block; unknown block kinds leave all of them empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseContentBlock {
    text: Option<String>,
    tool_use: Option<ResponseToolUse>,
    reasoning_content: Option<ResponseReasoningContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseToolUse {
    tool_use_id: String,
    name: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseReasoningContent {
    reasoning_text: Option<ResponseReasoningText>,
}

#[derive(Debug, Deserialize)]
struct ResponseReasoningText {
    text: String,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum BedrockStopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    GuardrailIntervened,
    ContentFiltered,
    #[serde(other)]
    Unknown,
}

impl From<BedrockStopReason> for FinishReason {
    fn from(reason: BedrockStopReason) -> Self {
        match reason {
            BedrockStopReason::EndTurn | BedrockStopReason::StopSequence => FinishReason::Stop,
            BedrockStopReason::ToolUse => FinishReason::ToolCalls,
            BedrockStopReason::MaxTokens => FinishReason::Length,
            BedrockStopReason::GuardrailIntervened | BedrockStopReason::ContentFiltered => {
                FinishReason::ContentFilter
            }
            BedrockStopReason::Unknown => FinishReason::Unknown,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BedrockUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_read_input_tokens: Option<u32>,
    #[serde(default)]
    cache_write_input_tokens: Option<u32>,
}

impl From<BedrockUsage> for Usage {
    // Bedrock reports cache tokens separately from `inputTokens`.
    fn from(usage: BedrockUsage) -> Self {
        let input_tokens = usage.input_tokens
            + usage.cache_read_input_tokens.unwrap_or(0)
            + usage.cache_write_input_tokens.unwrap_or(0);
        Usage {
            input_tokens: Some(input_tokens),
            output_tokens: Some(usage.output_tokens),
            total_tokens: Some(input_tokens + usage.output_tokens),
            reasoning_tokens: None,
            cached_input_tokens: usage.cache_read_input_tokens,
        }
    }
}

impl TryFrom<ConverseResponse> for GenerateResult {
    type Error = Error;

    fn try_from(response: ConverseResponse) -> Result<Self, Error> {
        let message = response.output.message.ok_or_else(|| {
            Error::new(ErrorDetails::UpstreamResponse {
                provider: PROVIDER_NAME,
                message: "AWS Bedrock returned an empty message.".to_string(),
                raw_response: None,
            })
        })?;
        let mut text = String::new();
        let mut reasoning_text: Option<String> = None;
        let mut tool_calls = Vec::new();
        for block in message.content {
            if let Some(block_text) = block.text {
                text.push_str(&block_text);
            } else if let Some(tool_use) = block.tool_use {
                tool_calls.push(ToolCallPart {
                    tool_call_id: tool_use.tool_use_id,
                    tool_name: tool_use.name,
                    input: tool_use.input,
                });
            } else if let Some(reasoning) = block.reasoning_content.and_then(|r| r.reasoning_text) {
                reasoning_text
                    .get_or_insert_with(String::new)
                    .push_str(&reasoning.text);
            } else {
                tracing::warn!("Skipping unsupported content block from AWS Bedrock");
            }
        }
        Ok(GenerateResult {
            text,
            reasoning_text,
            tool_calls,
            finish_reason: response.stop_reason.into(),
            usage: response.usage.map(Usage::from).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Serialize)]
struct BedrockEmbeddingRequest<'a> {
    texts: &'a [String],
    input_type: &'static str,
    embedding_types: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct BedrockEmbeddingResponse {
    embeddings: BedrockEmbeddings,
}

/// Embed v4 groups vectors by type; older models return a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BedrockEmbeddings {
    ByType { float: Vec<Vec<f32>> },
    Float(Vec<Vec<f32>>),
}

impl BedrockEmbeddings {
    fn into_float(self) -> Vec<Vec<f32>> {
        match self {
            BedrockEmbeddings::ByType { float } | BedrockEmbeddings::Float(float) => float,
        }
    }
}

// =============================================================================
// Streaming
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlockStartEvent {
    start: Option<ContentBlockStart>,
    content_block_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlockStart {
    tool_use: Option<ToolUseStart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolUseStart {
    tool_use_id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlockDeltaEvent {
    delta: Option<ContentBlockDelta>,
    content_block_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlockDelta {
    text: Option<String>,
    tool_use: Option<ToolUseDelta>,
    reasoning_content: Option<ReasoningDelta>,
}

#[derive(Debug, Deserialize)]
struct ToolUseDelta {
    input: String,
}

#[derive(Debug, Deserialize)]
struct ReasoningDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentBlockStopEvent {
    content_block_index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageStopEvent {
    stop_reason: BedrockStopReason,
}

#[derive(Debug, Deserialize)]
struct MetadataEvent {
    usage: Option<BedrockUsage>,
}

#[derive(Debug)]
struct PendingToolUse {
    id: String,
    name: String,
    input: String,
}

/// Turns ConverseStream events into stream parts.
///
/// Tool inputs arrive as string fragments and are emitted once their block stops.
/// The finish part waits for the trailing `metadata` event so it can carry usage.
#[derive(Debug, Default)]
struct BedrockStreamState {
    tool_uses: BTreeMap<u32, PendingToolUse>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl BedrockStreamState {
    fn process_event(
        &mut self,
        event_type: Option<&str>,
        payload: &[u8],
    ) -> Result<Vec<StreamPart>, Error> {
        match event_type {
            Some("messageStart") => Ok(vec![]),
            Some("contentBlockStart") => {
                let event: ContentBlockStartEvent =
                    parse_stream_event(payload, "contentBlockStart")?;
                if let Some(tool_use) = event.start.and_then(|start| start.tool_use) {
                    self.tool_uses.insert(
                        event.content_block_index,
                        PendingToolUse {
                            id: tool_use.tool_use_id,
                            name: tool_use.name,
                            input: String::new(),
                        },
                    );
                }
                Ok(vec![])
            }
            Some("contentBlockDelta") => {
                let event: ContentBlockDeltaEvent =
                    parse_stream_event(payload, "contentBlockDelta")?;
                let Some(delta) = event.delta else {
                    return Ok(vec![]);
                };
                if let Some(text) = delta.text.filter(|t| !t.is_empty()) {
                    return Ok(vec![StreamPart::TextDelta(text)]);
                }
                if let Some(reasoning) = delta.reasoning_content.and_then(|r| r.text) {
                    return Ok(vec![StreamPart::ReasoningDelta(reasoning)]);
                }
                if let Some(tool_use) = delta.tool_use {
                    let pending = self
                        .tool_uses
                        .get_mut(&event.content_block_index)
                        .ok_or_else(|| {
                            Error::new(ErrorDetails::UpstreamResponse {
                                provider: PROVIDER_NAME,
                                message: "Got tool use delta without current tool id".to_string(),
                                raw_response: Some(String::from_utf8_lossy(payload).to_string()),
                            })
                        })?;
                    pending.input.push_str(&tool_use.input);
                }
                Ok(vec![])
            }
            Some("contentBlockStop") => {
                let event: ContentBlockStopEvent = parse_stream_event(payload, "contentBlockStop")?;
                match self.tool_uses.remove(&event.content_block_index) {
                    Some(pending) => Ok(vec![finish_tool_use(pending)?]),
                    None => Ok(vec![]),
                }
            }
            Some("messageStop") => {
                let event: MessageStopEvent = parse_stream_event(payload, "messageStop")?;
                self.finish_reason = Some(event.stop_reason.into());
                Ok(vec![])
            }
            Some("metadata") => {
                let event: MetadataEvent = parse_stream_event(payload, "metadata")?;
                if let Some(usage) = event.usage {
                    self.usage = usage.into();
                }
                Ok(vec![])
            }
            _ => {
                tracing::warn!("Unknown event type from AWS Bedrock: {event_type:?}");
                Ok(vec![])
            }
        }
    }

    fn finish(self) -> Result<Vec<StreamPart>, Error> {
        let mut parts = self
            .tool_uses
            .into_values()
            .map(finish_tool_use)
            .collect::<Result<Vec<_>, _>>()?;
        parts.push(StreamPart::Finish {
            finish_reason: self.finish_reason.unwrap_or(FinishReason::Stop),
            usage: self.usage,
        });
        Ok(parts)
    }
}

fn finish_tool_use(pending: PendingToolUse) -> Result<StreamPart, Error> {
    let input = parse_tool_arguments(PROVIDER_NAME, &pending.id, &pending.input)?;
    Ok(StreamPart::ToolCall(ToolCallPart {
        tool_call_id: pending.id,
        tool_name: pending.name,
        input,
    }))
}

fn parse_stream_event<T: serde::de::DeserializeOwned>(
    payload: &[u8],
    event_name: &str,
) -> Result<T, Error> {
    serde_json::from_slice(payload).map_err(|e| {
        Error::new(ErrorDetails::UpstreamResponse {
            provider: PROVIDER_NAME,
            message: format!("Error parsing {event_name}: {e}"),
            raw_response: Some(String::from_utf8_lossy(payload).to_string()),
        })
    })
}

fn stream_bedrock<S>(bytes_stream: S) -> GenerationStream
where
    S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        futures::pin_mut!(bytes_stream);
        let mut decoder = MessageFrameDecoder::new();
        let mut buffer = BytesMut::new();
        let mut state = BedrockStreamState::default();

        while let Some(chunk) = bytes_stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::UpstreamTransport {
                        provider: PROVIDER_NAME,
                        message: format!("Error reading stream: {}", DisplayOrDebug::display(e)),
                    }));
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);
            loop {
                let message = match decoder.decode_frame(&mut buffer) {
                    Ok(DecodedFrame::Complete(message)) => message,
                    Ok(DecodedFrame::Incomplete) => break,
                    Err(e) => {
                        yield Err(Error::new(ErrorDetails::UpstreamResponse {
                            provider: PROVIDER_NAME,
                            message: format!("Error decoding event stream frame: {e}"),
                            raw_response: None,
                        }));
                        return;
                    }
                };
                if let Some((exception_type, error_message)) = check_eventstream_exception(&message) {
                    yield Err(Error::new(ErrorDetails::UpstreamResponse {
                        provider: PROVIDER_NAME,
                        message: format!("AWS Bedrock streaming exception: {exception_type}"),
                        raw_response: Some(error_message),
                    }));
                    return;
                }
                let event_type = eventstream_event_type(&message);
                match state.process_event(event_type.as_deref(), message.payload()) {
                    Ok(parts) => {
                        for part in parts {
                            yield Ok(part);
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        }
        match state.finish() {
            Ok(parts) => {
                for part in parts {
                    yield Ok(part);
                }
            }
            Err(e) => yield Err(e),
        }
    })
}
