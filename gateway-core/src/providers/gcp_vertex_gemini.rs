use std::sync::Arc;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use futures::{Stream, StreamExt};
use reqwest_sse_stream::{Event, ReqwestSseStreamError};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use url::Url;
use uuid::Uuid;

use super::gcp_credentials::{
    AmbientAwsIdentity, AwsIdentitySource, GoogleAuthEndpoints, WorkloadIdentityCredentials,
};
use super::helpers::{
    convert_stream_error, join_url, send_and_parse, serialize_request_body,
};
use super::{GoogleProviderConfig, ProviderContext, ProviderName, optional_url_secret};
use crate::error::{Error, ErrorDetails};
use crate::inference::reasoning::ReasoningConfig;
use crate::inference::types::{
    AssistantContent, AssistantContentPart, FinishReason, GenerateRequest, GenerateResult,
    GenerationMessage, GenerationStream, ImageData, StreamPart, ToolCallPart, ToolChoice, Usage,
    UserContent, UserContentPart,
};
use crate::secrets::SecretStore;

const PROVIDER_NAME: ProviderName = ProviderName::Vertex;

/// Reads the platform's own Vertex project and workload identity settings.
pub async fn get_default_config(secrets: &dyn SecretStore) -> Result<GoogleProviderConfig, Error> {
    Ok(GoogleProviderConfig {
        service_account_email: secrets
            .get("VertexServiceAccountEmail")
            .await?
            .expose_secret()
            .to_string(),
        audience: secrets
            .get("VertexAwsProviderAudience")
            .await?
            .expose_secret()
            .to_string(),
        location: secrets.get("VertexLocation").await?.expose_secret().to_string(),
        project: secrets.get("VertexProject").await?.expose_secret().to_string(),
        base_url: optional_url_secret(secrets, "VertexBaseUrl").await?,
    })
}

// The global endpoint uses 'aiplatform.googleapis.com', while every other location
// uses '{location}-aiplatform.googleapis.com'.
pub fn location_subdomain_prefix(location: &str) -> String {
    if location == "global" {
        String::new()
    } else {
        format!("{location}-")
    }
}

/// Implements the subset of the Vertex `generateContent` and `streamGenerateContent`
/// APIs the gateway needs for Gemini chat models.
pub struct GCPVertexGeminiProvider {
    publisher_url: Url,
    credentials: WorkloadIdentityCredentials,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GCPVertexGeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GCPVertexGeminiProvider")
            .field("publisher_url", &self.publisher_url.as_str())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

impl GCPVertexGeminiProvider {
    /// Sets up workload identity federation. AWS credentials, including ECS task
    /// credentials when running remotely, are only read once a token is needed.
    pub fn new(config: &GoogleProviderConfig, ctx: &ProviderContext) -> Result<Self, Error> {
        Self::with_identity(
            config,
            ctx,
            Arc::new(AmbientAwsIdentity::new(ctx)),
            GoogleAuthEndpoints::default(),
        )
    }

    pub fn with_identity(
        config: &GoogleProviderConfig,
        ctx: &ProviderContext,
        aws_identity: Arc<dyn AwsIdentitySource>,
        endpoints: GoogleAuthEndpoints,
    ) -> Result<Self, Error> {
        let publisher_url = match &config.base_url {
            Some(base_url) => base_url.clone(),
            None => default_publisher_url(&config.project, &config.location)?,
        };
        Ok(Self {
            publisher_url,
            credentials: WorkloadIdentityCredentials::new(
                config.audience.clone(),
                config.service_account_email.clone(),
                ctx.http_client.clone(),
                aws_identity,
                endpoints,
            ),
            http_client: ctx.http_client.clone(),
        })
    }

    fn model_url(&self, model_id: &str, method: &str) -> Result<Url, Error> {
        join_url(&self.publisher_url, &format!("models/{model_id}:{method}"))
    }

    async fn request(&self, url: Url, body: String) -> Result<reqwest::RequestBuilder, Error> {
        let token = self.credentials.access_token().await?;
        Ok(self
            .http_client
            .post(url)
            .bearer_auth(token.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body))
    }

    pub async fn generate(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResult, Error> {
        let body = serialize_request_body(PROVIDER_NAME, &GCPVertexGeminiRequest::new(request))?;
        let request = self
            .request(self.model_url(model_id, "generateContent")?, body)
            .await?;
        let response: GCPVertexGeminiResponse = send_and_parse(PROVIDER_NAME, request).await?;
        response.try_into()
    }

    pub async fn stream(
        &self,
        model_id: &str,
        request: &GenerateRequest,
    ) -> Result<GenerationStream, Error> {
        let body = serialize_request_body(PROVIDER_NAME, &GCPVertexGeminiRequest::new(request))?;
        let mut url = self.model_url(model_id, "streamGenerateContent")?;
        url.query_pairs_mut().append_pair("alt", "sse");
        let events = reqwest_sse_stream::into_sse_stream(self.request(url, body).await?).await;
        match events {
            Ok(events) => Ok(stream_gcp_vertex_gemini(events)),
            Err(e) => Err(convert_stream_error(PROVIDER_NAME, e).await),
        }
    }
}

fn default_publisher_url(project: &str, location: &str) -> Result<Url, Error> {
    let prefix = location_subdomain_prefix(location);
    Url::parse(&format!(
        "https://{prefix}aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/"
    ))
    .map_err(|e| {
        Error::new(ErrorDetails::InvalidProviderConfig {
            provider: PROVIDER_NAME,
            message: format!("Invalid project `{project}` or location `{location}`: {e}"),
        })
    })
}

// =============================================================================
// Request conversion
// =============================================================================

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum GCPVertexGeminiRole {
    User,
    Model,
    System,
}

#[derive(Debug, PartialEq, Serialize)]
struct GCPVertexGeminiFunctionCall<'a> {
    name: &'a str,
    args: &'a Value,
}

#[derive(Debug, PartialEq, Serialize)]
struct GCPVertexGeminiFunctionResponse<'a> {
    name: &'a str,
    response: Value,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexFileData {
    mime_type: String,
    file_uri: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
enum GCPVertexGeminiPart<'a> {
    Text(&'a str),
    InlineData(GCPVertexInlineData),
    FileData(GCPVertexFileData),
    FunctionCall(GCPVertexGeminiFunctionCall<'a>),
    FunctionResponse(GCPVertexGeminiFunctionResponse<'a>),
}

#[derive(Debug, PartialEq, Serialize)]
struct GCPVertexGeminiContent<'a> {
    role: GCPVertexGeminiRole,
    parts: Vec<GCPVertexGeminiPart<'a>>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiFunctionDeclaration<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    parameters: Value,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
enum GCPVertexGeminiTool<'a> {
    FunctionDeclarations(Vec<GCPVertexGeminiFunctionDeclaration<'a>>),
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum GCPVertexGeminiFunctionCallingMode {
    Auto,
    Any,
    None,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiFunctionCallingConfig<'a> {
    mode: GCPVertexGeminiFunctionCallingMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    allowed_function_names: Option<Vec<&'a str>>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiToolConfig<'a> {
    function_calling_config: GCPVertexGeminiFunctionCallingConfig<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiThinkingConfig {
    thinking_budget: u32,
    include_thoughts: bool,
}

#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiGenerationConfig<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<GCPVertexGeminiThinkingConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiRequest<'a> {
    contents: Vec<GCPVertexGeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GCPVertexGeminiTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GCPVertexGeminiToolConfig<'a>>,
    generation_config: GCPVertexGeminiGenerationConfig<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GCPVertexGeminiSystemInstruction>,
}

#[derive(Debug, PartialEq, Serialize)]
struct GCPVertexGeminiSystemInstruction {
    role: GCPVertexGeminiRole,
    parts: Vec<Value>,
}

impl<'a> GCPVertexGeminiRequest<'a> {
    fn new(request: &'a GenerateRequest) -> Self {
        let (system, conversation) = request.system_and_conversation();
        let contents = conversation
            .into_iter()
            .filter_map(convert_message)
            .collect();

        let thinking_config = match &request.reasoning {
            Some(ReasoningConfig::ThinkingBudget {
                budget_tokens,
                include_thoughts,
            }) => Some(GCPVertexGeminiThinkingConfig {
                thinking_budget: *budget_tokens,
                include_thoughts: *include_thoughts,
            }),
            Some(ReasoningConfig::Effort(effort)) => {
                tracing::debug!("Ignoring reasoning effort `{effort}` for GCP Vertex Gemini");
                None
            }
            None => None,
        };

        let (tools, tool_config) = prepare_tools(request);
        GCPVertexGeminiRequest {
            contents,
            tools,
            tool_config,
            generation_config: GCPVertexGeminiGenerationConfig {
                stop_sequences: (!request.stop.is_empty()).then_some(request.stop.as_slice()),
                temperature: request.temperature,
                thinking_config,
                max_output_tokens: request.max_output_tokens,
                top_p: request.top_p,
            },
            system_instruction: system.map(|text| GCPVertexGeminiSystemInstruction {
                role: GCPVertexGeminiRole::System,
                parts: vec![json!({ "text": text })],
            }),
        }
    }
}

fn prepare_tools(
    request: &GenerateRequest,
) -> (
    Option<Vec<GCPVertexGeminiTool<'_>>>,
    Option<GCPVertexGeminiToolConfig<'_>>,
) {
    if request.tools.is_empty() {
        return (None, None);
    }
    let declarations = request
        .tools
        .iter()
        .map(|tool| GCPVertexGeminiFunctionDeclaration {
            name: &tool.name,
            description: tool.description.as_deref(),
            parameters: process_jsonschema_for_gcp_vertex_gemini(&tool.input_schema),
        })
        .collect();
    let function_calling_config = match request.tool_choice.as_ref() {
        None | Some(ToolChoice::Auto) => GCPVertexGeminiFunctionCallingConfig {
            mode: GCPVertexGeminiFunctionCallingMode::Auto,
            allowed_function_names: None,
        },
        Some(ToolChoice::None) => GCPVertexGeminiFunctionCallingConfig {
            mode: GCPVertexGeminiFunctionCallingMode::None,
            allowed_function_names: None,
        },
        Some(ToolChoice::Required) => GCPVertexGeminiFunctionCallingConfig {
            mode: GCPVertexGeminiFunctionCallingMode::Any,
            allowed_function_names: None,
        },
        Some(ToolChoice::Tool { tool_name }) => GCPVertexGeminiFunctionCallingConfig {
            mode: GCPVertexGeminiFunctionCallingMode::Any,
            allowed_function_names: Some(vec![tool_name.as_str()]),
        },
    };
    (
        Some(vec![GCPVertexGeminiTool::FunctionDeclarations(declarations)]),
        Some(GCPVertexGeminiToolConfig {
            function_calling_config,
        }),
    )
}

fn convert_message(message: &GenerationMessage) -> Option<GCPVertexGeminiContent<'_>> {
    let (role, parts) = match message {
        GenerationMessage::System { .. } => return None,
        GenerationMessage::User { content } => {
            let parts = match content {
                UserContent::Text(text) => vec![GCPVertexGeminiPart::Text(text)],
                UserContent::Parts(parts) => parts.iter().map(convert_user_part).collect(),
            };
            (GCPVertexGeminiRole::User, parts)
        }
        GenerationMessage::Assistant { content } => {
            let parts = match content {
                AssistantContent::Text(text) => vec![GCPVertexGeminiPart::Text(text)],
                AssistantContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|part| match part {
                        AssistantContentPart::Text { text } => Some(GCPVertexGeminiPart::Text(text)),
                        // Gemini only accepts thoughts it signed itself.
                        AssistantContentPart::Reasoning { .. } => None,
                        AssistantContentPart::ToolCall(call) => {
                            Some(GCPVertexGeminiPart::FunctionCall(GCPVertexGeminiFunctionCall {
                                name: &call.tool_name,
                                args: &call.input,
                            }))
                        }
                    })
                    .collect(),
            };
            (GCPVertexGeminiRole::Model, parts)
        }
        GenerationMessage::Tool { content } => (
            GCPVertexGeminiRole::User,
            content
                .iter()
                .map(|result| {
                    GCPVertexGeminiPart::FunctionResponse(GCPVertexGeminiFunctionResponse {
                        name: &result.tool_name,
                        response: json!({
                            "name": result.tool_name,
                            "content": result.output.to_json(),
                        }),
                    })
                })
                .collect(),
        ),
    };
    (!parts.is_empty()).then_some(GCPVertexGeminiContent { role, parts })
}

fn convert_user_part(part: &UserContentPart) -> GCPVertexGeminiPart<'_> {
    match part {
        UserContentPart::Text { text } => GCPVertexGeminiPart::Text(text),
        UserContentPart::Image {
            image: ImageData::Bytes(bytes),
            media_type,
        } => GCPVertexGeminiPart::InlineData(GCPVertexInlineData {
            mime_type: media_type.clone().unwrap_or_else(|| "image/png".to_string()),
            data: BASE64_STANDARD.encode(bytes),
        }),
        UserContentPart::Image {
            image: ImageData::Url(url),
            media_type,
        } => GCPVertexGeminiPart::FileData(GCPVertexFileData {
            mime_type: media_type.clone().unwrap_or_else(|| "image/png".to_string()),
            file_uri: url.to_string(),
        }),
        UserContentPart::File {
            data, media_type, ..
        } => GCPVertexGeminiPart::InlineData(GCPVertexInlineData {
            mime_type: media_type.clone(),
            data: BASE64_STANDARD.encode(data),
        }),
    }
}

/// Recursively removes `$schema` and `additionalProperties` from JSON schemas
/// for GCP Vertex API compatibility.
pub(crate) fn process_jsonschema_for_gcp_vertex_gemini(schema: &Value) -> Value {
    let mut schema = schema.clone();

    fn remove_properties(value: &mut Value) {
        match value {
            Value::Object(obj) => {
                obj.remove("additionalProperties");
                obj.remove("$schema");
                for (_, v) in obj.iter_mut() {
                    remove_properties(v);
                }
            }
            Value::Array(arr) => {
                for v in arr.iter_mut() {
                    remove_properties(v);
                }
            }
            _ => {}
        }
    }

    remove_properties(&mut schema);
    schema
}

// =============================================================================
// Response conversion
// =============================================================================

#[derive(Debug, Deserialize)]
struct GCPVertexGeminiResponseFunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiResponseContentPart {
    #[serde(default)]
    thought: bool,
    text: Option<String>,
    function_call: Option<GCPVertexGeminiResponseFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GCPVertexGeminiResponseContent {
    #[serde(default)]
    parts: Vec<GCPVertexGeminiResponseContentPart>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum GCPVertexGeminiFinishReason {
    FinishReasonUnspecified,
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Other,
    Blocklist,
    ProhibitedContent,
    #[serde(rename = "SPII")]
    Spii,
    MalformedFunctionCall,
    #[serde(other)]
    Unknown,
}

impl From<GCPVertexGeminiFinishReason> for FinishReason {
    fn from(finish_reason: GCPVertexGeminiFinishReason) -> Self {
        match finish_reason {
            GCPVertexGeminiFinishReason::Stop => FinishReason::Stop,
            GCPVertexGeminiFinishReason::MaxTokens => FinishReason::Length,
            GCPVertexGeminiFinishReason::Safety
            | GCPVertexGeminiFinishReason::Recitation
            | GCPVertexGeminiFinishReason::Blocklist
            | GCPVertexGeminiFinishReason::ProhibitedContent
            | GCPVertexGeminiFinishReason::Spii => FinishReason::ContentFilter,
            GCPVertexGeminiFinishReason::MalformedFunctionCall => FinishReason::Error,
            GCPVertexGeminiFinishReason::Other => FinishReason::Other,
            GCPVertexGeminiFinishReason::FinishReasonUnspecified
            | GCPVertexGeminiFinishReason::Unknown => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiResponseCandidate {
    content: Option<GCPVertexGeminiResponseContent>,
    finish_reason: Option<GCPVertexGeminiFinishReason>,
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    // Missing when generation is blocked by safety settings.
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
    thoughts_token_count: Option<u32>,
    cached_content_token_count: Option<u32>,
}

impl From<GCPVertexGeminiUsageMetadata> for Usage {
    fn from(usage: GCPVertexGeminiUsageMetadata) -> Self {
        Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
            reasoning_tokens: usage.thoughts_token_count,
            cached_input_tokens: usage.cached_content_token_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GCPVertexGeminiResponse {
    #[serde(default)]
    candidates: Vec<GCPVertexGeminiResponseCandidate>,
    usage_metadata: Option<GCPVertexGeminiUsageMetadata>,
}

/// Gemini does not assign ids to function calls.
fn new_tool_call_id() -> String {
    format!("call_{}", Uuid::now_v7().simple())
}

/// Gemini reports `STOP` when it ends a turn with function calls.
fn finish_reason_with_tool_calls(finish_reason: FinishReason, has_tool_calls: bool) -> FinishReason {
    if has_tool_calls && finish_reason == FinishReason::Stop {
        FinishReason::ToolCalls
    } else {
        finish_reason
    }
}

impl TryFrom<GCPVertexGeminiResponse> for GenerateResult {
    type Error = Error;

    fn try_from(response: GCPVertexGeminiResponse) -> Result<Self, Error> {
        let candidate = response.candidates.into_iter().next().ok_or_else(|| {
            Error::new(ErrorDetails::UpstreamResponse {
                provider: PROVIDER_NAME,
                message: "GCP Vertex Gemini response has no candidates".to_string(),
                raw_response: None,
            })
        })?;
        let mut text = String::new();
        let mut reasoning_text: Option<String> = None;
        let mut tool_calls = Vec::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            match (part.thought, part.text, part.function_call) {
                (true, Some(thought), _) => reasoning_text
                    .get_or_insert_with(String::new)
                    .push_str(&thought),
                (false, Some(part_text), _) => text.push_str(&part_text),
                (_, None, Some(call)) => tool_calls.push(ToolCallPart {
                    tool_call_id: new_tool_call_id(),
                    tool_name: call.name,
                    input: call.args,
                }),
                _ => tracing::debug!("Skipping unsupported content part from GCP Vertex Gemini"),
            }
        }
        let finish_reason = candidate
            .finish_reason
            .map_or(FinishReason::Unknown, FinishReason::from);
        Ok(GenerateResult {
            finish_reason: finish_reason_with_tool_calls(finish_reason, !tool_calls.is_empty()),
            text,
            reasoning_text,
            tool_calls,
            usage: response.usage_metadata.map(Usage::from).unwrap_or_default(),
        })
    }
}

fn stream_gcp_vertex_gemini(
    events: impl Stream<Item = Result<Event, ReqwestSseStreamError>> + Send + 'static,
) -> GenerationStream {
    Box::pin(async_stream::stream! {
        futures::pin_mut!(events);
        let mut finish_reason = None;
        let mut usage = Usage::default();
        let mut has_tool_calls = false;
        while let Some(event) = events.next().await {
            let message = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => message,
                Err(e) => {
                    yield Err(convert_stream_error(PROVIDER_NAME, e).await);
                    return;
                }
            };
            let data: GCPVertexGeminiResponse = match serde_json::from_str(&message.data) {
                Ok(data) => data,
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::UpstreamResponse {
                        provider: PROVIDER_NAME,
                        message: format!("Error parsing streaming JSON response: {e}"),
                        raw_response: Some(message.data),
                    }));
                    return;
                }
            };
            if let Some(metadata) = data.usage_metadata {
                usage = metadata.into();
            }
            for candidate in data.candidates {
                if let Some(reason) = candidate.finish_reason {
                    finish_reason = Some(FinishReason::from(reason));
                }
                for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                    match (part.thought, part.text, part.function_call) {
                        (_, Some(text), _) if text.is_empty() => {}
                        (true, Some(thought), _) => yield Ok(StreamPart::ReasoningDelta(thought)),
                        (false, Some(text), _) => yield Ok(StreamPart::TextDelta(text)),
                        (_, None, Some(call)) => {
                            has_tool_calls = true;
                            yield Ok(StreamPart::ToolCall(ToolCallPart {
                                tool_call_id: new_tool_call_id(),
                                tool_name: call.name,
                                input: call.args,
                            }));
                        }
                        _ => {}
                    }
                }
            }
        }
        yield Ok(StreamPart::Finish {
            finish_reason: finish_reason_with_tool_calls(
                finish_reason.unwrap_or(FinishReason::Stop),
                has_tool_calls,
            ),
            usage,
        });
    })
}
