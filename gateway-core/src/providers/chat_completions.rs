//! Wire types for upstream APIs that speak the OpenAI chat completions protocol.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use futures::{Stream, StreamExt};
use reqwest_sse_stream::{Event, ReqwestSseStreamError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{BadRequestCode, Error, ErrorDetails};
use crate::inference::reasoning::{ReasoningConfig, ReasoningEffort};
use crate::inference::types::{
    AssistantContent, AssistantContentPart, FinishReason, GenerateRequest, GenerateResult,
    GenerationMessage, GenerationStream, ImageData, StreamPart, ToolCallPart, ToolChoice, Usage,
    UserContent, UserContentPart,
};
use crate::providers::ProviderName;
use crate::providers::helpers::convert_stream_error;

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatCompletionRequestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<&'a [String]>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<StreamOptions>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ChatCompletionTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ChatCompletionToolChoice<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,
}

#[derive(Debug, Serialize)]
pub struct StreamOptions {
    pub include_usage: bool,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatCompletionRequestMessage {
    System {
        content: String,
    },
    User {
        content: ChatCompletionUserContent,
    },
    Assistant {
        content: Option<String>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ChatCompletionRequestToolCall>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatCompletionUserContent {
    Text(String),
    Parts(Vec<ChatCompletionContentPart>),
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatCompletionContentPart {
    Text { text: String },
    ImageUrl { image_url: ChatCompletionImageUrl },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatCompletionImageUrl {
    pub url: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequestToolCall {
    pub id: String,
    pub r#type: &'static str,
    pub function: ChatCompletionRequestFunctionCall,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequestFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatCompletionTool<'a> {
    pub r#type: &'static str,
    pub function: ChatCompletionFunction<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatCompletionFunction<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub parameters: &'a Value,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatCompletionToolChoice<'a> {
    String(ChatCompletionToolChoiceString),
    Specific(SpecificToolChoice<'a>),
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatCompletionToolChoiceString {
    None,
    Auto,
    Required,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SpecificToolChoice<'a> {
    pub r#type: &'static str,
    pub function: SpecificToolFunction<'a>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct SpecificToolFunction<'a> {
    pub name: &'a str,
}

impl<'a> From<&'a ToolChoice> for ChatCompletionToolChoice<'a> {
    fn from(tool_choice: &'a ToolChoice) -> Self {
        match tool_choice {
            ToolChoice::None => ChatCompletionToolChoice::String(ChatCompletionToolChoiceString::None),
            ToolChoice::Auto => ChatCompletionToolChoice::String(ChatCompletionToolChoiceString::Auto),
            ToolChoice::Required => {
                ChatCompletionToolChoice::String(ChatCompletionToolChoiceString::Required)
            }
            ToolChoice::Tool { tool_name } => ChatCompletionToolChoice::Specific(SpecificToolChoice {
                r#type: "function",
                function: SpecificToolFunction { name: tool_name },
            }),
        }
    }
}

impl<'a> ChatCompletionRequest<'a> {
    pub fn new(
        provider: ProviderName,
        model: &'a str,
        request: &'a GenerateRequest,
        stream: bool,
    ) -> Result<Self, Error> {
        let messages = request
            .messages
            .iter()
            .map(|message| to_chat_completion_messages(provider, message))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        let tools = request
            .tools
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: "function",
                function: ChatCompletionFunction {
                    name: &tool.name,
                    description: tool.description.as_deref(),
                    parameters: &tool.input_schema,
                },
            })
            .collect();
        let reasoning_effort = match &request.reasoning {
            Some(ReasoningConfig::Effort(effort)) => Some(*effort),
            Some(ReasoningConfig::ThinkingBudget { .. }) => {
                tracing::debug!("Provider `{provider}` does not support thinking budgets; ignoring");
                None
            }
            None => None,
        };
        Ok(Self {
            model,
            messages,
            temperature: request.temperature,
            top_p: request.top_p,
            max_completion_tokens: request.max_output_tokens,
            stop: (!request.stop.is_empty()).then_some(request.stop.as_slice()),
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
            tools,
            tool_choice: request.tool_choice.as_ref().map(Into::into),
            reasoning_effort,
        })
    }
}

fn to_chat_completion_messages(
    provider: ProviderName,
    message: &GenerationMessage,
) -> Result<Vec<ChatCompletionRequestMessage>, Error> {
    Ok(match message {
        GenerationMessage::System { content } => vec![ChatCompletionRequestMessage::System {
            content: content.clone(),
        }],
        GenerationMessage::User { content } => {
            let content = match content {
                UserContent::Text(text) => ChatCompletionUserContent::Text(text.clone()),
                UserContent::Parts(parts) => ChatCompletionUserContent::Parts(
                    parts
                        .iter()
                        .map(|part| to_chat_completion_content_part(provider, part))
                        .collect::<Result<_, _>>()?,
                ),
            };
            vec![ChatCompletionRequestMessage::User { content }]
        }
        GenerationMessage::Assistant { content } => {
            let (text, tool_calls) = match content {
                AssistantContent::Text(text) => (Some(text.clone()), Vec::new()),
                AssistantContent::Parts(parts) => {
                    let mut text = String::new();
                    let mut tool_calls = Vec::new();
                    for part in parts {
                        match part {
                            AssistantContentPart::Text { text: t } => text.push_str(t),
                            // Prior reasoning is not replayed upstream.
                            AssistantContentPart::Reasoning { .. } => {}
                            AssistantContentPart::ToolCall(call) => {
                                tool_calls.push(ChatCompletionRequestToolCall {
                                    id: call.tool_call_id.clone(),
                                    r#type: "function",
                                    function: ChatCompletionRequestFunctionCall {
                                        name: call.tool_name.clone(),
                                        arguments: call.input.to_string(),
                                    },
                                });
                            }
                        }
                    }
                    ((!text.is_empty()).then_some(text), tool_calls)
                }
            };
            vec![ChatCompletionRequestMessage::Assistant {
                content: text,
                tool_calls,
            }]
        }
        GenerationMessage::Tool { content } => content
            .iter()
            .map(|result| ChatCompletionRequestMessage::Tool {
                content: result.output.to_text(),
                tool_call_id: result.tool_call_id.clone(),
            })
            .collect(),
    })
}

fn to_chat_completion_content_part(
    provider: ProviderName,
    part: &UserContentPart,
) -> Result<ChatCompletionContentPart, Error> {
    match part {
        UserContentPart::Text { text } => Ok(ChatCompletionContentPart::Text { text: text.clone() }),
        UserContentPart::Image { image, media_type } => {
            let url = match image {
                ImageData::Url(url) => url.to_string(),
                ImageData::Bytes(bytes) => format!(
                    "data:{};base64,{}",
                    media_type.as_deref().unwrap_or("image/png"),
                    BASE64_STANDARD.encode(bytes)
                ),
            };
            Ok(ChatCompletionContentPart::ImageUrl {
                image_url: ChatCompletionImageUrl { url },
            })
        }
        UserContentPart::File { media_type, .. } => Err(Error::new(ErrorDetails::BadRequest {
            message: format!("Provider '{provider}' does not support file inputs of type '{media_type}'"),
            code: BadRequestCode::ModelUnsupported,
        })),
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ChatCompletionUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
    #[serde(default)]
    pub prompt_tokens_details: Option<PromptTokensDetails>,
    #[serde(default)]
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PromptTokensDetails {
    pub cached_tokens: Option<u32>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: Option<u32>,
}

impl From<ChatCompletionUsage> for Usage {
    fn from(usage: ChatCompletionUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            reasoning_tokens: usage
                .completion_tokens_details
                .and_then(|details| details.reasoning_tokens),
            cached_input_tokens: usage
                .prompt_tokens_details
                .and_then(|details| details.cached_tokens),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ChatCompletionFinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    FunctionCall,
    #[serde(other)]
    Unknown,
}

impl From<ChatCompletionFinishReason> for FinishReason {
    fn from(finish_reason: ChatCompletionFinishReason) -> Self {
        match finish_reason {
            ChatCompletionFinishReason::Stop => FinishReason::Stop,
            ChatCompletionFinishReason::Length => FinishReason::Length,
            ChatCompletionFinishReason::ContentFilter => FinishReason::ContentFilter,
            ChatCompletionFinishReason::ToolCalls | ChatCompletionFinishReason::FunctionCall => {
                FinishReason::ToolCalls
            }
            ChatCompletionFinishReason::Unknown => FinishReason::Unknown,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatCompletionResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<ChatCompletionFinishReason>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ChatCompletionResponseToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponseToolCall {
    pub id: String,
    pub function: ChatCompletionResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponseFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ChatCompletionResponse {
    pub fn into_generate_result(self, provider: ProviderName) -> Result<GenerateResult, Error> {
        let Some(choice) = self.choices.into_iter().next() else {
            return Err(Error::new(ErrorDetails::UpstreamResponse {
                provider,
                message: "Response has no choices".to_string(),
                raw_response: None,
            }));
        };
        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                Ok(ToolCallPart {
                    input: parse_tool_arguments(provider, &call.id, &call.function.arguments)?,
                    tool_call_id: call.id,
                    tool_name: call.function.name,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(GenerateResult {
            text: choice.message.content.unwrap_or_default(),
            reasoning_text: choice.message.reasoning.filter(|r| !r.is_empty()),
            tool_calls,
            finish_reason: choice
                .finish_reason
                .map_or(FinishReason::Unknown, Into::into),
            usage: self.usage.map(Into::into).unwrap_or_default(),
        })
    }
}

/// Parses streamed or returned tool call arguments. Empty arguments mean no input.
pub fn parse_tool_arguments(
    provider: ProviderName,
    tool_call_id: &str,
    arguments: &str,
) -> Result<Value, Error> {
    if arguments.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(arguments).map_err(|e| {
        Error::new(ErrorDetails::UpstreamResponse {
            provider,
            message: format!("Arguments of tool call '{tool_call_id}' are not valid JSON: {e}"),
            raw_response: Some(arguments.to_string()),
        })
    })
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChatCompletionChunkChoice>,
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
    /// Groq reports streaming usage here when `stream_options` is ignored.
    #[serde(default)]
    pub x_groq: Option<GroqChunkMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct GroqChunkMetadata {
    #[serde(default)]
    pub usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunkChoice {
    #[serde(default)]
    pub delta: ChatCompletionDelta,
    #[serde(default)]
    pub finish_reason: Option<ChatCompletionFinishReason>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatCompletionDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "reasoning_content")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ChatCompletionToolCallDelta>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionToolCallDelta {
    pub index: usize,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ChatCompletionFunctionDelta>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionFunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Collects tool call fragments by index until the stream finishes.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<usize, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn push(&mut self, delta: ChatCompletionToolCallDelta) {
        let entry = self.calls.entry(delta.index).or_default();
        if let Some(id) = delta.id {
            entry.id = Some(id);
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    pub fn finish(self, provider: ProviderName) -> Result<Vec<ToolCallPart>, Error> {
        self.calls
            .into_iter()
            .map(|(index, call)| {
                let tool_call_id = call.id.unwrap_or_else(|| format!("tool-{index}"));
                Ok(ToolCallPart {
                    input: parse_tool_arguments(provider, &tool_call_id, &call.arguments)?,
                    tool_call_id,
                    tool_name: call.name,
                })
            })
            .collect()
    }
}

/// Adapts an OpenAI-compatible SSE stream into generation stream parts.
///
/// Text and reasoning are forwarded as they arrive. Tool calls and the finish
/// part are emitted once the upstream stream ends.
pub fn stream_chat_completions(
    provider: ProviderName,
    events: impl Stream<Item = Result<Event, ReqwestSseStreamError>> + Send + 'static,
) -> GenerationStream {
    Box::pin(async_stream::stream! {
        futures::pin_mut!(events);
        let mut tool_calls = ToolCallAccumulator::default();
        let mut finish_reason = None;
        let mut usage = Usage::default();
        while let Some(event) = events.next().await {
            let message = match event {
                Ok(Event::Open) => continue,
                Ok(Event::Message(message)) => message,
                Err(e) => {
                    yield Err(convert_stream_error(provider, e).await);
                    return;
                }
            };
            if message.data == "[DONE]" {
                break;
            }
            let chunk: ChatCompletionChunk = match serde_json::from_str(&message.data) {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(Error::new(ErrorDetails::UpstreamResponse {
                        provider,
                        message: format!("Error parsing chunk: {e}"),
                        raw_response: Some(message.data),
                    }));
                    return;
                }
            };
            if let Some(chunk_usage) = chunk.usage.or_else(|| chunk.x_groq.and_then(|x| x.usage)) {
                usage = chunk_usage.into();
            }
            for choice in chunk.choices {
                if let Some(reasoning) = choice.delta.reasoning.filter(|r| !r.is_empty()) {
                    yield Ok(StreamPart::ReasoningDelta(reasoning));
                }
                if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                    yield Ok(StreamPart::TextDelta(content));
                }
                for delta in choice.delta.tool_calls {
                    tool_calls.push(delta);
                }
                if let Some(reason) = choice.finish_reason {
                    finish_reason = Some(FinishReason::from(reason));
                }
            }
        }
        match tool_calls.finish(provider) {
            Ok(calls) => {
                for call in calls {
                    yield Ok(StreamPart::ToolCall(call));
                }
            }
            Err(e) => {
                yield Err(e);
                return;
            }
        }
        yield Ok(StreamPart::Finish {
            finish_reason: finish_reason.unwrap_or(FinishReason::Unknown),
            usage,
        });
    })
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use reqwest_sse_stream::MessageEvent;
    use serde_json::json;

    use super::*;
    use crate::inference::types::{ToolDescriptor, ToolResultOutput, ToolResultPart};

    fn message(data: &str) -> Result<Event, ReqwestSseStreamError> {
        Ok(Event::Message(MessageEvent {
            event: None,
            data: data.to_string(),
            id: None,
        }))
    }

    #[test]
    fn test_request_serialization() {
        let request = GenerateRequest {
            messages: vec![
                GenerationMessage::System {
                    content: "Be brief.".to_string(),
                },
                GenerationMessage::User {
                    content: UserContent::Parts(vec![
                        UserContentPart::Text {
                            text: "What is this?".to_string(),
                        },
                        UserContentPart::Image {
                            image: ImageData::Bytes(vec![1, 2, 3]),
                            media_type: Some("image/png".to_string()),
                        },
                    ]),
                },
                GenerationMessage::Assistant {
                    content: AssistantContent::Parts(vec![AssistantContentPart::ToolCall(
                        ToolCallPart {
                            tool_call_id: "call_1".to_string(),
                            tool_name: "lookup".to_string(),
                            input: json!({"q": "png"}),
                        },
                    )]),
                },
                GenerationMessage::Tool {
                    content: vec![ToolResultPart {
                        tool_call_id: "call_1".to_string(),
                        tool_name: "lookup".to_string(),
                        output: ToolResultOutput::Json(json!({"found": true})),
                    }],
                },
            ],
            tools: vec![ToolDescriptor {
                name: "lookup".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            }],
            tool_choice: Some(ToolChoice::Tool {
                tool_name: "lookup".to_string(),
            }),
            reasoning: Some(ReasoningConfig::Effort(ReasoningEffort::High)),
            ..Default::default()
        };
        let body = ChatCompletionRequest::new(ProviderName::Groq, "openai/gpt-oss-120b", &request, true)
            .unwrap();
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "openai/gpt-oss-120b",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": [
                        {"type": "text", "text": "What is this?"},
                        {"type": "image_url", "image_url": {"url": "data:image/png;base64,AQID"}},
                    ]},
                    {"role": "assistant", "content": null, "tool_calls": [
                        {"id": "call_1", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"png\"}"}},
                    ]},
                    {"role": "tool", "content": "{\"found\":true}", "tool_call_id": "call_1"},
                ],
                "stream": true,
                "stream_options": {"include_usage": true},
                "tools": [{"type": "function", "function": {"name": "lookup", "parameters": {"type": "object"}}}],
                "tool_choice": {"type": "function", "function": {"name": "lookup"}},
                "reasoning_effort": "high",
            })
        );
    }

    #[test]
    fn test_file_parts_are_rejected() {
        let request = GenerateRequest {
            messages: vec![GenerationMessage::User {
                content: UserContent::Parts(vec![UserContentPart::File {
                    data: vec![0],
                    media_type: "application/pdf".to_string(),
                    filename: None,
                }]),
            }],
            ..Default::default()
        };
        let err = ChatCompletionRequest::new(ProviderName::Groq, "m", &request, false).unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::BadRequest {
                code: BadRequestCode::ModelUnsupported,
                ..
            }
        ));
    }

    #[test]
    fn test_response_into_generate_result() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "reasoning": "Need the weather.",
                    "tool_calls": [{"id": "call_7", "type": "function", "function": {"name": "weather", "arguments": "{\"city\":\"Paris\"}"}}],
                },
                "finish_reason": "tool_calls",
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 5, "total_tokens": 17},
        }))
        .unwrap();
        let result = response.into_generate_result(ProviderName::Groq).unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.reasoning_text.as_deref(), Some("Need the weather."));
        assert_eq!(result.finish_reason, FinishReason::ToolCalls);
        assert_eq!(result.tool_calls[0].input, json!({"city": "Paris"}));
        assert_eq!(result.usage.total_tokens, Some(17));
    }

    #[tokio::test]
    async fn test_stream_accumulates_tool_calls() {
        let events = futures::stream::iter(vec![
            Ok(Event::Open),
            message(r#"{"choices":[{"delta":{"content":"Checking"}}]}"#),
            message(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"weather","arguments":"{\"ci"}}]}}]}"#),
            message(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"ty\":\"Oslo\"}"}}]}}]}"#),
            message(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#),
            message(r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":7}}"#),
            message("[DONE]"),
        ]);
        let parts: Vec<_> = stream_chat_completions(ProviderName::Groq, events)
            .map(Result::unwrap)
            .collect()
            .await;
        assert_eq!(
            parts,
            vec![
                StreamPart::TextDelta("Checking".to_string()),
                StreamPart::ToolCall(ToolCallPart {
                    tool_call_id: "call_1".to_string(),
                    tool_name: "weather".to_string(),
                    input: json!({"city": "Oslo"}),
                }),
                StreamPart::Finish {
                    finish_reason: FinishReason::ToolCalls,
                    usage: Usage {
                        input_tokens: Some(3),
                        output_tokens: Some(4),
                        total_tokens: Some(7),
                        ..Default::default()
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_stops_on_malformed_chunk() {
        let events = futures::stream::iter(vec![
            message(r#"{"choices":[{"delta":{"content":"Hi"}}]}"#),
            message("not json"),
            message(r#"{"choices":[{"delta":{"content":"never"}}]}"#),
        ]);
        let parts: Vec<_> = stream_chat_completions(ProviderName::Groq, events)
            .collect()
            .await;
        assert_eq!(parts.len(), 2);
        assert!(parts[0].is_ok());
        let err = parts[1].as_ref().unwrap_err();
        assert!(matches!(
            err.get_details(),
            ErrorDetails::UpstreamResponse { .. }
        ));
    }
}
