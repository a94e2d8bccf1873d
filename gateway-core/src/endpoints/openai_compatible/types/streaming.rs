//! Streaming chat completion responses.
//!
//! Provider output is re-encoded as `chat.completion.chunk` Server-Sent Events and
//! terminated by `data: [DONE]`, whether the stream ends normally or with an error.

use axum::response::sse::Event;
use futures::Stream;
use serde::Serialize;
use tokio_stream::StreamExt;

use crate::error::{Error, ErrorDetails};
use crate::inference::types::{GenerationStream, StreamPart};

use super::chat_completions::{current_timestamp, new_completion_id};
use super::tool::{
    OpenAICompatibleFunctionCall, OpenAICompatibleToolCallChunk, OpenAICompatibleToolType,
};
use super::usage::OpenAICompatibleUsage;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleResponseChunk {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<OpenAICompatibleChoiceChunk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OpenAICompatibleUsage>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OpenAICompatibleChoiceChunk {
    pub index: u32,
    pub delta: OpenAICompatibleDelta,
    pub finish_reason: Option<String>,
}

fn is_none_or_empty<T>(v: &Option<Vec<T>>) -> bool {
    v.as_ref().is_none_or(Vec::is_empty)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OpenAICompatibleDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(skip_serializing_if = "is_none_or_empty")]
    pub tool_calls: Option<Vec<OpenAICompatibleToolCallChunk>>,
}

/// Converts `StreamPart`s of a single response into chunks sharing one id and timestamp.
#[derive(Debug)]
pub struct ChunkEncoder {
    id: String,
    created: u64,
    model: String,
    next_tool_index: usize,
}

impl ChunkEncoder {
    pub fn new(model: String) -> Self {
        Self {
            id: new_completion_id(),
            created: current_timestamp(),
            model,
            next_tool_index: 0,
        }
    }

    pub fn encode(&mut self, part: StreamPart) -> OpenAICompatibleResponseChunk {
        let mut finish_reason = None;
        let mut usage = None;
        let delta = match part {
            StreamPart::TextDelta(text) => OpenAICompatibleDelta {
                role: Some("assistant".to_string()),
                content: Some(text),
                ..Default::default()
            },
            StreamPart::ReasoningDelta(text) => OpenAICompatibleDelta {
                reasoning_content: Some(text),
                ..Default::default()
            },
            StreamPart::ToolCall(tool_call) => {
                let index = self.next_tool_index;
                self.next_tool_index += 1;
                OpenAICompatibleDelta {
                    tool_calls: Some(vec![OpenAICompatibleToolCallChunk {
                        id: tool_call.tool_call_id,
                        index,
                        r#type: OpenAICompatibleToolType::Function,
                        function: OpenAICompatibleFunctionCall {
                            name: tool_call.tool_name,
                            arguments: tool_call.input.to_string(),
                        },
                    }]),
                    ..Default::default()
                }
            }
            StreamPart::Finish {
                finish_reason: reason,
                usage: part_usage,
            } => {
                finish_reason = Some(reason.to_openai());
                usage = Some(part_usage.into());
                OpenAICompatibleDelta::default()
            }
        };
        OpenAICompatibleResponseChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![OpenAICompatibleChoiceChunk {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }
}

fn to_event(data: impl Serialize) -> Result<Event, Error> {
    Event::default().json_data(data).map_err(|e| {
        Error::new(ErrorDetails::Serialization {
            message: format!("Failed to convert chunk to SSE event: {e}"),
        })
    })
}

/// Prepares the SSE events sent to the client.
///
/// An upstream error is sent as an OpenAI-compatible error envelope, followed by
/// `[DONE]`, and ends the stream.
pub fn prepare_serialized_openai_compatible_events(
    mut stream: GenerationStream,
    model: String,
) -> impl Stream<Item = Result<Event, Error>> {
    async_stream::stream! {
        let mut encoder = ChunkEncoder::new(model);
        while let Some(part) = stream.next().await {
            match part {
                Ok(part) => yield to_event(encoder.encode(part)),
                Err(e) => {
                    yield to_event(e.get_details().to_openai_body());
                    break;
                }
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    }
}
