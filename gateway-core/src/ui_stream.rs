//! Translates an OpenAI-compatible chat completion SSE stream into UI message chunks.
//!
//! This is the client-side view of the gateway's own streaming output: a chat UI
//! consumes `start`, `text-*`, `reasoning-*`, `data-tool-calls` and `finish` chunks
//! rather than raw `chat.completion.chunk` deltas.
//!
//! Text and reasoning spans are opened on their first non-empty delta and closed once,
//! when the stream ends. Tool-call deltas are forwarded as they arrive without being
//! accumulated; callers that need complete calls must merge them by `index`.

use futures::Stream;
use reqwest_sse_stream::{Event, ReqwestSseStreamError};
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiMessageChunk {
    Start { message_id: String },
    TextStart { id: String },
    TextDelta { id: String, delta: String },
    TextEnd { id: String },
    ReasoningStart { id: String },
    ReasoningDelta { id: String, delta: String },
    ReasoningEnd { id: String },
    DataToolCalls { data: Vec<UiToolCall> },
    Finish { finish_reason: String },
    Error { error_text: String },
}

/// A tool-call delta as received; `arguments` may be a fragment.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UiToolCall {
    pub id: String,
    pub r#type: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    choices: Vec<ChatDeltaChoice>,
    #[serde(default)]
    error: Option<ChatDeltaError>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDeltaChoice {
    #[serde(default)]
    delta: Option<ChatDeltaContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDeltaContent {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<ReasoningContent>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

/// Some upstreams send reasoning as an array of `{text}` parts.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReasoningContent {
    Text(String),
    Parts(Vec<ReasoningPart>),
}

#[derive(Debug, Deserialize)]
struct ReasoningPart {
    #[serde(default)]
    text: Option<String>,
}

impl ReasoningContent {
    fn into_text(self) -> String {
        match self {
            ReasoningContent::Text(text) => text,
            ReasoningContent::Parts(parts) => parts.into_iter().filter_map(|p| p.text).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatDeltaError {
    #[serde(default)]
    message: Option<String>,
}

/// Maps an OpenAI `finish_reason` onto the UI's hyphenated finish reasons.
pub fn to_ui_finish_reason(raw: &str) -> String {
    match raw {
        "" | "null" | "error" | "other" | "unknown" => "stop".to_string(),
        other => other.replace('_', "-"),
    }
}

/// The state of one streamed message.
#[derive(Debug)]
pub struct UiStreamTranslator {
    message_id: String,
    text_started: bool,
    reasoning_started: bool,
    finish_reason: Option<String>,
}

impl Default for UiStreamTranslator {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

impl UiStreamTranslator {
    pub fn new(message_id: String) -> Self {
        Self {
            message_id,
            text_started: false,
            reasoning_started: false,
            finish_reason: None,
        }
    }

    fn text_id(&self) -> String {
        format!("text-{}", self.message_id)
    }

    fn reasoning_id(&self) -> String {
        format!("reasoning-{}", self.message_id)
    }

    pub fn start(&self) -> UiMessageChunk {
        UiMessageChunk::Start {
            message_id: self.message_id.clone(),
        }
    }

    /// Translates the `data` of one SSE event.
    ///
    /// Data that does not parse yields an `error` chunk; the stream itself carries on.
    pub fn translate(&mut self, data: &str) -> Vec<UiMessageChunk> {
        let parsed: ChatDelta = match serde_json::from_str(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                return vec![UiMessageChunk::Error {
                    error_text: format!("Failed to parse stream event: {e}"),
                }];
            }
        };
        if let Some(error) = parsed.error {
            return vec![UiMessageChunk::Error {
                error_text: error
                    .message
                    .unwrap_or_else(|| "An error occurred during streaming".to_string()),
            }];
        }
        let mut chunks = Vec::new();
        let Some(choice) = parsed.choices.into_iter().next() else {
            return chunks;
        };
        let delta = choice.delta.unwrap_or_default();

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            if !self.text_started {
                chunks.push(UiMessageChunk::TextStart { id: self.text_id() });
                self.text_started = true;
            }
            chunks.push(UiMessageChunk::TextDelta {
                id: self.text_id(),
                delta: content,
            });
        }

        if let Some(reasoning) = delta
            .reasoning_content
            .map(ReasoningContent::into_text)
            .filter(|r| !r.is_empty())
        {
            if !self.reasoning_started {
                chunks.push(UiMessageChunk::ReasoningStart {
                    id: self.reasoning_id(),
                });
                self.reasoning_started = true;
            }
            chunks.push(UiMessageChunk::ReasoningDelta {
                id: self.reasoning_id(),
                delta: reasoning,
            });
        }

        if let Some(tool_calls) = delta.tool_calls.filter(|t| !t.is_empty()) {
            chunks.push(UiMessageChunk::DataToolCalls {
                data: tool_calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, tool_call)| {
                        let function = tool_call.function;
                        UiToolCall {
                            id: tool_call.id.unwrap_or_else(|| format!("tool-{i}")),
                            r#type: tool_call.r#type.unwrap_or_else(|| "function".to_string()),
                            name: function
                                .as_ref()
                                .and_then(|f| f.name.clone())
                                .unwrap_or_else(|| "unknown".to_string()),
                            arguments: function.and_then(|f| f.arguments).unwrap_or_default(),
                        }
                    })
                    .collect(),
            });
        }

        if let Some(finish_reason) = choice.finish_reason {
            self.finish_reason = Some(to_ui_finish_reason(&finish_reason));
        }
        chunks
    }

    /// Closes any open spans and emits the final `finish` chunk.
    pub fn flush(self) -> Vec<UiMessageChunk> {
        let mut chunks = Vec::with_capacity(3);
        if self.text_started {
            chunks.push(UiMessageChunk::TextEnd { id: self.text_id() });
        }
        if self.reasoning_started {
            chunks.push(UiMessageChunk::ReasoningEnd {
                id: self.reasoning_id(),
            });
        }
        chunks.push(UiMessageChunk::Finish {
            finish_reason: self.finish_reason.unwrap_or_else(|| "stop".to_string()),
        });
        chunks
    }
}

/// Translates a stream of SSE events into UI message chunks.
///
/// The `[DONE]` sentinel is skipped. A transport error is reported as an `error` chunk
/// and ends the input; `finish` is still emitted.
pub fn translate_sse_stream<S>(events: S) -> impl Stream<Item = UiMessageChunk> + Send
where
    S: Stream<Item = Result<Event, ReqwestSseStreamError>> + Send + 'static,
{
    async_stream::stream! {
        let mut translator = UiStreamTranslator::default();
        yield translator.start();
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    if message.data.trim() == "[DONE]" {
                        continue;
                    }
                    for chunk in translator.translate(&message.data) {
                        yield chunk;
                    }
                }
                Err(e) => {
                    yield UiMessageChunk::Error {
                        error_text: e.to_string(),
                    };
                    break;
                }
            }
        }
        for chunk in translator.flush() {
            yield chunk;
        }
    }
}
